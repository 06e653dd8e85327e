// SPDX-License-Identifier: BSD-3-Clause
//! Path weights: the shortest data-flow path plus the branch outcomes every
//! merged path agrees on.

use std::collections::BTreeMap;
use std::fmt;

use crate::ir::{Local, Statement};
use crate::nodes::Node;

use super::Weight;

/// Outcome of a conditional branch along a path.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConditionDomain {
    True,
    False,
    Top,
}

impl ConditionDomain {
    fn meet(self, other: Self) -> Self {
        if self == other {
            self
        } else {
            ConditionDomain::Top
        }
    }
}

impl fmt::Display for ConditionDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionDomain::True => write!(f, "true"),
            ConditionDomain::False => write!(f, "false"),
            ConditionDomain::Top => write!(f, "top"),
        }
    }
}

/// One step of a reconstructed data-flow path.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct PathElement {
    pub statement: Statement,
    pub fact: Local,
    /// Set when `statement` is a branch and the path took it one way.
    pub branch: Option<ConditionDomain>,
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.branch {
            None => write!(f, "{} @ {}", self.fact, self.statement),
            Some(b) => write!(f, "{} @ {} [{}]", self.fact, self.statement, b),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum DataFlowPath {
    Zero,
    Path {
        nodes: Vec<Node>,
        /// Branch outcomes, keyed by the node at the branch statement.
        conditions: BTreeMap<Node, ConditionDomain>,
    },
}

impl DataFlowPath {
    pub fn step(node: Node) -> Self {
        DataFlowPath::Path {
            nodes: vec![node],
            conditions: BTreeMap::new(),
        }
    }

    pub fn branch(node: Node, at: Node, outcome: ConditionDomain) -> Self {
        DataFlowPath::Path {
            nodes: vec![node],
            conditions: BTreeMap::from([(at, outcome)]),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        match self {
            DataFlowPath::Zero => &[],
            DataFlowPath::Path { nodes, .. } => nodes,
        }
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&Node, &ConditionDomain)> {
        match self {
            DataFlowPath::Zero => {
                either::Either::Left(std::iter::empty::<(&Node, &ConditionDomain)>())
            }
            DataFlowPath::Path { conditions, .. } => either::Either::Right(conditions.iter()),
        }
    }

    pub fn elements(&self) -> Vec<PathElement> {
        let DataFlowPath::Path { nodes, conditions } = self else {
            return Vec::new();
        };
        nodes
            .iter()
            .map(|n| PathElement {
                statement: n.stmt.clone(),
                fact: n.fact.clone(),
                branch: conditions.get(n).copied(),
            })
            .collect()
    }
}

impl Weight for DataFlowPath {
    fn one() -> Self {
        DataFlowPath::Path {
            nodes: Vec::new(),
            conditions: BTreeMap::new(),
        }
    }

    fn zero() -> Self {
        DataFlowPath::Zero
    }

    /// Keeps the shorter path, and only the branch outcomes both sides agree on.
    fn combine(&self, other: &Self) -> Self {
        match (self, other) {
            (DataFlowPath::Zero, w) | (w, DataFlowPath::Zero) => w.clone(),
            (
                DataFlowPath::Path {
                    nodes: n1,
                    conditions: c1,
                },
                DataFlowPath::Path {
                    nodes: n2,
                    conditions: c2,
                },
            ) => {
                let nodes = if (n1.len(), n1) <= (n2.len(), n2) {
                    n1.clone()
                } else {
                    n2.clone()
                };
                let conditions = c1
                    .iter()
                    .filter(|(k, v)| c2.get(*k) == Some(*v))
                    .map(|(k, v)| (k.clone(), *v))
                    .collect();
                DataFlowPath::Path { nodes, conditions }
            }
        }
    }

    fn extend(&self, other: &Self) -> Self {
        match (self, other) {
            (DataFlowPath::Zero, _) | (_, DataFlowPath::Zero) => DataFlowPath::Zero,
            (
                DataFlowPath::Path {
                    nodes: n1,
                    conditions: c1,
                },
                DataFlowPath::Path {
                    nodes: n2,
                    conditions: c2,
                },
            ) => {
                let mut nodes = Vec::with_capacity(n1.len() + n2.len());
                nodes.extend(n1.iter().cloned());
                nodes.extend(n2.iter().cloned());
                let mut conditions = c1.clone();
                for (k, v) in c2 {
                    conditions
                        .entry(k.clone())
                        .and_modify(|old| *old = old.meet(*v))
                        .or_insert(*v);
                }
                DataFlowPath::Path { nodes, conditions }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConditionDomain, DataFlowPath};
    use crate::ir::{Local, MethodName, Stmt};
    use crate::nodes::Node;
    use crate::weight::Weight;

    fn node(i: u32, v: &str) -> Node {
        let m = MethodName::new("Main.main");
        Node::new(
            crate::ir::Statement::new(m.clone(), i, Stmt::Nop),
            Local::new(m, v),
        )
    }

    #[test]
    fn laws() {
        let a = DataFlowPath::step(node(0, "x"));
        let b = DataFlowPath::branch(node(2, "x"), node(1, "x"), ConditionDomain::True);
        for w in [&a, &b] {
            assert_eq!(DataFlowPath::zero().extend(w), DataFlowPath::zero());
            assert_eq!(DataFlowPath::one().extend(w), *w);
            assert_eq!(w.extend(&DataFlowPath::one()), *w);
            assert_eq!(DataFlowPath::zero().combine(w), *w);
            assert_eq!(w.combine(w), *w);
        }
        assert_eq!(a.combine(&b), b.combine(&a));
    }

    #[test]
    fn extend_concatenates() {
        let a = DataFlowPath::step(node(0, "x"));
        let b = DataFlowPath::step(node(1, "y"));
        let ab = a.extend(&b);
        assert_eq!(ab.nodes(), &[node(0, "x"), node(1, "y")]);
    }

    #[test]
    fn combine_forgets_disagreeing_branches() {
        let t = DataFlowPath::branch(node(2, "x"), node(1, "x"), ConditionDomain::True);
        let f = DataFlowPath::branch(node(3, "x"), node(1, "x"), ConditionDomain::False);
        assert_eq!(t.combine(&f).conditions().count(), 0);
        assert_eq!(t.combine(&t).conditions().count(), 1);
    }

    #[test]
    fn extend_marks_both_ways_as_top() {
        let t = DataFlowPath::branch(node(2, "x"), node(1, "x"), ConditionDomain::True);
        let f = DataFlowPath::branch(node(3, "x"), node(1, "x"), ConditionDomain::False);
        let tf = t.extend(&f);
        let conds: Vec<_> = tf.conditions().collect();
        assert_eq!(conds, vec![(&node(1, "x"), &ConditionDomain::Top)]);
    }
}
