// SPDX-License-Identifier: BSD-3-Clause
//! Weights of the rules applied by the solvers.

use crate::ir::{CmpOp, Constant, Statement, Stmt, Val};
use crate::nodes::Node;
use crate::query::ForwardQuery;
use crate::weight::{ConditionDomain, DataFlowPath, NoWeight, Weight};

pub trait WeightFunctions<W: Weight>: Send + Sync {
    /// Intraprocedural step from `from` to `to`
    fn normal(&self, from: &Node, to: &Node) -> W;

    /// Entry into a callee at `to` from `call_site`
    fn push(&self, from: &Node, to: &Node, call_site: &Statement) -> W;

    /// Return from a callee to `to`
    fn pop(&self, from: &Node, to: &Node) -> W;

    fn one(&self) -> W {
        W::one()
    }

    /// Whether a forward result with weight `w` lies on an infeasible path.
    fn contradicts(&self, _query: &ForwardQuery, _w: &W) -> bool {
        false
    }
}

/// Every rule has weight one.
#[derive(Clone, Copy, Debug, Default)]
pub struct OneWeights;

impl WeightFunctions<NoWeight> for OneWeights {
    fn normal(&self, _from: &Node, _to: &Node) -> NoWeight {
        NoWeight::One
    }

    fn push(&self, _from: &Node, _to: &Node, _call_site: &Statement) -> NoWeight {
        NoWeight::One
    }

    fn pop(&self, _from: &Node, _to: &Node) -> NoWeight {
        NoWeight::One
    }
}

/// Records the nodes visited and the branches taken.
#[derive(Clone, Copy, Debug, Default)]
pub struct PathWeights;

impl PathWeights {
    /// Value of `cond` when its left-hand side holds the object allocated by
    /// `query`, if that can be known statically.
    fn evaluate(query: &ForwardQuery, op: CmpOp, rhs: &Val) -> Option<bool> {
        let Val::Constant(c) = rhs else {
            return None;
        };
        let equal = match (query.class(), query.constant()) {
            // A fresh object is never null, and never equal to a constant
            (Some(_), _) => false,
            (None, Some(k)) => match (k, c) {
                (Constant::Null, Constant::Null) => true,
                (Constant::Int(a), Constant::Int(b)) => a == b,
                (Constant::Str(a), Constant::Str(b)) => a == b,
                (Constant::Null, _) | (_, Constant::Null) => false,
                // e.g. an int against a string
                _ => return None,
            },
            (None, None) => return None,
        };
        Some(match op {
            CmpOp::Eq => equal,
            CmpOp::Ne => !equal,
        })
    }
}

impl WeightFunctions<DataFlowPath> for PathWeights {
    fn normal(&self, from: &Node, to: &Node) -> DataFlowPath {
        if let Stmt::If { target, .. } = from.stmt.kind() {
            let taken = to.stmt.index() == *target;
            let fallthrough = to.stmt.index() == from.stmt.index() + 1;
            if taken != fallthrough {
                let outcome = if taken {
                    ConditionDomain::True
                } else {
                    ConditionDomain::False
                };
                return DataFlowPath::branch(to.clone(), from.clone(), outcome);
            }
        }
        DataFlowPath::step(to.clone())
    }

    fn push(&self, _from: &Node, to: &Node, _call_site: &Statement) -> DataFlowPath {
        DataFlowPath::step(to.clone())
    }

    fn pop(&self, _from: &Node, to: &Node) -> DataFlowPath {
        DataFlowPath::step(to.clone())
    }

    fn contradicts(&self, query: &ForwardQuery, w: &DataFlowPath) -> bool {
        w.conditions().any(|(at, outcome)| {
            let Stmt::If { cond, .. } = at.stmt.kind() else {
                return false;
            };
            if cond.lhs != at.fact {
                return false;
            }
            match (Self::evaluate(query, cond.op, &cond.rhs), outcome) {
                (Some(value), ConditionDomain::True) => !value,
                (Some(value), ConditionDomain::False) => value,
                _ => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{PathWeights, WeightFunctions};
    use crate::ir::{Arg, ProgramBuilder};
    use crate::nodes::Node;
    use crate::query::ForwardQuery;
    use crate::weight::Weight;

    #[test]
    fn null_check_on_fresh_object() {
        let mut p = ProgramBuilder::new();
        let mut m = p.method("Main.main");
        m.new_object("a", "A");
        m.if_eq("a", Arg::null(), 3);
        m.nop();
        m.nop();
        let program = p.build().unwrap();
        let body = program.methods().next().unwrap().body().to_vec();
        let a = body[0].defined().unwrap().clone();
        let q = ForwardQuery::new(body[0].clone(), a.clone()).unwrap();
        let at_if = Node::new(body[1].clone(), a.clone());
        let taken = PathWeights.normal(&at_if, &Node::new(body[3].clone(), a.clone()));
        let not_taken = PathWeights.normal(&at_if, &Node::new(body[2].clone(), a.clone()));
        assert!(PathWeights.contradicts(&q, &taken));
        assert!(!PathWeights.contradicts(&q, &not_taken));
        assert!(!PathWeights.contradicts(&q, &taken.combine(&not_taken)));
    }
}
