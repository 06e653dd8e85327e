// SPDX-License-Identifier: BSD-3-Clause
use std::fmt;

use crate::error::{Error, Result};
use crate::ir::{ClassName, Constant, Local, Rhs, Statement, Stmt};
use crate::nodes::Node;

/// Where does the object allocated here flow?
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ForwardQuery {
    node: Node,
}

impl ForwardQuery {
    /// `stmt` must allocate into `var`, either `var = new C` or
    /// `var = constant`.
    pub fn new(stmt: Statement, var: Local) -> Result<Self> {
        if !stmt.is_allocation_of(&var) {
            return Err(Error::MalformedQuery(format!(
                "{stmt} does not allocate into {var}"
            )));
        }
        Ok(ForwardQuery {
            node: Node::new(stmt, var),
        })
    }

    #[inline]
    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn class(&self) -> Option<&ClassName> {
        match self.node.stmt.kind() {
            Stmt::Assign {
                rhs: Rhs::New(c), ..
            } => Some(c),
            _ => None,
        }
    }

    pub fn constant(&self) -> Option<&Constant> {
        match self.node.stmt.kind() {
            Stmt::Assign {
                rhs: Rhs::Constant(c),
                ..
            } => Some(c),
            _ => None,
        }
    }
}

impl fmt::Display for ForwardQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "forward {}", self.node)
    }
}

/// Which allocations may `var` hold just before `stmt`?
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct BackwardQuery {
    node: Node,
}

impl BackwardQuery {
    pub fn new(stmt: Statement, var: Local) -> Self {
        BackwardQuery {
            node: Node::new(stmt, var),
        }
    }

    /// Query for argument `index` of the call at `stmt`.
    pub fn for_invoke_arg(stmt: Statement, index: usize) -> Result<Self> {
        let arg = {
            let Some(e) = stmt.invoke_expr() else {
                return Err(Error::MalformedQuery(format!(
                    "{stmt} has no invoke expression"
                )));
            };
            match e.args.get(index).and_then(|a| a.as_local()) {
                Some(l) => l.clone(),
                None => {
                    return Err(Error::MalformedQuery(format!(
                        "argument {index} of {stmt} is not a local"
                    )))
                }
            }
        };
        Ok(Self::new(stmt, arg))
    }

    #[inline]
    pub fn node(&self) -> &Node {
        &self.node
    }
}

impl fmt::Display for BackwardQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "backward {}", self.node)
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Query {
    Forward(ForwardQuery),
    Backward(BackwardQuery),
}

impl Query {
    pub fn node(&self) -> &Node {
        match self {
            Query::Forward(q) => q.node(),
            Query::Backward(q) => q.node(),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Forward(q) => q.fmt(f),
            Query::Backward(q) => q.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BackwardQuery, ForwardQuery};
    use crate::error::Error;
    use crate::ir::{Arg, ProgramBuilder};

    #[test]
    fn malformed() {
        let mut p = ProgramBuilder::new();
        let mut m = p.method("Main.main");
        m.new_object("a", "A");
        m.copy("b", "a");
        m.call(None, "Main.queryFor", &["b".into(), Arg::int(1)]);
        let program = p.build().unwrap();
        let body = program.methods().next().unwrap().body().to_vec();
        let a = body[0].defined().unwrap().clone();
        let b = body[1].defined().unwrap().clone();

        assert!(ForwardQuery::new(body[0].clone(), a.clone()).is_ok());
        assert!(matches!(
            ForwardQuery::new(body[1].clone(), b.clone()),
            Err(Error::MalformedQuery(_))
        ));
        assert!(matches!(
            BackwardQuery::for_invoke_arg(body[1].clone(), 0),
            Err(Error::MalformedQuery(_))
        ));
        assert!(matches!(
            BackwardQuery::for_invoke_arg(body[2].clone(), 1),
            Err(Error::MalformedQuery(_))
        ));
        let q = BackwardQuery::for_invoke_arg(body[2].clone(), 0).unwrap();
        assert_eq!(q.node().fact, b);
    }
}
