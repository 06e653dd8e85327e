// SPDX-License-Identifier: BSD-3-Clause
//! Configurations of the synchronized pushdown system.
//!
//! A [`Node`] is a data-flow fact at a statement. Automaton states are
//! [`State`]s: a bare fact (call automaton), a node (field automaton), or a
//! state generated during saturation. Flow functions describe how a node
//! moves with [`Successor`]s, which say whether and what to push or pop.

use std::fmt;

use crate::arc::Arc;
use crate::ir::{Field, Local, Statement};

/// Index of a solver in its run.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SolverId(pub(crate) u32);

impl fmt::Display for SolverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// `fact` at `stmt`: in forward solvers, `fact` holds the tracked object
/// just before `stmt` runs; in backward solvers, the value `fact` holds just
/// before `stmt` is what is asked about.
#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Node {
    pub stmt: Statement,
    pub fact: Local,
}

impl Node {
    pub fn new(stmt: Statement, fact: Local) -> Self {
        Node { stmt, fact }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.fact, self.stmt)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?}, {})", self.stmt, self.fact)
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum PdsSystem {
    Calls,
    Fields,
}

/// A stack symbol together with the system whose stack it lives on.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Location {
    Call(Statement),
    Field(Field),
}

impl Location {
    pub fn system(&self) -> PdsSystem {
        match self {
            Location::Call(_) => PdsSystem::Calls,
            Location::Field(_) => PdsSystem::Fields,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Call(s) => write!(f, "call {s:?}"),
            Location::Field(fl) => write!(f, "field {fl}"),
        }
    }
}

/// Move to `node`, pushing `location` on its system's stack.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct PushNode {
    pub node: Node,
    pub location: Location,
}

/// Move to `node`, provided the top of its system's stack is `location`.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct PopNode {
    pub node: Node,
    pub location: Location,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Successor {
    Normal(Node),
    Push(PushNode),
    Pop(PopNode),
}

impl Successor {
    pub fn node(&self) -> &Node {
        match self {
            Successor::Normal(n) => n,
            Successor::Push(p) => &p.node,
            Successor::Pop(p) => &p.node,
        }
    }
}

/// What a generated state was generated for.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Generator {
    /// Entry into a callee at this statement
    Stmt(Statement),
    Field(Field),
    /// Bottom of a solver's stacks
    Bottom,
    /// Copy of a state of another solver's call automaton
    Imported(SolverId),
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct GeneratedState {
    pub base: State,
    pub generator: Generator,
}

#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum State {
    Single(Local),
    Located(Node),
    Generated(Arc<GeneratedState>),
}

impl State {
    pub fn generated(base: State, generator: Generator) -> Self {
        State::Generated(Arc::new(GeneratedState { base, generator }))
    }

    /// The bottom state of the solver seeded at `seed`.
    pub fn bottom(seed: &Node) -> Self {
        State::generated(State::Located(seed.clone()), Generator::Bottom)
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self, State::Generated(g) if g.generator == Generator::Bottom)
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, State::Generated(_))
    }

    pub fn as_located(&self) -> Option<&Node> {
        match self {
            State::Located(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_single(&self) -> Option<&Local> {
        match self {
            State::Single(l) => Some(l),
            _ => None,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Single(l) => write!(f, "{l}"),
            State::Located(n) => write!(f, "{n:?}"),
            State::Generated(g) => match &g.generator {
                Generator::Stmt(s) => write!(f, "<{}, {:?}>", g.base, s),
                Generator::Field(fl) => write!(f, "<{}, {}>", g.base, fl),
                Generator::Bottom => write!(f, "⊥{}", g.base),
                Generator::Imported(id) => write!(f, "{}{}", g.base, id),
            },
        }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::{Generator, Location, Node, PdsSystem, PushNode, State};
    use crate::ir::{Field, Local, MethodName, Statement, Stmt};

    fn node(i: u32, v: &str) -> Node {
        let m = MethodName::new("Main.main");
        Node::new(Statement::new(m.clone(), i, Stmt::Nop), Local::new(m, v))
    }

    #[test]
    fn pushes_differ_by_system_and_symbol() {
        let n = node(0, "x");
        let call = PushNode {
            node: n.clone(),
            location: Location::Call(n.stmt.clone()),
        };
        let field = PushNode {
            node: n.clone(),
            location: Location::Field(Field::named("f")),
        };
        let other_field = PushNode {
            node: n,
            location: Location::Field(Field::named("g")),
        };
        assert_ne!(call, field);
        assert_ne!(field, other_field);
        assert_eq!(call.location.system(), PdsSystem::Calls);
        assert_eq!(field.location.system(), PdsSystem::Fields);
    }

    #[test]
    fn generated_states() {
        let n = node(0, "x");
        let b = State::bottom(&n);
        assert!(b.is_bottom());
        assert_eq!(b, State::bottom(&n));
        assert_ne!(b, State::bottom(&node(1, "x")));
        let g = State::generated(State::Located(n.clone()), Generator::Field(Field::named("f")));
        assert!(g.is_generated() && !g.is_bottom());
        assert_eq!(State::Located(n.clone()).as_located(), Some(&n));
    }
}
