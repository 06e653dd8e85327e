// SPDX-License-Identifier: BSD-3-Clause
use std::fmt;

use crate::arc::Arc;
use crate::wpa::Symbol;

use super::{ClassName, Field, Local, MethodName};

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Constant {
    Int(i64),
    Str(Arc<String>),
    Null,
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(i) => write!(f, "{i}"),
            Constant::Str(s) => write!(f, "{:?}", s.as_str()),
            Constant::Null => write!(f, "null"),
        }
    }
}

/// An operand
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Val {
    Local(Local),
    Constant(Constant),
}

impl Val {
    pub fn as_local(&self) -> Option<&Local> {
        match self {
            Val::Local(l) => Some(l),
            Val::Constant(_) => None,
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Local(l) => write!(f, "{l}"),
            Val::Constant(c) => write!(f, "{c}"),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Callee {
    Static(MethodName),
    /// Dispatched on the runtime class of `base`
    Virtual { base: Local, name: Arc<String> },
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct InvokeExpr {
    pub callee: Callee,
    pub args: Vec<Val>,
}

impl InvokeExpr {
    /// Receiver of a virtual call
    pub fn base(&self) -> Option<&Local> {
        match &self.callee {
            Callee::Static(_) => None,
            Callee::Virtual { base, .. } => Some(base),
        }
    }

    pub fn method_name(&self) -> &str {
        match &self.callee {
            Callee::Static(m) => m.name(),
            Callee::Virtual { name, .. } => name.as_str(),
        }
    }

    pub fn arg_index(&self, l: &Local) -> impl Iterator<Item = usize> + '_ {
        let l = l.clone();
        self.args
            .iter()
            .enumerate()
            .filter(move |(_, a)| a.as_local() == Some(&l))
            .map(|(i, _)| i)
    }
}

impl fmt::Display for InvokeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.callee {
            Callee::Static(m) => write!(f, "{m}(")?,
            Callee::Virtual { base, name } => write!(f, "{base}.{name}(")?,
        }
        for (i, a) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{a}")?;
        }
        write!(f, ")")
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum CmpOp {
    Eq,
    Ne,
}

/// `lhs op rhs`
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Condition {
    pub lhs: Local,
    pub op: CmpOp,
    pub rhs: Val,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
        };
        write!(f, "{} {} {}", self.lhs, op, self.rhs)
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rhs {
    Local(Local),
    New(ClassName),
    Constant(Constant),
    Load { base: Local, field: Field },
    Invoke(InvokeExpr),
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stmt {
    Assign { lhs: Local, rhs: Rhs },
    Store { base: Local, field: Field, rhs: Local },
    Invoke(InvokeExpr),
    If { cond: Condition, target: u32 },
    Goto(u32),
    Return(Option<Val>),
    Nop,
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Assign { lhs, rhs } => match rhs {
                Rhs::Local(r) => write!(f, "{lhs} = {r}"),
                Rhs::New(c) => write!(f, "{lhs} = new {c}"),
                Rhs::Constant(c) => write!(f, "{lhs} = {c}"),
                Rhs::Load { base, field } => write!(f, "{lhs} = {base}.{field}"),
                Rhs::Invoke(e) => write!(f, "{lhs} = {e}"),
            },
            Stmt::Store { base, field, rhs } => write!(f, "{base}.{field} = {rhs}"),
            Stmt::Invoke(e) => write!(f, "{e}"),
            Stmt::If { cond, target } => write!(f, "if {cond} goto {target}"),
            Stmt::Goto(t) => write!(f, "goto {t}"),
            Stmt::Return(None) => write!(f, "return"),
            Stmt::Return(Some(v)) => write!(f, "return {v}"),
            Stmt::Nop => write!(f, "nop"),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct StatementData {
    method: MethodName,
    index: u32,
    kind: Stmt,
}

/// A statement together with its position in its method's body.
#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Statement(Arc<StatementData>);

impl Statement {
    pub fn new(method: MethodName, index: u32, kind: Stmt) -> Self {
        Statement(Arc::new(StatementData {
            method,
            index,
            kind,
        }))
    }

    #[inline]
    pub fn method(&self) -> &MethodName {
        &self.0.method
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.0.index
    }

    #[inline]
    pub fn kind(&self) -> &Stmt {
        &self.0.kind
    }

    pub fn invoke_expr(&self) -> Option<&InvokeExpr> {
        match self.kind() {
            Stmt::Invoke(e)
            | Stmt::Assign {
                rhs: Rhs::Invoke(e),
                ..
            } => Some(e),
            _ => None,
        }
    }

    pub fn is_call(&self) -> bool {
        self.invoke_expr().is_some()
    }

    /// The local written by this statement, if any
    pub fn defined(&self) -> Option<&Local> {
        match self.kind() {
            Stmt::Assign { lhs, .. } => Some(lhs),
            _ => None,
        }
    }

    /// Whether this statement creates a fresh value (object or constant) in
    /// `l`.
    pub fn is_allocation_of(&self, l: &Local) -> bool {
        matches!(
            self.kind(),
            Stmt::Assign { lhs, rhs: Rhs::New(_) | Rhs::Constant(_) } if lhs == l
        )
    }

    pub fn is_return(&self) -> bool {
        matches!(self.kind(), Stmt::Return(_))
    }
}

/// Statements label the call automaton: a node's own statement, or the call
/// site pushed on entry to a callee.
impl Symbol for Statement {}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.0.method, self.0.index, self.0.kind)
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0.method, self.0.index)
    }
}
