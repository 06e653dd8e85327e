// SPDX-License-Identifier: BSD-3-Clause
//! A small object-oriented intermediate representation.
//!
//! Programs are built from a [`ProgramDesc`], either deserialized from JSON
//! or put together with a [`ProgramBuilder`]. Lowering resolves names to
//! method-scoped [`Local`]s, computes each method's control-flow graph and
//! turns `put`/`get` calls on maps into stores and loads of key fields.

use rustc_hash::{FxHashMap, FxHashSet};

mod builder;
mod desc;
mod field;
mod name;
mod statement;

pub use builder::{MethodBuilder, ProgramBuilder};
pub use desc::{Arg, ClassDesc, CmpDesc, ConstDesc, MethodDesc, ProgramDesc, StmtDesc};
pub use field::Field;
pub use name::{ClassName, Local, MethodName};
pub use statement::{
    Callee, CmpOp, Condition, Constant, InvokeExpr, Rhs, Statement, Stmt, Val,
};

use crate::error::Result;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Class {
    pub name: ClassName,
    pub superclass: Option<ClassName>,
}

#[derive(Clone, Debug)]
pub struct Method {
    pub name: MethodName,
    pub this: Option<Local>,
    pub params: Vec<Local>,
    body: Vec<Statement>,
    succs: Vec<Vec<Statement>>,
    preds: Vec<Vec<Statement>>,
    exits: Vec<Statement>,
}

impl Method {
    pub fn body(&self) -> &[Statement] {
        &self.body
    }

    /// The first statement; every lowered method has one.
    pub fn start(&self) -> Option<&Statement> {
        self.body.first()
    }

    pub fn is_start(&self, s: &Statement) -> bool {
        s.index() == 0 && s.method() == &self.name
    }

    /// `return` statements
    pub fn exits(&self) -> &[Statement] {
        &self.exits
    }

    pub fn successors(&self, s: &Statement) -> &[Statement] {
        self.succs
            .get(s.index() as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn predecessors(&self, s: &Statement) -> &[Statement] {
        self.preds
            .get(s.index() as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn param_index(&self, l: &Local) -> Option<usize> {
        self.params.iter().position(|p| p == l)
    }

    pub fn is_this(&self, l: &Local) -> bool {
        self.this.as_ref() == Some(l)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Program {
    methods: FxHashMap<MethodName, Method>,
    classes: FxHashMap<ClassName, Class>,
    unreachable: FxHashSet<MethodName>,
    /// Every call statement, in a deterministic order
    invocations: Vec<Statement>,
}

impl Program {
    pub fn from_json(json: &str) -> Result<Program> {
        let desc: ProgramDesc = serde_json::from_str(json)?;
        desc.lower()
    }

    pub fn method(&self, name: &MethodName) -> Option<&Method> {
        self.methods.get(name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.methods.values()
    }

    pub fn class(&self, name: &ClassName) -> Option<&Class> {
        self.classes.get(name)
    }

    pub fn classes(&self) -> impl Iterator<Item = &Class> {
        self.classes.values()
    }

    pub fn successors(&self, s: &Statement) -> &[Statement] {
        self.method(s.method())
            .map(|m| m.successors(s))
            .unwrap_or(&[])
    }

    pub fn predecessors(&self, s: &Statement) -> &[Statement] {
        self.method(s.method())
            .map(|m| m.predecessors(s))
            .unwrap_or(&[])
    }

    pub fn is_unreachable(&self, m: &MethodName) -> bool {
        self.unreachable.contains(m)
    }

    pub fn invocations(&self) -> &[Statement] {
        &self.invocations
    }

    /// The method run by `name` on an object of `class`, looked up through
    /// the superclass chain.
    pub fn dispatch(&self, class: &ClassName, name: &str) -> Option<MethodName> {
        let mut current = Some(class.clone());
        // Bounded, in case of a cyclic hierarchy
        for _ in 0..=self.classes.len() {
            let c = current?;
            let candidate = MethodName::new(format!("{}.{}", c, name));
            if self.methods.contains_key(&candidate) {
                return Some(candidate);
            }
            current = self.classes.get(&c).and_then(|c| c.superclass.clone());
        }
        None
    }

    /// `(statement, local)` for every `local = new C` and `local = constant`
    pub fn allocation_sites(&self) -> Vec<(Statement, Local)> {
        let mut sites: Vec<_> = self
            .methods
            .values()
            .flat_map(|m| m.body.iter())
            .filter_map(|s| match s.kind() {
                Stmt::Assign {
                    lhs,
                    rhs: Rhs::New(_) | Rhs::Constant(_),
                } => Some((s.clone(), lhs.clone())),
                _ => None,
            })
            .collect();
        sites.sort();
        sites
    }

    /// Calls to methods named `name`, e.g. `queryFor`
    pub fn calls_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Statement> + 'a {
        self.invocations.iter().filter(move |s| {
            s.invoke_expr()
                .map(|e| e.method_name() == name)
                .unwrap_or(false)
        })
    }
}
