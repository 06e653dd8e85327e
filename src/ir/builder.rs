// SPDX-License-Identifier: BSD-3-Clause
use crate::error::Result;

use super::{Arg, ClassDesc, CmpDesc, ConstDesc, MethodDesc, Program, ProgramDesc, StmtDesc};

/// Builds a [`ProgramDesc`] in code, e.g. for tests.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    desc: ProgramDesc,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(&mut self, name: &str, superclass: Option<&str>) -> &mut Self {
        self.desc.classes.push(ClassDesc {
            name: name.to_string(),
            superclass: superclass.map(str::to_string),
        });
        self
    }

    /// Starts a new method. Statements are appended in order; each adder
    /// returns the index of the statement it added.
    pub fn method(&mut self, name: &str) -> MethodBuilder<'_> {
        self.desc.methods.push(MethodDesc {
            name: name.to_string(),
            this: None,
            params: Vec::new(),
            body: Vec::new(),
        });
        let index = self.desc.methods.len() - 1;
        MethodBuilder {
            methods: &mut self.desc.methods,
            index,
        }
    }

    pub fn unreachable(&mut self, name: &str) -> &mut Self {
        self.desc.unreachable.push(name.to_string());
        self
    }

    pub fn desc(&self) -> &ProgramDesc {
        &self.desc
    }

    pub fn build(&self) -> Result<Program> {
        self.desc.lower()
    }
}

#[derive(Debug)]
pub struct MethodBuilder<'a> {
    methods: &'a mut Vec<MethodDesc>,
    index: usize,
}

impl MethodBuilder<'_> {
    fn desc(&mut self) -> &mut MethodDesc {
        &mut self.methods[self.index]
    }

    fn push(&mut self, s: StmtDesc) -> u32 {
        let body = &mut self.desc().body;
        body.push(s);
        (body.len() - 1) as u32
    }

    pub fn this(&mut self, name: &str) -> &mut Self {
        self.desc().this = Some(name.to_string());
        self
    }

    pub fn params(&mut self, names: &[&str]) -> &mut Self {
        self.desc().params = names.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Index the next statement will get
    pub fn next_index(&mut self) -> u32 {
        self.desc().body.len() as u32
    }

    pub fn new_object(&mut self, lhs: &str, class: &str) -> u32 {
        self.push(StmtDesc::New {
            lhs: lhs.to_string(),
            class: class.to_string(),
        })
    }

    pub fn constant(&mut self, lhs: &str, value: ConstDesc) -> u32 {
        self.push(StmtDesc::Const {
            lhs: lhs.to_string(),
            value,
        })
    }

    pub fn copy(&mut self, lhs: &str, rhs: &str) -> u32 {
        self.push(StmtDesc::Copy {
            lhs: lhs.to_string(),
            rhs: rhs.to_string(),
        })
    }

    pub fn load(&mut self, lhs: &str, base: &str, field: &str) -> u32 {
        self.push(StmtDesc::Load {
            lhs: lhs.to_string(),
            base: base.to_string(),
            field: field.to_string(),
        })
    }

    pub fn store(&mut self, base: &str, field: &str, rhs: &str) -> u32 {
        self.push(StmtDesc::Store {
            base: base.to_string(),
            field: field.to_string(),
            rhs: rhs.to_string(),
        })
    }

    pub fn call(&mut self, lhs: Option<&str>, method: &str, args: &[Arg]) -> u32 {
        self.push(StmtDesc::Call {
            lhs: lhs.map(str::to_string),
            method: method.to_string(),
            args: args.to_vec(),
        })
    }

    pub fn vcall(&mut self, lhs: Option<&str>, base: &str, name: &str, args: &[Arg]) -> u32 {
        self.push(StmtDesc::VirtualCall {
            lhs: lhs.map(str::to_string),
            base: base.to_string(),
            name: name.to_string(),
            args: args.to_vec(),
        })
    }

    /// `if lhs == rhs goto target`
    pub fn if_eq(&mut self, lhs: &str, rhs: Arg, target: u32) -> u32 {
        self.push(StmtDesc::If {
            lhs: lhs.to_string(),
            cmp: CmpDesc::Eq,
            rhs,
            target,
        })
    }

    /// `if lhs != rhs goto target`
    pub fn if_ne(&mut self, lhs: &str, rhs: Arg, target: u32) -> u32 {
        self.push(StmtDesc::If {
            lhs: lhs.to_string(),
            cmp: CmpDesc::Ne,
            rhs,
            target,
        })
    }

    pub fn goto(&mut self, target: u32) -> u32 {
        self.push(StmtDesc::Goto { target })
    }

    pub fn ret(&mut self, value: Option<Arg>) -> u32 {
        self.push(StmtDesc::Return { value })
    }

    pub fn nop(&mut self) -> u32 {
        self.push(StmtDesc::Nop)
    }

    /// Points the jump at `at` to `target`.
    pub fn set_target(&mut self, at: u32, target: u32) {
        if let Some(StmtDesc::If { target: t, .. } | StmtDesc::Goto { target: t }) =
            self.desc().body.get_mut(at as usize)
        {
            *t = target;
        }
    }
}
