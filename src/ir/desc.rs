// SPDX-License-Identifier: BSD-3-Clause
//! Serializable program descriptions and their lowering to [`Program`]s.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::arc::Arc;
use crate::error::{Error, Result};

use super::{
    Callee, Class, ClassName, CmpOp, Condition, Constant, Field, InvokeExpr, Local, Method,
    MethodName, Program, Rhs, Statement, Stmt, Val,
};

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConstDesc {
    Int(i64),
    Str(String),
    Null,
}

/// Operand: a constant, or else the name of a local
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(untagged)]
pub enum Arg {
    Const(ConstDesc),
    Local(String),
}

impl Arg {
    pub fn local(name: &str) -> Self {
        Arg::Local(name.to_string())
    }

    pub fn str(s: &str) -> Self {
        Arg::Const(ConstDesc::Str(s.to_string()))
    }

    pub fn int(i: i64) -> Self {
        Arg::Const(ConstDesc::Int(i))
    }

    pub fn null() -> Self {
        Arg::Const(ConstDesc::Null)
    }
}

impl From<&str> for Arg {
    fn from(name: &str) -> Self {
        Arg::local(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CmpDesc {
    Eq,
    Ne,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum StmtDesc {
    New {
        lhs: String,
        class: String,
    },
    Const {
        lhs: String,
        value: ConstDesc,
    },
    Copy {
        lhs: String,
        rhs: String,
    },
    /// `lhs = base.field`; the field `[]` means array elements
    Load {
        lhs: String,
        base: String,
        field: String,
    },
    Store {
        base: String,
        field: String,
        rhs: String,
    },
    Call {
        #[serde(default)]
        lhs: Option<String>,
        method: String,
        #[serde(default)]
        args: Vec<Arg>,
    },
    VirtualCall {
        #[serde(default)]
        lhs: Option<String>,
        base: String,
        name: String,
        #[serde(default)]
        args: Vec<Arg>,
    },
    If {
        lhs: String,
        cmp: CmpDesc,
        rhs: Arg,
        target: u32,
    },
    Goto {
        target: u32,
    },
    Return {
        #[serde(default)]
        value: Option<Arg>,
    },
    Nop,
}

impl StmtDesc {
    fn defined(&self) -> Option<&str> {
        match self {
            StmtDesc::New { lhs, .. }
            | StmtDesc::Const { lhs, .. }
            | StmtDesc::Copy { lhs, .. }
            | StmtDesc::Load { lhs, .. } => Some(lhs),
            StmtDesc::Call { lhs, .. } | StmtDesc::VirtualCall { lhs, .. } => lhs.as_deref(),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MethodDesc {
    /// `Class.method`
    pub name: String,
    #[serde(default)]
    pub this: Option<String>,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub body: Vec<StmtDesc>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClassDesc {
    pub name: String,
    #[serde(default)]
    pub superclass: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProgramDesc {
    #[serde(default)]
    pub classes: Vec<ClassDesc>,
    pub methods: Vec<MethodDesc>,
    /// Methods no execution can reach
    #[serde(default)]
    pub unreachable: Vec<String>,
}

fn malformed(msg: String) -> Error {
    Error::MalformedProgram(msg)
}

fn constant(c: &ConstDesc) -> Constant {
    match c {
        ConstDesc::Int(i) => Constant::Int(*i),
        ConstDesc::Str(s) => Constant::Str(Arc::new(s.clone())),
        ConstDesc::Null => Constant::Null,
    }
}

fn field(name: &str) -> Field {
    if name == "[]" {
        Field::Array
    } else {
        Field::named(name)
    }
}

/// The constant `l` holds wherever it is used in `desc`, if it has a single
/// definition, by a constant or by a call to a method in `returns`.
fn constant_local<'a>(
    desc: &'a MethodDesc,
    l: &str,
    returns: &'a FxHashMap<String, ConstDesc>,
) -> Option<&'a ConstDesc> {
    if desc.params.iter().any(|p| p == l) || desc.this.as_deref() == Some(l) {
        return None;
    }
    let mut defs = desc.body.iter().filter(|s| s.defined() == Some(l));
    match (defs.next(), defs.next()) {
        (Some(StmtDesc::Const { value, .. }), None) => Some(value),
        (Some(StmtDesc::Call { method, .. }), None) => returns.get(method),
        _ => None,
    }
}

/// Methods that return the same constant on every exit.
fn constant_returns(methods: &[MethodDesc]) -> FxHashMap<String, ConstDesc> {
    let mut returns: FxHashMap<String, ConstDesc> = FxHashMap::default();
    loop {
        let mut found = Vec::new();
        for m in methods {
            if returns.contains_key(&m.name) {
                continue;
            }
            // Falling off the end returns nothing
            if !matches!(
                m.body.last(),
                Some(StmtDesc::Return { .. } | StmtDesc::Goto { .. })
            ) {
                continue;
            }
            let mut value: Option<&ConstDesc> = None;
            let mut constant = true;
            for s in &m.body {
                let StmtDesc::Return { value: v } = s else {
                    continue;
                };
                let c = match v {
                    Some(Arg::Const(c)) => Some(c),
                    Some(Arg::Local(l)) => constant_local(m, l, &returns),
                    None => None,
                };
                match (c, value) {
                    (Some(c), None) => value = Some(c),
                    (Some(c), Some(prev)) if c == prev => (),
                    _ => {
                        constant = false;
                        break;
                    }
                }
            }
            if let (true, Some(v)) = (constant, value) {
                found.push((m.name.clone(), v.clone()));
            }
        }
        if found.is_empty() {
            return returns;
        }
        returns.extend(found);
    }
}

struct Lowering<'a> {
    desc: &'a MethodDesc,
    name: MethodName,
    returns: &'a FxHashMap<String, ConstDesc>,
    /// No program method is named `put` (resp. `get`), so such calls are map
    /// operations.
    map_put: bool,
    map_get: bool,
}

impl Lowering<'_> {
    fn local(&self, name: &str) -> Local {
        Local::new(self.name.clone(), name)
    }

    fn val(&self, a: &Arg) -> Val {
        match a {
            Arg::Const(c) => Val::Constant(constant(c)),
            Arg::Local(l) => Val::Local(self.local(l)),
        }
    }

    fn invoke(&self, callee: Callee, args: &[Arg]) -> InvokeExpr {
        InvokeExpr {
            callee,
            args: args.iter().map(|a| self.val(a)).collect(),
        }
    }

    /// The map field for key `arg`: a known key for constants, and for
    /// locals with a single definition by a constant or by a call to a method
    /// that always returns the same constant.
    fn key(&self, arg: &Arg) -> Field {
        let constant = match arg {
            Arg::Const(c) => Some(c),
            Arg::Local(l) => constant_local(self.desc, l, self.returns),
        };
        match constant {
            Some(ConstDesc::Int(i)) => Field::key(i.to_string()),
            Some(ConstDesc::Str(s)) => Field::key(s.clone()),
            Some(ConstDesc::Null) | None => Field::AnyKey,
        }
    }

    fn target(&self, t: u32, len: usize) -> Result<u32> {
        if (t as usize) < len {
            Ok(t)
        } else {
            Err(malformed(format!(
                "{}: jump target {} out of bounds",
                self.name, t
            )))
        }
    }

    fn stmt(&self, s: &StmtDesc, len: usize) -> Result<Stmt> {
        Ok(match s {
            StmtDesc::New { lhs, class } => Stmt::Assign {
                lhs: self.local(lhs),
                rhs: Rhs::New(ClassName::new(class.as_str())),
            },
            StmtDesc::Const { lhs, value } => Stmt::Assign {
                lhs: self.local(lhs),
                rhs: Rhs::Constant(constant(value)),
            },
            StmtDesc::Copy { lhs, rhs } => Stmt::Assign {
                lhs: self.local(lhs),
                rhs: Rhs::Local(self.local(rhs)),
            },
            StmtDesc::Load { lhs, base, field: f } => Stmt::Assign {
                lhs: self.local(lhs),
                rhs: Rhs::Load {
                    base: self.local(base),
                    field: field(f),
                },
            },
            StmtDesc::Store { base, field: f, rhs } => Stmt::Store {
                base: self.local(base),
                field: field(f),
                rhs: self.local(rhs),
            },
            StmtDesc::Call { lhs, method, args } => {
                if !method.contains('.') {
                    return Err(malformed(format!(
                        "{}: callee {} is not of the form Class.method",
                        self.name, method
                    )));
                }
                let e = self.invoke(Callee::Static(MethodName::new(method.as_str())), args);
                match lhs {
                    None => Stmt::Invoke(e),
                    Some(lhs) => Stmt::Assign {
                        lhs: self.local(lhs),
                        rhs: Rhs::Invoke(e),
                    },
                }
            }
            StmtDesc::VirtualCall {
                lhs,
                base,
                name,
                args,
            } => match (name.as_str(), lhs, args.as_slice()) {
                ("put", _, [k, Arg::Local(v)]) if self.map_put => Stmt::Store {
                    base: self.local(base),
                    field: self.key(k),
                    rhs: self.local(v),
                },
                ("get", Some(lhs), [k]) if self.map_get => Stmt::Assign {
                    lhs: self.local(lhs),
                    rhs: Rhs::Load {
                        base: self.local(base),
                        field: self.key(k),
                    },
                },
                ("get", None, [_]) if self.map_get => Stmt::Nop,
                _ => {
                    let e = self.invoke(
                        Callee::Virtual {
                            base: self.local(base),
                            name: Arc::new(name.clone()),
                        },
                        args,
                    );
                    match lhs {
                        None => Stmt::Invoke(e),
                        Some(lhs) => Stmt::Assign {
                            lhs: self.local(lhs),
                            rhs: Rhs::Invoke(e),
                        },
                    }
                }
            },
            StmtDesc::If {
                lhs,
                cmp,
                rhs,
                target,
            } => Stmt::If {
                cond: Condition {
                    lhs: self.local(lhs),
                    op: match cmp {
                        CmpDesc::Eq => CmpOp::Eq,
                        CmpDesc::Ne => CmpOp::Ne,
                    },
                    rhs: self.val(rhs),
                },
                target: self.target(*target, len)?,
            },
            StmtDesc::Goto { target } => Stmt::Goto(self.target(*target, len)?),
            StmtDesc::Return { value } => Stmt::Return(value.as_ref().map(|v| self.val(v))),
            StmtDesc::Nop => Stmt::Nop,
        })
    }

    fn method(&self) -> Result<Method> {
        let mut kinds = Vec::with_capacity(self.desc.body.len() + 1);
        // Falling off the end returns
        let len = match self.desc.body.last() {
            Some(StmtDesc::Return { .. } | StmtDesc::Goto { .. }) => self.desc.body.len(),
            _ => self.desc.body.len() + 1,
        };
        for s in &self.desc.body {
            kinds.push(self.stmt(s, len)?);
        }
        if kinds.len() < len {
            kinds.push(Stmt::Return(None));
        }
        let body: Vec<Statement> = kinds
            .into_iter()
            .enumerate()
            .map(|(i, k)| Statement::new(self.name.clone(), i as u32, k))
            .collect();

        let mut succs = vec![Vec::new(); body.len()];
        let mut preds = vec![Vec::new(); body.len()];
        for (i, s) in body.iter().enumerate() {
            let mut targets = match s.kind() {
                Stmt::Return(_) => vec![],
                Stmt::Goto(t) => vec![*t as usize],
                Stmt::If { target, .. } => vec![i + 1, *target as usize],
                _ => vec![i + 1],
            };
            targets.dedup();
            for t in targets {
                succs[i].push(body[t].clone());
                preds[t].push(s.clone());
            }
        }
        let exits = body.iter().filter(|s| s.is_return()).cloned().collect();

        Ok(Method {
            name: self.name.clone(),
            this: self.desc.this.as_ref().map(|t| self.local(t)),
            params: self.desc.params.iter().map(|p| self.local(p)).collect(),
            body,
            succs,
            preds,
            exits,
        })
    }
}

impl ProgramDesc {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn lower(&self) -> Result<Program> {
        let mut classes = FxHashMap::default();
        for c in &self.classes {
            let name = ClassName::new(c.name.as_str());
            let class = Class {
                name: name.clone(),
                superclass: c.superclass.as_deref().map(ClassName::new),
            };
            if classes.insert(name, class).is_some() {
                return Err(malformed(format!("duplicate class {}", c.name)));
            }
        }
        for c in classes.values() {
            if let Some(sup) = &c.superclass {
                if !classes.contains_key(sup) {
                    return Err(malformed(format!(
                        "class {} extends unknown class {}",
                        c.name, sup
                    )));
                }
            }
        }

        let implemented = |name: &str| {
            self.methods
                .iter()
                .any(|m| m.name.rsplit_once('.').map(|(_, n)| n) == Some(name))
        };
        let map_put = !implemented("put");
        let map_get = !implemented("get");
        let returns = constant_returns(&self.methods);

        let mut methods = FxHashMap::default();
        let mut invocations = Vec::new();
        for desc in &self.methods {
            if !desc.name.contains('.') {
                return Err(malformed(format!(
                    "method {} is not of the form Class.method",
                    desc.name
                )));
            }
            let lowering = Lowering {
                desc,
                name: MethodName::new(desc.name.as_str()),
                returns: &returns,
                map_put,
                map_get,
            };
            let method = lowering.method()?;
            invocations.extend(method.body().iter().filter(|s| s.is_call()).cloned());
            if methods.insert(method.name.clone(), method).is_some() {
                return Err(malformed(format!("duplicate method {}", desc.name)));
            }
        }
        invocations.sort();

        let unreachable: FxHashSet<_> = self
            .unreachable
            .iter()
            .map(|m| MethodName::new(m.as_str()))
            .collect();

        Ok(Program {
            methods,
            classes,
            unreachable,
            invocations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{constant_returns, Arg, ConstDesc, ProgramDesc, StmtDesc};
    use crate::error::Error;

    #[test]
    fn parses_json() {
        let desc = ProgramDesc::from_json(
            r#"{
              "classes": [{"name": "A"}],
              "methods": [{
                "name": "Main.main",
                "body": [
                  {"op": "new", "lhs": "a", "class": "A"},
                  {"op": "call", "method": "Main.queryFor", "args": ["a", {"str": "k"}, "null"]},
                  {"op": "return"}
                ]
              }]
            }"#,
        )
        .unwrap();
        assert_eq!(
            desc.methods[0].body[1],
            StmtDesc::Call {
                lhs: None,
                method: "Main.queryFor".into(),
                args: vec![Arg::local("a"), Arg::str("k"), Arg::Const(ConstDesc::Null)],
            }
        );
        let program = desc.lower().unwrap();
        assert_eq!(program.invocations().len(), 1);
    }

    #[test]
    fn keys_from_constant_returns() {
        let desc = ProgramDesc::from_json(
            r#"{"methods": [
              {"name": "Keys.key", "body": [
                {"op": "const", "lhs": "k", "value": {"str": "KEY"}},
                {"op": "return", "value": "k"}
              ]},
              {"name": "Keys.outer", "body": [
                {"op": "call", "lhs": "k", "method": "Keys.key"},
                {"op": "return", "value": "k"}
              ]},
              {"name": "Keys.either", "params": ["p"], "body": [
                {"op": "if", "lhs": "p", "cmp": "eq", "rhs": "null", "target": 2},
                {"op": "return", "value": {"str": "a"}},
                {"op": "return", "value": {"str": "b"}}
              ]}
            ]}"#,
        )
        .unwrap();
        let returns = constant_returns(&desc.methods);
        assert_eq!(returns.get("Keys.key"), Some(&ConstDesc::Str("KEY".into())));
        assert_eq!(returns.get("Keys.outer"), Some(&ConstDesc::Str("KEY".into())));
        assert_eq!(returns.get("Keys.either"), None);
    }

    #[test]
    fn rejects_bad_targets() {
        let desc = ProgramDesc::from_json(
            r#"{"methods": [{"name": "Main.main", "body": [{"op": "goto", "target": 7}]}]}"#,
        )
        .unwrap();
        assert!(matches!(desc.lower(), Err(Error::MalformedProgram(_))));
    }

    #[test]
    fn rejects_unknown_superclass() {
        let desc = ProgramDesc::from_json(
            r#"{"classes": [{"name": "B", "superclass": "A"}], "methods": []}"#,
        )
        .unwrap();
        assert!(matches!(desc.lower(), Err(Error::MalformedProgram(_))));
    }
}
