// SPDX-License-Identifier: BSD-3-Clause
//! Flow functions of forward solvers: where does the object held by the
//! fact go next?

use crate::ir::{Method, Program, Rhs, Statement, Stmt, Val};
use crate::nodes::{Location, Node, PopNode, PushNode, Successor};

use super::solver::{Flow, Hook};

pub(crate) fn flow(program: &Program, seed: &Node, n: &Node) -> Flow {
    let mut flow = Flow::default();
    let s = &n.stmt;
    let v = &n.fact;
    let succs = program.successors(s);
    match s.kind() {
        Stmt::Assign { lhs, rhs } => {
            match rhs {
                Rhs::Local(r) if r == v => flow.normal(succs, lhs),
                Rhs::Load { base, field } if base == v => {
                    for t in succs {
                        flow.successors.push(Successor::Pop(PopNode {
                            node: Node::new(t.clone(), lhs.clone()),
                            location: Location::Field(field.clone()),
                        }));
                    }
                }
                Rhs::Invoke(e) if e.base() == Some(v) || e.arg_index(v).next().is_some() => {
                    flow.call_sites.push(s.clone());
                }
                _ => (),
            }
            // The allocation site itself defines the fact
            if lhs != v || n == seed {
                flow.normal(succs, v);
            }
        }
        Stmt::Store { base, field, rhs } => {
            if rhs == v {
                for t in succs {
                    flow.successors.push(Successor::Push(PushNode {
                        node: Node::new(t.clone(), base.clone()),
                        location: Location::Field(field.clone()),
                    }));
                }
                flow.hooks.push(Hook::FieldWrite {
                    base: base.clone(),
                    field: field.clone(),
                });
            }
            flow.normal(succs, v);
        }
        Stmt::Invoke(e) => {
            if e.base() == Some(v) || e.arg_index(v).next().is_some() {
                flow.call_sites.push(s.clone());
            }
            flow.normal(succs, v);
        }
        Stmt::Return(_) => flow.callers_of = Some(s.method().clone()),
        Stmt::If { .. } | Stmt::Goto(_) | Stmt::Nop => flow.normal(succs, v),
    }
    flow
}

/// Into `callee` at `call_site`: arguments become parameters and the
/// receiver becomes `this`.
pub(crate) fn into_callee(n: &Node, call_site: &Statement, callee: &Method) -> Vec<Successor> {
    let mut out = Vec::new();
    let (Some(e), Some(start)) = (call_site.invoke_expr(), callee.start()) else {
        return out;
    };
    let mut enter = |fact| {
        out.push(Successor::Push(PushNode {
            node: Node::new(start.clone(), fact),
            location: Location::Call(call_site.clone()),
        }))
    };
    for i in e.arg_index(&n.fact) {
        if let Some(p) = callee.params.get(i) {
            enter(p.clone());
        }
    }
    if e.base() == Some(&n.fact) {
        if let Some(this) = &callee.this {
            enter(this.clone());
        }
    }
    out
}

/// Out of `callee` at a `return`, back to the statements after
/// `call_site`.
pub(crate) fn to_caller(
    program: &Program,
    n: &Node,
    callee: &Method,
    call_site: &Statement,
) -> Vec<Successor> {
    let Some(e) = call_site.invoke_expr() else {
        return Vec::new();
    };
    let lhs = call_site.defined();
    let v = &n.fact;
    let mut targets = Vec::new();
    if let Stmt::Return(Some(Val::Local(r))) = n.stmt.kind() {
        if r == v {
            targets.extend(lhs.cloned());
        }
    }
    if let Some(a) = callee
        .param_index(v)
        .and_then(|i| e.args.get(i))
        .and_then(Val::as_local)
    {
        if Some(a) != lhs {
            targets.push(a.clone());
        }
    }
    if callee.is_this(v) {
        if let Some(b) = e.base() {
            if Some(b) != lhs {
                targets.push(b.clone());
            }
        }
    }
    let mut out = Vec::new();
    for t in program.successors(call_site) {
        for target in &targets {
            out.push(Successor::Pop(PopNode {
                node: Node::new(t.clone(), target.clone()),
                location: Location::Call(call_site.clone()),
            }));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::flow;
    use crate::ir::{Field, ProgramBuilder};
    use crate::nodes::{Location, Node, Successor};

    #[test]
    fn store_pushes_field_on_base() {
        let mut p = ProgramBuilder::new();
        let mut m = p.method("Main.main");
        m.new_object("a", "A");
        m.new_object("x", "B");
        m.store("x", "f", "a");
        m.nop();
        let program = p.build().unwrap();
        let body = program.methods().next().unwrap().body().to_vec();
        let a = body[0].defined().unwrap().clone();
        let x = body[1].defined().unwrap().clone();
        let seed = Node::new(body[0].clone(), a.clone());

        let f = flow(&program, &seed, &Node::new(body[2].clone(), a.clone()));
        assert!(f.successors.contains(&Successor::Normal(Node::new(body[3].clone(), a.clone()))));
        assert!(f.successors.iter().any(|s| matches!(
            s,
            Successor::Push(p) if p.node == Node::new(body[3].clone(), x.clone())
                && p.location == Location::Field(Field::named("f"))
        )));
        assert_eq!(f.hooks.len(), 1);

        // Reassigning the fact kills it, except at the seed
        let at_seed = flow(&program, &seed, &seed);
        assert_eq!(at_seed.successors.len(), 1);
        let other = Node::new(body[1].clone(), x);
        let killed = flow(&program, &seed, &other);
        assert!(killed.successors.is_empty());
    }
}
