// SPDX-License-Identifier: BSD-3-Clause
//! Flow functions of backward solvers: where did the value of the fact come
//! from?

use crate::ir::{Local, Method, Program, Rhs, Statement, Stmt, Val};
use crate::nodes::{Location, Node, PopNode, PushNode, Successor};

use super::solver::{Flow, Hook};

pub(crate) fn flow(program: &Program, n: &Node) -> Flow {
    let mut flow = Flow::default();
    let s = &n.stmt;
    let v = &n.fact;
    if s.is_allocation_of(v) {
        flow.hooks.push(Hook::Allocation);
        return flow;
    }
    if let Some(m) = program.method(s.method()) {
        if m.is_start(s) && (m.param_index(v).is_some() || m.is_this(v)) {
            flow.callers_of = Some(m.name.clone());
        }
    }
    for p in program.predecessors(s) {
        let to = |fact| Node::new(p.clone(), fact);
        match p.kind() {
            Stmt::Assign { lhs, rhs } if lhs == v => match rhs {
                Rhs::Local(r) => flow.successors.push(Successor::Normal(to(r.clone()))),
                // Reaches the allocation node, processed next
                Rhs::New(_) | Rhs::Constant(_) => {
                    flow.successors.push(Successor::Normal(to(v.clone())))
                }
                Rhs::Load { base, field } => flow.successors.push(Successor::Push(PushNode {
                    node: to(base.clone()),
                    location: Location::Field(field.clone()),
                })),
                Rhs::Invoke(_) => flow.call_sites.push(p.clone()),
            },
            Stmt::Store { base, field, rhs } if base == v => {
                flow.successors.push(Successor::Pop(PopNode {
                    node: to(rhs.clone()),
                    location: Location::Field(field.clone()),
                }));
                flow.successors.push(Successor::Normal(to(v.clone())));
            }
            _ => flow.successors.push(Successor::Normal(to(v.clone()))),
        }
    }
    flow
}

/// Into `callee` at each of its `return`s, for the value `call_site` assigns.
pub(crate) fn into_callee(_n: &Node, call_site: &Statement, callee: &Method) -> Vec<Successor> {
    callee
        .exits()
        .iter()
        .filter_map(|e| match e.kind() {
            Stmt::Return(Some(Val::Local(r))) => Some(Successor::Push(PushNode {
                node: Node::new(e.clone(), r.clone()),
                location: Location::Call(call_site.clone()),
            })),
            _ => None,
        })
        .collect()
}

/// Out of `callee` at its start, to the argument or receiver at `call_site`.
pub(crate) fn to_caller(n: &Node, callee: &Method, call_site: &Statement) -> Vec<Successor> {
    let Some(e) = call_site.invoke_expr() else {
        return Vec::new();
    };
    let v = &n.fact;
    let mut out = Vec::new();
    let mut leave = |fact: &Local| {
        out.push(Successor::Pop(PopNode {
            node: Node::new(call_site.clone(), fact.clone()),
            location: Location::Call(call_site.clone()),
        }))
    };
    if let Some(a) = callee
        .param_index(v)
        .and_then(|i| e.args.get(i))
        .and_then(Val::as_local)
    {
        leave(a);
    }
    if callee.is_this(v) {
        if let Some(b) = e.base() {
            leave(b);
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
    fn loads_push_and_stores_pop() {
        let mut p = ProgramBuilder::new();
        let mut m = p.method("Main.main");
        m.new_object("a", "A");
        m.new_object("x", "B");
        m.store("x", "f", "a");
        m.load("t", "x", "f");
        m.nop();
        let program = p.build().unwrap();
        let body = program.methods().next().unwrap().body().to_vec();
        let a = body[0].defined().unwrap().clone();
        let x = body[1].defined().unwrap().clone();
        let t = body[3].defined().unwrap().clone();

        let at_nop = flow(&program, &Node::new(body[4].clone(), t));
        assert_eq!(
            at_nop.successors,
            vec![Successor::Push(crate::nodes::PushNode {
                node: Node::new(body[3].clone(), x.clone()),
                location: Location::Field(Field::named("f")),
            })]
        );

        let at_load = flow(&program, &Node::new(body[3].clone(), x.clone()));
        assert!(at_load.successors.contains(&Successor::Normal(Node::new(
            body[2].clone(),
            x.clone()
        ))));
        assert!(at_load.successors.iter().any(|s| matches!(
            s,
            Successor::Pop(p) if p.node == Node::new(body[2].clone(), a.clone())
        )));

        let at_alloc = flow(&program, &Node::new(body[0].clone(), a));
        assert!(at_alloc.successors.is_empty());
        assert_eq!(at_alloc.hooks.len(), 1);
    }
}
