// SPDX-License-Identifier: BSD-3-Clause
//! Call graph, shared by all the queries a [`super::Boomerang`] answers.
//!
//! Edges are only ever appended, and the edges of every call site and every
//! method are kept in insertion order, so a reader can remember how many it
//! has seen and pick up from there.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::ir::{Callee, MethodName, Program, Statement};

#[derive(Debug, Default)]
pub struct CallGraph {
    callees: DashMap<Statement, Vec<MethodName>>,
    callers: DashMap<MethodName, Vec<Statement>>,
    /// Number of edges
    version: AtomicUsize,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every static call to a defined method, and every virtual call to each
    /// method any class would dispatch it to.
    pub fn class_hierarchy(program: &Program) -> Self {
        let cg = CallGraph::new();
        let mut classes: Vec<_> = program.classes().map(|c| c.name.clone()).collect();
        classes.sort();
        for cs in program.invocations() {
            let Some(e) = cs.invoke_expr() else {
                continue;
            };
            match &e.callee {
                Callee::Static(m) => {
                    if program.method(m).is_some() {
                        cg.add_edge(cs, m);
                    }
                }
                Callee::Virtual { name, .. } => {
                    for c in &classes {
                        if let Some(m) = program.dispatch(c, name) {
                            cg.add_edge(cs, &m);
                        }
                    }
                }
            }
        }
        cg
    }

    /// Returns whether the edge is new.
    pub fn add_edge(&self, call_site: &Statement, callee: &MethodName) -> bool {
        {
            let mut callees = self.callees.entry(call_site.clone()).or_default();
            if callees.contains(callee) {
                return false;
            }
            callees.push(callee.clone());
        }
        self.callers
            .entry(callee.clone())
            .or_default()
            .push(call_site.clone());
        self.version.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(call_site = ?call_site, callee = %callee, "call edge");
        true
    }

    pub fn callees(&self, call_site: &Statement) -> Vec<MethodName> {
        self.callees
            .get(call_site)
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn callers(&self, method: &MethodName) -> Vec<Statement> {
        self.callers
            .get(method)
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Changes whenever an edge is added
    #[inline]
    pub fn version(&self) -> usize {
        self.version.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.version()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::CallGraph;
    use crate::ir::{MethodName, ProgramBuilder};

    #[test]
    fn class_hierarchy() {
        let mut p = ProgramBuilder::new();
        p.class("A", None).class("B", Some("A")).class("C", None);
        p.method("A.foo").this("this");
        p.method("B.foo").this("this");
        p.method("C.bar").this("this");
        let mut m = p.method("Main.main");
        m.new_object("o", "A");
        let call = m.vcall(None, "o", "foo", &[]);
        m.call(None, "Main.missing", &[]);
        let program = p.build().unwrap();
        let cg = CallGraph::class_hierarchy(&program);
        let main = program.method(&MethodName::new("Main.main")).unwrap();
        let cs = &main.body()[call as usize];
        assert_eq!(
            cg.callees(cs),
            vec![MethodName::new("A.foo"), MethodName::new("B.foo")]
        );
        assert_eq!(cg.callers(&MethodName::new("B.foo")), vec![cs.clone()]);
        assert_eq!(cg.len(), 2);
        assert!(!cg.add_edge(cs, &MethodName::new("A.foo")));
        assert_eq!(cg.version(), 2);
    }
}
