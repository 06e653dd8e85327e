// SPDX-License-Identifier: BSD-3-Clause
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use crate::ir::{Field, Local, MethodName, Statement};
use crate::nodes::{Node, State};
use crate::query::{BackwardQuery, ForwardQuery};
use crate::weight::{DataFlowPath, NoWeight, PathElement};
use crate::wpa::{Transition, WeightedAutomaton};

use super::Status;

/// A local followed by fields.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct AccessPath {
    pub base: Local,
    pub fields: Vec<Field>,
}

impl AccessPath {
    pub fn new(base: Local, fields: Vec<Field>) -> Self {
        AccessPath { base, fields }
    }
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        for field in &self.fields {
            match field {
                Field::Array | Field::Key(_) | Field::AnyKey => write!(f, "{field}")?,
                _ => write!(f, ".{field}")?,
            }
        }
        Ok(())
    }
}

/// Work done answering a query, including the queries it raised.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub elapsed: Duration,
    pub solvers: usize,
    pub reached_nodes: usize,
    /// Transitions of all call automata
    pub call_transitions: usize,
    /// Transitions of all field automata
    pub field_transitions: usize,
    pub visited_methods: usize,
    pub steps: u64,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}ms, {} solvers, {} nodes, {}+{} transitions, {} methods, {} steps",
            self.elapsed.as_millis(),
            self.solvers,
            self.reached_nodes,
            self.call_transitions,
            self.field_transitions,
            self.visited_methods,
            self.steps
        )
    }
}

/// The automata of a query's own solver as they were when it stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    /// Final state of both automata
    pub bottom: State,
    /// Nodes reached in both automata
    pub reached: BTreeSet<Node>,
    pub call_transitions: BTreeSet<Transition<State, Statement>>,
    pub field_transitions: BTreeSet<Transition<State, Field>>,
}

impl Snapshot {
    /// The call automaton, for listeners `K`. Listeners registered on it are
    /// replayed every transition.
    pub fn call_automaton<K: Clone>(&self) -> WeightedAutomaton<State, Statement, NoWeight, K> {
        let mut a = WeightedAutomaton::new();
        a.add_final_state(self.bottom.clone());
        for t in &self.call_transitions {
            a.add_transition(t.clone(), NoWeight::One);
        }
        a
    }

    pub fn field_automaton<K: Clone>(&self) -> WeightedAutomaton<State, Field, NoWeight, K> {
        let mut a = WeightedAutomaton::new();
        a.add_final_state(self.bottom.clone());
        for t in &self.field_transitions {
            a.add_transition(t.clone(), NoWeight::One);
        }
        a
    }
}

#[derive(Clone, Debug)]
pub struct BackwardResults {
    pub query: BackwardQuery,
    /// Allocations whose object the queried value may be
    pub allocation_sites: Vec<ForwardQuery>,
    /// Every access path holding one of those objects at the query
    /// statement; empty unless aliases were requested
    pub aliases: BTreeSet<AccessPath>,
    pub timed_out: bool,
    /// `Converged`, or `TimedOut` along with `timed_out`
    pub status: Status,
    pub automata: Snapshot,
    pub stats: Stats,
}

impl BackwardResults {
    pub fn is_empty(&self) -> bool {
        self.allocation_sites.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct ForwardResults<W> {
    pub query: ForwardQuery,
    /// Weight of each node whose local holds the object itself
    pub table: BTreeMap<Node, W>,
    /// Methods called on the object
    pub invoked_methods: BTreeSet<MethodName>,
    pub contains_call_recursion: bool,
    pub contains_field_loop: bool,
    pub visited_methods: BTreeSet<MethodName>,
    pub timed_out: bool,
    pub status: Status,
    pub automata: Snapshot,
    pub stats: Stats,
    pub(crate) paths: bool,
}

impl<W> ForwardResults<W> {
    /// Whether the object reaches `node`
    pub fn reaches(&self, node: &Node) -> bool {
        self.table.contains_key(node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.table.keys()
    }
}

impl ForwardResults<DataFlowPath> {
    /// How the object got to `node`, if it did and paths were tracked.
    pub fn data_flow_path(&self, node: &Node) -> Option<Vec<PathElement>> {
        if !self.paths {
            return None;
        }
        self.table.get(node).map(DataFlowPath::elements)
    }
}
