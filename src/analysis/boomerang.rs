// SPDX-License-Identifier: BSD-3-Clause
//! Orchestration of the solvers answering one query.
//!
//! Each query runs in a fresh run, which owns every solver the query
//! raises, keyed by their own query so that a solver is created at most
//! once. Solvers take turns. Whatever a solver cannot resolve on its own
//! (call sites, field writes, allocations reached with a non-empty access
//! path) comes out of its outbox and is handled here, usually by asking
//! another solver.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info, info_span};

use crate::arc::Arc;
use crate::error::Result;
use crate::ir::{Callee, Field, Local, MethodName, Program, Statement};
use crate::nodes::{Generator, Location, Node, PushNode, SolverId, State, Successor};
use crate::query::{BackwardQuery, ForwardQuery, Query};
use crate::scope::DataFlowScope;
use crate::weight::Weight;
use crate::wpa::Transition;

use super::callgraph::CallGraph;
use super::results::{BackwardResults, ForwardResults, Stats};
use super::solver::{
    CallListener, Direction, Env, Export, FieldListener, Notification, Status, SyncPdsSolver,
};
use super::weights::WeightFunctions;
use super::Options;

/// Steps a solver takes before the next one gets a turn
const BATCH: usize = 64;

pub struct Boomerang<'a, W: Weight> {
    program: &'a Program,
    callgraph: CallGraph,
    scope: &'a dyn DataFlowScope,
    weights: &'a dyn WeightFunctions<W>,
    options: Options,
}

impl<'a, W: Weight> Boomerang<'a, W> {
    /// Unless the call graph is built on the fly, builds it by class
    /// hierarchy analysis.
    pub fn new(
        program: &'a Program,
        scope: &'a dyn DataFlowScope,
        weights: &'a dyn WeightFunctions<W>,
        options: Options,
    ) -> Self {
        let callgraph = if options.on_the_fly_call_graph {
            CallGraph::new()
        } else {
            CallGraph::class_hierarchy(program)
        };
        Boomerang {
            program,
            callgraph,
            scope,
            weights,
            options,
        }
    }

    /// Edges discovered so far; shared by all queries.
    pub fn callgraph(&self) -> &CallGraph {
        &self.callgraph
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    fn run(&self) -> Run<'_, W> {
        Run {
            env: Env {
                program: self.program,
                callgraph: &self.callgraph,
                scope: self.scope,
                weights: self.weights,
                options: self.options,
            },
            solvers: Vec::new(),
            queries: FxHashMap::default(),
            allocations: FxHashMap::default(),
            subscribers: FxHashMap::default(),
            resolved_call_sites: FxHashSet::default(),
            resolved_methods: FxHashSet::default(),
            registered: FxHashSet::default(),
            steps: 0,
            start: Instant::now(),
            timed_out: false,
        }
    }

    /// Allocation sites the queried value may come from, and, if requested,
    /// every access path aliasing it at the query statement.
    pub fn solve_backward(&self, query: &BackwardQuery) -> Result<BackwardResults> {
        let span = info_span!("backward", %query);
        let _span = span.enter();
        info!("start");

        let mut run = self.run();
        let id = run.solver(Query::Backward(query.clone()));
        if self.options.compute_aliases {
            run.subscribe(id, Subscriber::Aliases);
        }
        run.drive()?;

        let mut allocation_sites = run.allocations.get(&id).cloned().unwrap_or_default();
        allocation_sites.sort();
        let mut aliases = BTreeSet::new();
        if self.options.compute_aliases {
            for q in &allocation_sites {
                if let Some(f) = run.queries.get(&Query::Forward(q.clone())) {
                    aliases.extend(run.get(*f).access_paths_at(&query.node().stmt));
                }
            }
        }
        let stats = run.stats();
        info!(
            allocations = allocation_sites.len(),
            timed_out = run.timed_out,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "done"
        );
        Ok(BackwardResults {
            query: query.clone(),
            allocation_sites,
            aliases,
            timed_out: run.timed_out,
            status: run.get(id).status,
            automata: run.get(id).snapshot(),
            stats,
        })
    }

    /// Every node the allocated object reaches.
    pub fn solve_forward(&self, query: &ForwardQuery) -> Result<ForwardResults<W>> {
        let span = info_span!("forward", %query);
        let _span = span.enter();
        info!("start");

        let mut run = self.run();
        let id = run.solver(Query::Forward(query.clone()));
        run.drive()?;

        let solver = run.get(id);
        let mut table = BTreeMap::new();
        for (n, w) in solver.node_weights() {
            if !solver.holds_directly(&n) {
                continue;
            }
            if self.options.prune_contradictory_data_flow_path && self.weights.contradicts(query, &w)
            {
                debug!(node = %n, "pruned");
                continue;
            }
            table.insert(n, w);
        }

        let mut invoked_methods = BTreeSet::new();
        if let Some(class) = query.class() {
            for n in table.keys() {
                let Some(e) = n.stmt.invoke_expr() else {
                    continue;
                };
                if let Callee::Virtual { base, name } = &e.callee {
                    if *base == n.fact {
                        invoked_methods.extend(self.program.dispatch(class, name));
                    }
                }
            }
        }

        let results = ForwardResults {
            query: query.clone(),
            invoked_methods,
            contains_call_recursion: solver.calls.contains_loop(),
            contains_field_loop: solver.fields.contains_loop(),
            visited_methods: solver.visited_methods().cloned().collect(),
            timed_out: run.timed_out,
            status: solver.status,
            automata: solver.snapshot(),
            stats: run.stats(),
            paths: self.options.track_data_flow_path,
            table,
        };
        info!(
            nodes = results.table.len(),
            timed_out = results.timed_out,
            elapsed_ms = results.stats.elapsed.as_millis() as u64,
            "done"
        );
        Ok(results)
    }
}

/// What to do with the allocations a backward solver finds.
#[derive(Clone, Debug)]
enum Subscriber {
    /// Add call edges for the receiver's runtime class
    ResolveCallSite {
        call_site: Statement,
        name: Arc<String>,
    },
    /// Find the aliases of the written-to base, for the forward solver that
    /// found the write
    FieldWrite {
        requester: SolverId,
        store: Node,
        base: Local,
        field: Field,
    },
    /// Track every allocation forward
    Aliases,
}

/// Listeners registered on one solver on behalf of another
#[derive(Debug, Hash, PartialEq, Eq)]
enum Registration {
    AliasesAt {
        forward: SolverId,
        requester: SolverId,
        store: Node,
    },
    StoresOf {
        forward: SolverId,
        requester: SolverId,
        field: Field,
        continuation: State,
    },
    StoreContext {
        forward: SolverId,
        requester: SolverId,
        rhs: Node,
    },
    Copy {
        from: SolverId,
        to: SolverId,
        state: State,
    },
}

struct Run<'r, W: Weight> {
    env: Env<'r, W>,
    solvers: Vec<SyncPdsSolver<W>>,
    queries: FxHashMap<Query, SolverId>,
    /// Allocations found by each backward solver, in order
    allocations: FxHashMap<SolverId, Vec<ForwardQuery>>,
    subscribers: FxHashMap<SolverId, Vec<Subscriber>>,
    resolved_call_sites: FxHashSet<Statement>,
    resolved_methods: FxHashSet<MethodName>,
    registered: FxHashSet<Registration>,
    steps: u64,
    start: Instant,
    timed_out: bool,
}

impl<W: Weight> Run<'_, W> {
    #[inline]
    fn get(&self, id: SolverId) -> &SyncPdsSolver<W> {
        &self.solvers[id.0 as usize]
    }

    #[inline]
    fn get_mut(&mut self, id: SolverId) -> &mut SyncPdsSolver<W> {
        &mut self.solvers[id.0 as usize]
    }

    /// The solver for `query`, created if need be.
    fn solver(&mut self, query: Query) -> SolverId {
        if let Some(id) = self.queries.get(&query) {
            return *id;
        }
        let id = SolverId(self.solvers.len() as u32);
        let direction = match query {
            Query::Forward(_) => Direction::Forward,
            Query::Backward(_) => Direction::Backward,
        };
        debug!(solver = %id, %query, "new solver");
        self.solvers
            .push(SyncPdsSolver::new(id, direction, query.node().clone()));
        self.queries.insert(query, id);
        id
    }

    fn exhausted(&self) -> bool {
        if let Some(max) = self.env.options.max_steps {
            if self.steps >= max {
                return true;
            }
        }
        if let Some(timeout) = self.env.options.timeout {
            if self.steps % BATCH as u64 == 0 && self.start.elapsed() >= timeout {
                return true;
            }
        }
        false
    }

    /// Runs every solver until none has anything left to do, or the budget
    /// runs out.
    fn drive(&mut self) -> Result<()> {
        loop {
            let mut progressed = false;
            let mut i = 0;
            // Solvers created along the way get their turn in the same round
            while i < self.solvers.len() {
                let id = SolverId(i as u32);
                for _ in 0..BATCH {
                    let solver = &mut self.solvers[i];
                    solver.refresh(&self.env);
                    if solver.is_idle() {
                        break;
                    }
                    if self.exhausted() {
                        self.timed_out = true;
                        self.finish(Status::TimedOut);
                        return Ok(());
                    }
                    self.solvers[i].step(&self.env)?;
                    self.steps += 1;
                    progressed = true;
                    while let Some(n) = self.solvers[i].outbox.pop_front() {
                        self.handle(id, n);
                    }
                }
                i += 1;
            }
            if !progressed {
                self.finish(Status::Converged);
                return Ok(());
            }
        }
    }

    fn finish(&mut self, status: Status) {
        for s in &mut self.solvers {
            s.status = status;
        }
    }

    fn handle(&mut self, from: SolverId, n: Notification) {
        let program = self.env.program;
        match n {
            Notification::CallSite(cs) => {
                if self.env.options.on_the_fly_call_graph {
                    self.resolve_call_site(&cs);
                }
            }
            Notification::Callers(m) => {
                if self.env.options.on_the_fly_call_graph && self.resolved_methods.insert(m.clone())
                {
                    let sites: Vec<_> = program.calls_named(m.name()).cloned().collect();
                    for cs in &sites {
                        self.resolve_call_site(cs);
                    }
                }
            }
            Notification::FieldWrite { store, base, field } => {
                let b = self.solver(Query::Backward(BackwardQuery::new(
                    store.stmt.clone(),
                    base.clone(),
                )));
                self.subscribe(
                    b,
                    Subscriber::FieldWrite {
                        requester: from,
                        store,
                        base,
                        field,
                    },
                );
            }
            Notification::Allocation {
                node,
                label,
                target,
            } => {
                let Ok(q) = ForwardQuery::new(node.stmt.clone(), node.fact.clone()) else {
                    return;
                };
                if label == Field::Empty {
                    self.found_allocation(from, q);
                } else {
                    // The value is in field `label` of this object
                    let f = self.solver(Query::Forward(q));
                    let fresh = self.registered.insert(Registration::StoresOf {
                        forward: f,
                        requester: from,
                        field: label.clone(),
                        continuation: target.clone(),
                    });
                    if fresh {
                        self.get_mut(f).fields.register_update_listener(FieldListener::Export(
                            Export::StoresOf {
                                requester: from,
                                field: label,
                                continuation: target,
                            },
                        ));
                    }
                }
            }
            Notification::AliasAt {
                requester,
                store,
                field,
                alias,
                frames,
            } => {
                debug!(solver = %requester, %store, %alias, %field, "alias at field write");
                let solver = self.get_mut(requester);
                if !frames.is_empty() {
                    solver.inject(&store, alias, field, frames);
                    return;
                }
                for t in program.successors(&store.stmt) {
                    solver.apply(
                        &store,
                        Successor::Push(PushNode {
                            node: Node::new(t.clone(), alias.fact.clone()),
                            location: Location::Field(field.clone()),
                        }),
                    );
                }
            }
            Notification::StoreFound {
                requester,
                continuation,
                store,
                rhs,
            } => {
                let to = Node::new(store.stmt.clone(), rhs);
                debug!(solver = %requester, %store, rhs = %to, "store found");
                self.get_mut(requester).fields.register_out_listener(
                    continuation,
                    None,
                    FieldListener::PopMatch { to: to.clone() },
                );
                let fresh = self.registered.insert(Registration::StoreContext {
                    forward: from,
                    requester,
                    rhs: to.clone(),
                });
                if fresh {
                    self.get_mut(from).calls.register_out_listener(
                        State::Single(store.fact.clone()),
                        Some(store.stmt.clone()),
                        CallListener::Export(Export::StoreContext { requester, rhs: to }),
                    );
                }
            }
            Notification::StoreContext {
                requester,
                rhs,
                context,
            } => {
                let context = self.import(from, requester, context);
                self.get_mut(requester).calls.add_transition(
                    Transition::new(State::Single(rhs.fact), rhs.stmt, context),
                    W::one(),
                );
            }
            Notification::CopyTransition {
                requester,
                transition,
            } => {
                let source = self.import(from, requester, transition.source);
                let target = self.import(from, requester, transition.target);
                self.get_mut(requester).calls.add_transition(
                    Transition::new(source, transition.label, target),
                    W::one(),
                );
            }
        }
    }

    /// The copy in `to`'s call automaton of the state `q` of `from`'s call
    /// automaton. Transitions out of `q` are copied as they appear.
    fn import(&mut self, from: SolverId, to: SolverId, q: State) -> State {
        if &q == self.get(from).bottom() {
            return self.get(to).bottom().clone();
        }
        let fresh = self.registered.insert(Registration::Copy {
            from,
            to,
            state: q.clone(),
        });
        if fresh {
            self.get_mut(from).calls.register_out_listener(
                q.clone(),
                None,
                CallListener::Export(Export::Copy { requester: to }),
            );
        }
        State::generated(q, Generator::Imported(from))
    }

    fn resolve_call_site(&mut self, cs: &Statement) {
        if !self.resolved_call_sites.insert(cs.clone()) {
            return;
        }
        let Some(e) = cs.invoke_expr() else {
            return;
        };
        match &e.callee {
            Callee::Static(m) => {
                if self.env.program.method(m).is_some() {
                    self.env.callgraph.add_edge(cs, m);
                }
            }
            Callee::Virtual { base, name } => {
                let b = self.solver(Query::Backward(BackwardQuery::new(cs.clone(), base.clone())));
                self.subscribe(
                    b,
                    Subscriber::ResolveCallSite {
                        call_site: cs.clone(),
                        name: name.clone(),
                    },
                );
            }
        }
    }

    fn subscribe(&mut self, solver: SolverId, sub: Subscriber) {
        self.subscribers
            .entry(solver)
            .or_default()
            .push(sub.clone());
        let found = self.allocations.get(&solver).cloned().unwrap_or_default();
        for q in &found {
            self.notify(&sub, q);
        }
    }

    fn found_allocation(&mut self, solver: SolverId, q: ForwardQuery) {
        let found = self.allocations.entry(solver).or_default();
        if found.contains(&q) {
            return;
        }
        found.push(q.clone());
        debug!(%solver, allocation = %q, "allocation");
        let subs = self.subscribers.get(&solver).cloned().unwrap_or_default();
        for sub in &subs {
            self.notify(sub, &q);
        }
    }

    fn notify(&mut self, sub: &Subscriber, q: &ForwardQuery) {
        match sub {
            Subscriber::ResolveCallSite { call_site, name } => {
                let Some(class) = q.class() else {
                    return;
                };
                if let Some(m) = self.env.program.dispatch(class, name) {
                    self.env.callgraph.add_edge(call_site, &m);
                }
            }
            Subscriber::FieldWrite {
                requester,
                store,
                base,
                field,
            } => {
                let g = self.solver(Query::Forward(q.clone()));
                let fresh = self.registered.insert(Registration::AliasesAt {
                    forward: g,
                    requester: *requester,
                    store: store.clone(),
                });
                if fresh {
                    let solver = self.get_mut(g);
                    solver
                        .fields
                        .register_update_listener(FieldListener::Export(Export::AliasesAt {
                            requester: *requester,
                            store: store.clone(),
                            base: base.clone(),
                            field: field.clone(),
                        }));
                    solver.export_caller_frames(*requester, store, base, field);
                }
            }
            Subscriber::Aliases => {
                self.solver(Query::Forward(q.clone()));
            }
        }
    }

    fn stats(&self) -> Stats {
        let mut methods = FxHashSet::default();
        let mut stats = Stats {
            elapsed: self.start.elapsed(),
            solvers: self.solvers.len(),
            steps: self.steps,
            ..Stats::default()
        };
        for s in &self.solvers {
            stats.reached_nodes += s.num_processed();
            stats.call_transitions += s.calls.num_transitions();
            stats.field_transitions += s.fields.num_transitions();
            methods.extend(s.visited_methods().cloned());
        }
        stats.visited_methods = methods.len();
        stats
    }
}
