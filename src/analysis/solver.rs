// SPDX-License-Identifier: BSD-3-Clause
//! The synchronized pushdown system solver.
//!
//! A solver owns two automata: the call automaton, whose transitions
//! `fact --stmt--> q` record the calling context of a fact at a statement,
//! and the field automaton, whose transitions `node --field--> q` record the
//! access path through which a node reaches the tracked object. A node is
//! processed once both automata reach it. Processing asks the flow functions
//! for its successors and registers listeners on both automata that apply
//! the corresponding rule to every transition out of the node, now and in
//! the future.
//!
//! All work is driven from event queues: the two automata's listener queues
//! and the queue of nodes waiting to be processed. Anything that concerns
//! other solvers goes to the outbox and is handled by the orchestration.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{trace, trace_span};

use crate::error::{Error, Result};
use crate::ir::{Field, Local, MethodName, Program, Statement, Stmt};
use crate::nodes::{Generator, Location, Node, PopNode, PushNode, SolverId, State, Successor};
use crate::scope::DataFlowScope;
use crate::weight::{NoWeight, Weight};
use crate::wpa::{Delivery, Transition, WeightedAutomaton};

use super::callgraph::CallGraph;
use super::weights::WeightFunctions;
use super::{backward, forward, AccessPath, Options, Snapshot};

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Where a solver is in its lifecycle.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Status {
    /// Only the seed transitions exist
    Seeded,
    Processing,
    /// Nothing is left to do
    Converged,
    /// The budget ran out first; the automata are partial
    TimedOut,
}

/// Everything a solver step may read.
pub(crate) struct Env<'a, W: Weight> {
    pub(crate) program: &'a Program,
    pub(crate) callgraph: &'a CallGraph,
    pub(crate) scope: &'a dyn DataFlowScope,
    pub(crate) weights: &'a dyn WeightFunctions<W>,
    pub(crate) options: Options,
}

/// Requests from other solvers, answered through this solver's outbox.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub(crate) enum Export {
    /// Transitions out of an allocation node reached backward
    Allocation { node: Node },
    /// Locals holding the object right at `store`
    AliasesAt {
        requester: SolverId,
        store: Node,
        base: Local,
        field: Field,
    },
    /// Walks out of the frame of `store` through the frames of its callers,
    /// innermost first; `frames` are the call sites left so far
    CallerFrames {
        requester: SolverId,
        store: Node,
        field: Field,
        frames: Vec<Statement>,
    },
    /// Nodes at the return sites of the last of `frames`
    ReturnSites {
        requester: SolverId,
        store: Node,
        field: Field,
        frames: Vec<Statement>,
    },
    /// A node at a return site that holds the object itself
    ReturnAlias {
        requester: SolverId,
        store: Node,
        field: Field,
        frames: Vec<Statement>,
    },
    /// Stores into `field` of the tracked object
    StoresOf {
        requester: SolverId,
        field: Field,
        continuation: State,
    },
    /// Calling contexts of a store found through `StoresOf`
    StoreContext { requester: SolverId, rhs: Node },
    /// Transitions out of a call automaton state, to be mirrored
    Copy { requester: SolverId },
}

#[derive(Clone, Debug)]
pub(crate) enum CallListener<W> {
    Reach,
    Normal {
        from: Node,
        to: Node,
    },
    Push {
        from: Node,
        to: Node,
        call_site: Statement,
    },
    Pop {
        from: Node,
        to: Node,
        call_site: Statement,
    },
    /// Waits for the caller frame below a callee frame; `weight` is that of
    /// the callee frame.
    PopMatch {
        to: Node,
        weight: W,
    },
    /// Leaves one frame per call site in `frames`, then adds `to` in the
    /// frame reached
    Unwind {
        to: Node,
        frames: Vec<Statement>,
    },
    Export(Export),
}

#[derive(Clone, Debug)]
pub(crate) enum FieldListener {
    Reach,
    Normal { to: Node },
    Push { to: Node, field: Field },
    Pop { to: Node, field: Field },
    PopMatch { to: Node },
    Export(Export),
}

#[derive(Clone, Debug)]
pub(crate) enum Notification {
    /// Callees of this call site are wanted
    CallSite(Statement),
    /// Callers of this method are wanted
    Callers(MethodName),
    /// The tracked object is written into `base.field` at `store`
    FieldWrite {
        store: Node,
        base: Local,
        field: Field,
    },
    Allocation {
        node: Node,
        label: Field,
        target: State,
    },
    /// `alias` holds the object written at `store`; it lives in the frame
    /// reached by returning through `frames`
    AliasAt {
        requester: SolverId,
        store: Node,
        field: Field,
        alias: Node,
        frames: Vec<Statement>,
    },
    StoreFound {
        requester: SolverId,
        continuation: State,
        store: Node,
        rhs: Local,
    },
    StoreContext {
        requester: SolverId,
        rhs: Node,
        context: State,
    },
    CopyTransition {
        requester: SolverId,
        transition: Transition<State, Statement>,
    },
}

/// What processing a node yields.
#[derive(Debug, Default)]
pub(crate) struct Flow {
    pub(crate) successors: Vec<Successor>,
    /// Successors through each callee of these call sites
    pub(crate) call_sites: Vec<Statement>,
    /// Successors through each caller of this method
    pub(crate) callers_of: Option<MethodName>,
    pub(crate) hooks: Vec<Hook>,
}

impl Flow {
    pub(crate) fn normal(&mut self, succs: &[Statement], fact: &Local) {
        for t in succs {
            self.successors
                .push(Successor::Normal(Node::new(t.clone(), fact.clone())));
        }
    }
}

#[derive(Debug)]
pub(crate) enum Hook {
    FieldWrite { base: Local, field: Field },
    Allocation,
}

#[derive(Debug, Default)]
struct Watch {
    /// How many edges `nodes` have been expanded along
    seen: usize,
    nodes: Vec<Node>,
}

pub(crate) type CallAutomaton<W> = WeightedAutomaton<State, Statement, W, CallListener<W>>;
pub(crate) type FieldAutomaton = WeightedAutomaton<State, Field, NoWeight, FieldListener>;

pub(crate) struct SyncPdsSolver<W: Weight> {
    pub(crate) id: SolverId,
    pub(crate) direction: Direction,
    pub(crate) seed: Node,
    bottom: State,
    pub(crate) calls: CallAutomaton<W>,
    pub(crate) fields: FieldAutomaton,
    call_reached: FxHashSet<Node>,
    field_reached: FxHashSet<Node>,
    processed: FxHashSet<Node>,
    pending: VecDeque<Node>,
    call_sites: FxHashMap<Statement, Watch>,
    callers: FxHashMap<MethodName, Watch>,
    seen_version: usize,
    visited_methods: FxHashSet<MethodName>,
    /// Export listeners already registered, with the state they watch
    exported: FxHashSet<(State, Export)>,
    unwinds: FxHashSet<(State, Statement, Node, Vec<Statement>)>,
    pub(crate) outbox: VecDeque<Notification>,
    pub(crate) status: Status,
    turn: u8,
}

impl<W: Weight> SyncPdsSolver<W> {
    pub(crate) fn new(id: SolverId, direction: Direction, seed: Node) -> Self {
        let bottom = State::bottom(&seed);
        let mut calls = WeightedAutomaton::new();
        let mut fields = WeightedAutomaton::new();
        calls.add_final_state(bottom.clone());
        fields.add_final_state(bottom.clone());
        calls.register_update_listener(CallListener::Reach);
        fields.register_update_listener(FieldListener::Reach);
        calls.add_transition(
            Transition::new(
                State::Single(seed.fact.clone()),
                seed.stmt.clone(),
                bottom.clone(),
            ),
            W::one(),
        );
        fields.add_transition(
            Transition::new(State::Located(seed.clone()), Field::Empty, bottom.clone()),
            NoWeight::One,
        );
        SyncPdsSolver {
            id,
            direction,
            seed,
            bottom,
            calls,
            fields,
            call_reached: FxHashSet::default(),
            field_reached: FxHashSet::default(),
            processed: FxHashSet::default(),
            pending: VecDeque::new(),
            call_sites: FxHashMap::default(),
            callers: FxHashMap::default(),
            seen_version: 0,
            visited_methods: FxHashSet::default(),
            exported: FxHashSet::default(),
            unwinds: FxHashSet::default(),
            outbox: VecDeque::new(),
            status: Status::Seeded,
            turn: 0,
        }
    }

    #[inline]
    pub(crate) fn bottom(&self) -> &State {
        &self.bottom
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            bottom: self.bottom.clone(),
            reached: self.processed.iter().cloned().collect(),
            call_transitions: self
                .calls
                .transitions()
                .map(|(s, l, t, _)| Transition::new(s.clone(), l.clone(), t.clone()))
                .collect(),
            field_transitions: self
                .fields
                .transitions()
                .map(|(s, l, t, _)| Transition::new(s.clone(), l.clone(), t.clone()))
                .collect(),
        }
    }

    pub(crate) fn num_processed(&self) -> usize {
        self.processed.len()
    }

    pub(crate) fn visited_methods(&self) -> impl Iterator<Item = &MethodName> {
        self.visited_methods.iter()
    }

    pub(crate) fn is_idle(&self) -> bool {
        !self.calls.has_pending() && !self.fields.has_pending() && self.pending.is_empty()
    }

    /// Performs one unit of work: dispatches one event of either automaton or
    /// processes one node, taking turns. Returns whether there was anything
    /// to do.
    pub(crate) fn step(&mut self, env: &Env<'_, W>) -> Result<bool> {
        for _ in 0..3 {
            self.turn = (self.turn + 1) % 3;
            let worked = match self.turn {
                0 => match self.calls.poll() {
                    Some(d) => {
                        self.on_call(env, d);
                        true
                    }
                    None => false,
                },
                1 => match self.fields.poll() {
                    Some(d) => {
                        self.on_field(d);
                        true
                    }
                    None => false,
                },
                _ => match self.pending.pop_front() {
                    Some(n) => {
                        self.process(env, n)?;
                        true
                    }
                    None => false,
                },
            };
            if worked {
                self.status = Status::Processing;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn reach(&mut self, n: &Node) {
        if self.call_reached.contains(n)
            && self.field_reached.contains(n)
            && self.processed.insert(n.clone())
        {
            self.pending.push_back(n.clone());
        }
    }

    fn on_call(&mut self, env: &Env<'_, W>, d: Delivery<State, Statement, W, CallListener<W>>) {
        let Delivery {
            listener,
            transition: t,
            weight: w,
        } = d;
        match listener {
            CallListener::Reach => {
                if let State::Single(v) = &t.source {
                    let n = Node::new(t.label.clone(), v.clone());
                    if self.call_reached.insert(n.clone()) {
                        self.calls.add_initial_state(t.source.clone());
                        self.reach(&n);
                    }
                }
            }
            CallListener::Normal { from, to } => {
                let w = w.extend(&env.weights.normal(&from, &to));
                self.calls.add_transition(
                    Transition::new(State::Single(to.fact), to.stmt, t.target),
                    w,
                );
            }
            CallListener::Push {
                from,
                to,
                call_site,
            } => {
                let entry = State::generated(
                    State::Single(to.fact.clone()),
                    Generator::Stmt(to.stmt.clone()),
                );
                let pushed = env.weights.push(&from, &to, &call_site);
                self.calls.add_transition(
                    Transition::new(State::Single(to.fact), to.stmt, entry.clone()),
                    pushed,
                );
                self.calls
                    .add_transition(Transition::new(entry, call_site, t.target), w);
            }
            CallListener::Pop {
                from,
                to,
                call_site,
            } => {
                let w = w.extend(&env.weights.pop(&from, &to));
                if t.target == self.bottom {
                    // Unbalanced: leaving the frame the seed was found in
                    self.calls.add_transition(
                        Transition::new(State::Single(to.fact), to.stmt, t.target),
                        w,
                    );
                } else {
                    self.calls.register_out_listener(
                        t.target,
                        Some(call_site),
                        CallListener::PopMatch { to, weight: w },
                    );
                }
            }
            CallListener::PopMatch { to, weight } => {
                self.calls.add_transition(
                    Transition::new(State::Single(to.fact), to.stmt, t.target),
                    w.extend(&weight),
                );
            }
            CallListener::Unwind { to, frames } => match frames.split_first() {
                None => {
                    self.calls.add_transition(
                        Transition::new(State::Single(to.fact), to.stmt, t.target),
                        w,
                    );
                }
                Some(_) if t.target == self.bottom => {
                    // Unbalanced: the frames below were never entered
                    self.calls.add_transition(
                        Transition::new(State::Single(to.fact), to.stmt, t.target),
                        w,
                    );
                }
                Some((cs, rest)) => self.unwind(t.target, cs.clone(), to, rest.to_vec()),
            },
            CallListener::Export(Export::CallerFrames {
                requester,
                store,
                field,
                frames,
            }) => {
                let frames = match &t.source {
                    // The store's own transition; its target is its frame
                    State::Single(_) => frames,
                    _ => {
                        let mut frames = frames;
                        frames.push(t.label);
                        self.export_calls(
                            t.target.clone(),
                            true,
                            Export::ReturnSites {
                                requester,
                                store: store.clone(),
                                field: field.clone(),
                                frames: frames.clone(),
                            },
                        );
                        if frames.len() >= MAX_CALLER_FRAMES {
                            return;
                        }
                        frames
                    }
                };
                if t.target != self.bottom {
                    self.export_calls(
                        t.target,
                        false,
                        Export::CallerFrames {
                            requester,
                            store,
                            field,
                            frames,
                        },
                    );
                }
            }
            CallListener::Export(Export::ReturnSites {
                requester,
                store,
                field,
                frames,
            }) => {
                let State::Single(y) = t.source else {
                    return;
                };
                let Some(cs) = frames.last() else {
                    return;
                };
                if !env.program.successors(cs).contains(&t.label) {
                    return;
                }
                let located = State::Located(Node::new(t.label, y));
                let export = Export::ReturnAlias {
                    requester,
                    store,
                    field,
                    frames,
                };
                if self.exported.insert((located.clone(), export.clone())) {
                    self.fields.register_out_listener(
                        located,
                        Some(Field::Empty),
                        FieldListener::Export(export),
                    );
                }
            }
            CallListener::Export(Export::StoreContext { requester, rhs }) => {
                self.outbox.push_back(Notification::StoreContext {
                    requester,
                    rhs,
                    context: t.target,
                });
            }
            CallListener::Export(Export::Copy { requester }) => {
                self.outbox.push_back(Notification::CopyTransition {
                    requester,
                    transition: t,
                });
            }
            CallListener::Export(_) => (),
        }
    }

    fn on_field(&mut self, d: Delivery<State, Field, NoWeight, FieldListener>) {
        let t = d.transition;
        match d.listener {
            FieldListener::Reach => {
                if let State::Located(n) = &t.source {
                    if self.field_reached.insert(n.clone()) {
                        self.fields.add_initial_state(t.source.clone());
                        self.reach(n);
                    }
                }
            }
            FieldListener::Normal { to } => {
                self.fields.add_transition(
                    Transition::new(State::Located(to), t.label, t.target),
                    NoWeight::One,
                );
            }
            FieldListener::Push { to, field } => {
                let pushed = State::generated(
                    State::Located(to.clone()),
                    Generator::Field(field.clone()),
                );
                self.fields.add_transition(
                    Transition::new(State::Located(to), field, pushed.clone()),
                    NoWeight::One,
                );
                self.fields
                    .add_transition(Transition::new(pushed, t.label, t.target), NoWeight::One);
            }
            FieldListener::Pop { to, field } => {
                if field.matches(&t.label) {
                    self.fields
                        .register_out_listener(t.target, None, FieldListener::PopMatch { to });
                }
            }
            FieldListener::PopMatch { to } => {
                self.fields.add_transition(
                    Transition::new(State::Located(to), t.label, t.target),
                    NoWeight::One,
                );
            }
            FieldListener::Export(Export::Allocation { node }) => {
                self.outbox.push_back(Notification::Allocation {
                    node,
                    label: t.label,
                    target: t.target,
                });
            }
            FieldListener::Export(Export::AliasesAt {
                requester,
                store,
                base,
                field,
            }) => {
                if t.label != Field::Empty {
                    return;
                }
                let State::Located(n) = t.source else {
                    return;
                };
                if n.stmt == store.stmt && n.fact != base {
                    self.outbox.push_back(Notification::AliasAt {
                        requester,
                        store,
                        field,
                        alias: n,
                        frames: Vec::new(),
                    });
                }
            }
            FieldListener::Export(Export::ReturnAlias {
                requester,
                store,
                field,
                frames,
            }) => {
                let State::Located(n) = t.source else {
                    return;
                };
                self.outbox.push_back(Notification::AliasAt {
                    requester,
                    store,
                    field,
                    alias: n,
                    frames,
                });
            }
            FieldListener::Export(Export::StoresOf {
                requester,
                field,
                continuation,
            }) => {
                if t.label != Field::Empty {
                    return;
                }
                let State::Located(n) = t.source else {
                    return;
                };
                if let Stmt::Store {
                    base,
                    field: written,
                    rhs,
                } = n.stmt.kind()
                {
                    if *base == n.fact && field.matches(written) {
                        let rhs = rhs.clone();
                        self.outbox.push_back(Notification::StoreFound {
                            requester,
                            continuation,
                            store: n,
                            rhs,
                        });
                    }
                }
            }
            FieldListener::Export(_) => (),
        }
    }

    fn process(&mut self, env: &Env<'_, W>, n: Node) -> Result<()> {
        let span = trace_span!("process", node = %n);
        let _span = span.enter();

        let method = n.stmt.method().clone();
        if env.options.check_assertions && env.program.is_unreachable(&method) {
            return Err(Error::Unsound { node: n, method });
        }
        self.visited_methods.insert(method);
        if env.scope.is_excluded(&n.stmt) {
            return Ok(());
        }

        let flow = match self.direction {
            Direction::Forward => forward::flow(env.program, &self.seed, &n),
            Direction::Backward => backward::flow(env.program, &n),
        };
        for s in flow.successors {
            self.apply(&n, s);
        }
        for cs in flow.call_sites {
            self.watch_call_site(env, n.clone(), cs);
        }
        if let Some(m) = flow.callers_of {
            self.watch_callers(env, n.clone(), m);
        }
        for hook in flow.hooks {
            match hook {
                Hook::FieldWrite { base, field } => {
                    self.outbox.push_back(Notification::FieldWrite {
                        store: n.clone(),
                        base,
                        field,
                    });
                }
                Hook::Allocation => {
                    self.fields.register_out_listener(
                        State::Located(n.clone()),
                        None,
                        FieldListener::Export(Export::Allocation { node: n.clone() }),
                    );
                }
            }
        }
        Ok(())
    }

    /// Registers the listeners that move `from` to `succ` on both automata.
    pub(crate) fn apply(&mut self, from: &Node, succ: Successor) {
        trace!(solver = %self.id, %from, ?succ, "rule");
        let single = State::Single(from.fact.clone());
        let located = State::Located(from.clone());
        let label = Some(from.stmt.clone());
        let (call, field) = match succ {
            Successor::Normal(to) => (
                CallListener::Normal {
                    from: from.clone(),
                    to: to.clone(),
                },
                FieldListener::Normal { to },
            ),
            Successor::Push(PushNode {
                node: to,
                location: Location::Call(call_site),
            }) => (
                CallListener::Push {
                    from: from.clone(),
                    to: to.clone(),
                    call_site,
                },
                FieldListener::Normal { to },
            ),
            Successor::Pop(PopNode {
                node: to,
                location: Location::Call(call_site),
            }) => (
                CallListener::Pop {
                    from: from.clone(),
                    to: to.clone(),
                    call_site,
                },
                FieldListener::Normal { to },
            ),
            Successor::Push(PushNode {
                node: to,
                location: Location::Field(field),
            }) => (
                CallListener::Normal {
                    from: from.clone(),
                    to: to.clone(),
                },
                FieldListener::Push { to, field },
            ),
            Successor::Pop(PopNode {
                node: to,
                location: Location::Field(field),
            }) => (
                CallListener::Normal {
                    from: from.clone(),
                    to: to.clone(),
                },
                FieldListener::Pop { to, field },
            ),
        };
        self.calls.register_out_listener(single, label, call);
        self.fields.register_out_listener(located, None, field);
    }

    /// Adds `alias` with `field` pushed onto whatever the store's value is
    /// reached through, in the frame reached by returning through `frames`
    /// from the frame of `store`.
    pub(crate) fn inject(&mut self, store: &Node, alias: Node, field: Field, frames: Vec<Statement>) {
        trace!(solver = %self.id, %store, %alias, ?frames, "inject");
        self.fields.register_out_listener(
            State::Located(store.clone()),
            None,
            FieldListener::Push {
                to: alias.clone(),
                field,
            },
        );
        self.unwind(
            State::Single(store.fact.clone()),
            store.stmt.clone(),
            alias,
            frames,
        );
    }

    fn unwind(&mut self, state: State, label: Statement, to: Node, frames: Vec<Statement>) {
        let key = (state.clone(), label.clone(), to.clone(), frames.clone());
        if self.unwinds.insert(key) {
            self.calls
                .register_out_listener(state, Some(label), CallListener::Unwind { to, frames });
        }
    }

    /// Registers `export` on the out-transitions of `state`, or on its
    /// in-transitions if `incoming`, unless it already is.
    fn export_calls(&mut self, state: State, incoming: bool, export: Export) {
        if !self.exported.insert((state.clone(), export.clone())) {
            return;
        }
        if incoming {
            self.calls
                .register_in_listener(state, CallListener::Export(export));
        } else {
            self.calls
                .register_out_listener(state, None, CallListener::Export(export));
        }
    }

    /// Reports the locals holding the object right after `store` returns
    /// into each caller frame, for the solver that wrote into `base.field`.
    pub(crate) fn export_caller_frames(
        &mut self,
        requester: SolverId,
        store: &Node,
        base: &Local,
        field: &Field,
    ) {
        let export = Export::CallerFrames {
            requester,
            store: store.clone(),
            field: field.clone(),
            frames: Vec::new(),
        };
        let single = State::Single(base.clone());
        if self.exported.insert((single.clone(), export.clone())) {
            self.calls.register_out_listener(
                single,
                Some(store.stmt.clone()),
                CallListener::Export(export),
            );
        }
    }

    fn enter(&mut self, env: &Env<'_, W>, n: &Node, call_site: &Statement, callee: &MethodName) {
        if env.scope.is_excluded_method(callee) {
            return;
        }
        let Some(method) = env.program.method(callee) else {
            return;
        };
        let succs = match self.direction {
            Direction::Forward => forward::into_callee(n, call_site, method),
            Direction::Backward => backward::into_callee(n, call_site, method),
        };
        for s in succs {
            self.apply(n, s);
        }
    }

    fn exit(&mut self, env: &Env<'_, W>, n: &Node, method: &MethodName, call_site: &Statement) {
        if env.scope.is_excluded(call_site) {
            return;
        }
        let Some(method) = env.program.method(method) else {
            return;
        };
        let succs = match self.direction {
            Direction::Forward => forward::to_caller(env.program, n, method, call_site),
            Direction::Backward => backward::to_caller(n, method, call_site),
        };
        for s in succs {
            self.apply(n, s);
        }
    }

    fn watch_call_site(&mut self, env: &Env<'_, W>, n: Node, call_site: Statement) {
        let callees = env.callgraph.callees(&call_site);
        let known = match self.call_sites.get_mut(&call_site) {
            Some(watch) => {
                watch.nodes.push(n.clone());
                watch.seen
            }
            None => {
                self.outbox
                    .push_back(Notification::CallSite(call_site.clone()));
                self.call_sites.insert(
                    call_site.clone(),
                    Watch {
                        seen: 0,
                        nodes: vec![n.clone()],
                    },
                );
                0
            }
        };
        for callee in &callees[..known.min(callees.len())] {
            self.enter(env, &n, &call_site, callee);
        }
        self.catch_up_call_site(env, &call_site, &callees);
    }

    /// Expands every watching node along the callees it has not seen yet.
    fn catch_up_call_site(&mut self, env: &Env<'_, W>, call_site: &Statement, callees: &[MethodName]) {
        let Some(watch) = self.call_sites.get_mut(call_site) else {
            return;
        };
        if watch.seen >= callees.len() {
            return;
        }
        let new = callees[watch.seen..].to_vec();
        watch.seen = callees.len();
        let nodes = watch.nodes.clone();
        for callee in &new {
            for n in &nodes {
                self.enter(env, n, call_site, callee);
            }
        }
    }

    fn watch_callers(&mut self, env: &Env<'_, W>, n: Node, method: MethodName) {
        let callers = env.callgraph.callers(&method);
        let known = match self.callers.get_mut(&method) {
            Some(watch) => {
                watch.nodes.push(n.clone());
                watch.seen
            }
            None => {
                self.outbox
                    .push_back(Notification::Callers(method.clone()));
                self.callers.insert(
                    method.clone(),
                    Watch {
                        seen: 0,
                        nodes: vec![n.clone()],
                    },
                );
                0
            }
        };
        for cs in &callers[..known.min(callers.len())] {
            self.exit(env, &n, &method, cs);
        }
        self.catch_up_callers(env, &method, &callers);
    }

    fn catch_up_callers(&mut self, env: &Env<'_, W>, method: &MethodName, callers: &[Statement]) {
        let Some(watch) = self.callers.get_mut(method) else {
            return;
        };
        if watch.seen >= callers.len() {
            return;
        }
        let new = callers[watch.seen..].to_vec();
        watch.seen = callers.len();
        let nodes = watch.nodes.clone();
        for cs in &new {
            for n in &nodes {
                self.exit(env, n, method, cs);
            }
        }
    }

    /// Picks up call graph edges added since the last refresh.
    pub(crate) fn refresh(&mut self, env: &Env<'_, W>) {
        let version = env.callgraph.version();
        if version == self.seen_version {
            return;
        }
        self.seen_version = version;
        let call_sites: Vec<_> = self.call_sites.keys().cloned().collect();
        for cs in call_sites {
            let callees = env.callgraph.callees(&cs);
            self.catch_up_call_site(env, &cs, &callees);
        }
        let methods: Vec<_> = self.callers.keys().cloned().collect();
        for m in methods {
            let callers = env.callgraph.callers(&m);
            self.catch_up_callers(env, &m, &callers);
        }
    }

    /// Weight of every processed node, from the call automaton.
    pub(crate) fn node_weights(&self) -> FxHashMap<Node, W> {
        let mut out: FxHashMap<Node, W> = FxHashMap::default();
        for (t, w) in self.calls.transitions_to_final_weights() {
            let State::Single(v) = t.source else {
                continue;
            };
            let n = Node::new(t.label, v);
            if !self.processed.contains(&n) {
                continue;
            }
            out.entry(n)
                .and_modify(|old| *old = old.combine(&w))
                .or_insert(w);
        }
        out
    }

    /// Whether `n` itself holds the object, as opposed to some field of it.
    pub(crate) fn holds_directly(&self, n: &Node) -> bool {
        self.fields
            .out_transitions(&State::Located(n.clone()))
            .any(|(label, _, _)| *label == Field::Empty)
    }

    /// Access paths through which processed nodes at `stmt` reach the object.
    pub(crate) fn access_paths_at(&self, stmt: &Statement) -> Vec<AccessPath> {
        let mut out = Vec::new();
        for n in self.processed.iter().filter(|n| n.stmt == *stmt) {
            let start = State::Located(n.clone());
            // Depth-first, not revisiting states on the current path
            let mut stack: Vec<(State, Vec<Field>)> = vec![(start, Vec::new())];
            while let Some((state, path)) = stack.pop() {
                for (label, target, _) in self.fields.out_transitions(&state) {
                    if *label == Field::Empty {
                        if target.is_bottom() {
                            out.push(AccessPath {
                                base: n.fact.clone(),
                                fields: path.clone(),
                            });
                        }
                        continue;
                    }
                    if path.len() >= MAX_ACCESS_PATH || target == &state {
                        continue;
                    }
                    let mut longer = path.clone();
                    longer.push(label.clone());
                    stack.push((target.clone(), longer));
                }
            }
        }
        out.sort();
        out.dedup();
        out
    }
}

/// Longest access path reported; longer ones only arise from field loops.
const MAX_ACCESS_PATH: usize = 8;

/// Caller frames searched for aliases of a written-to object; more only
/// arise from recursion.
const MAX_CALLER_FRAMES: usize = 8;
