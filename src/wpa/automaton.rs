// SPDX-License-Identifier: BSD-3-Clause
use std::collections::VecDeque;
use std::hash::Hash;

use either::Either;
use rustc_hash::{FxHashMap, FxHashSet};

use super::transition::Edge;
use super::{StateId, Symbol, Transition, TransitionId};
use crate::weight::Weight;

/// A listener paired with the transition it is told about. The weight is the
/// one stored when the pair is polled, not when it was queued.
#[derive(Clone, Debug)]
pub struct Delivery<N, L, W, K> {
    pub listener: K,
    pub transition: Transition<N, L>,
    pub weight: W,
}

#[derive(Debug)]
struct Listeners<K> {
    /// Out-transitions with any label
    out: Vec<K>,
    ins: Vec<K>,
}

impl<K> Default for Listeners<K> {
    fn default() -> Self {
        Listeners {
            out: Vec::new(),
            ins: Vec::new(),
        }
    }
}

/// States `N`, stack symbols `L`, weights `W`, listeners `K`.
#[derive(Debug)]
pub struct WeightedAutomaton<N, L, W, K> {
    states: Vec<N>,
    state_ids: FxHashMap<N, StateId>,
    initial: FxHashSet<StateId>,
    finals: FxHashSet<StateId>,

    edges: Vec<Edge<L>>,
    weights: Vec<W>,
    edge_ids: FxHashMap<Edge<L>, TransitionId>,
    outgoing: Vec<Vec<TransitionId>>,
    incoming: Vec<Vec<TransitionId>>,
    outgoing_by_label: FxHashMap<(StateId, L), Vec<TransitionId>>,

    listeners: Vec<Listeners<K>>,
    labelled_listeners: FxHashMap<(StateId, L), Vec<K>>,
    update_listeners: Vec<K>,

    events: VecDeque<(K, TransitionId)>,
}

impl<N, L, W, K> Default for WeightedAutomaton<N, L, W, K>
where
    N: Clone + Eq + Hash,
    L: Symbol,
    W: Weight,
    K: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<N, L, W, K> WeightedAutomaton<N, L, W, K>
where
    N: Clone + Eq + Hash,
    L: Symbol,
    W: Weight,
    K: Clone,
{
    pub fn new() -> Self {
        WeightedAutomaton {
            states: Vec::new(),
            state_ids: FxHashMap::default(),
            initial: FxHashSet::default(),
            finals: FxHashSet::default(),
            edges: Vec::new(),
            weights: Vec::new(),
            edge_ids: FxHashMap::default(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
            outgoing_by_label: FxHashMap::default(),
            listeners: Vec::new(),
            labelled_listeners: FxHashMap::default(),
            update_listeners: Vec::new(),
            events: VecDeque::new(),
        }
    }

    fn intern(&mut self, state: N) -> StateId {
        if let Some(id) = self.state_ids.get(&state) {
            return *id;
        }
        let id = StateId(self.states.len() as u32);
        self.states.push(state.clone());
        self.state_ids.insert(state, id);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        self.listeners.push(Listeners::default());
        id
    }

    #[inline]
    pub fn state_id(&self, state: &N) -> Option<StateId> {
        self.state_ids.get(state).copied()
    }

    #[inline]
    pub fn state(&self, id: StateId) -> &N {
        &self.states[id.index()]
    }

    pub fn contains_state(&self, state: &N) -> bool {
        self.state_ids.contains_key(state)
    }

    pub fn add_initial_state(&mut self, state: N) {
        let id = self.intern(state);
        self.initial.insert(id);
    }

    pub fn add_final_state(&mut self, state: N) {
        let id = self.intern(state);
        self.finals.insert(id);
    }

    pub fn is_final(&self, state: &N) -> bool {
        self.state_id(state)
            .map(|id| self.finals.contains(&id))
            .unwrap_or(false)
    }

    pub fn initial_states(&self) -> impl Iterator<Item = &N> {
        self.initial.iter().map(|id| self.state(*id))
    }

    pub fn final_states(&self) -> impl Iterator<Item = &N> {
        self.finals.iter().map(|id| self.state(*id))
    }

    /// Inserts `t` with weight `w`, or combines `w` into the weight already
    /// stored for `t`. Returns whether anything changed; only then are the
    /// listeners on the source, the target, and the update listeners told.
    pub fn add_transition(&mut self, t: Transition<N, L>, w: W) -> bool {
        if w.is_zero() {
            return false;
        }
        let source = self.intern(t.source);
        let target = self.intern(t.target);
        let edge = Edge {
            source,
            label: t.label,
            target,
        };
        let id = if let Some(id) = self.edge_ids.get(&edge) {
            let id = *id;
            let old = &self.weights[id.index()];
            let new = old.combine(&w);
            if new == *old {
                return false;
            }
            self.weights[id.index()] = new;
            id
        } else {
            let id = TransitionId(self.edges.len() as u32);
            self.outgoing[source.index()].push(id);
            self.incoming[target.index()].push(id);
            self.outgoing_by_label
                .entry((source, edge.label.clone()))
                .or_default()
                .push(id);
            self.edges.push(edge.clone());
            self.weights.push(w);
            self.edge_ids.insert(edge, id);
            id
        };
        self.notify(id);
        true
    }

    fn notify(&mut self, id: TransitionId) {
        let edge = &self.edges[id.index()];
        let source = &self.listeners[edge.source.index()];
        for k in &source.out {
            self.events.push_back((k.clone(), id));
        }
        if let Some(ks) = self
            .labelled_listeners
            .get(&(edge.source, edge.label.clone()))
        {
            for k in ks {
                self.events.push_back((k.clone(), id));
            }
        }
        for k in &self.listeners[edge.target.index()].ins {
            self.events.push_back((k.clone(), id));
        }
        for k in &self.update_listeners {
            self.events.push_back((k.clone(), id));
        }
    }

    /// Subscribes `k` to the out-transitions of `state`, restricted to
    /// `label` if given. Existing transitions are replayed.
    pub fn register_out_listener(&mut self, state: N, label: Option<L>, k: K) {
        let id = self.intern(state);
        match label {
            None => {
                for t in &self.outgoing[id.index()] {
                    self.events.push_back((k.clone(), *t));
                }
                self.listeners[id.index()].out.push(k);
            }
            Some(label) => {
                let key = (id, label);
                if let Some(ts) = self.outgoing_by_label.get(&key) {
                    for t in ts {
                        self.events.push_back((k.clone(), *t));
                    }
                }
                self.labelled_listeners.entry(key).or_default().push(k);
            }
        }
    }

    /// Subscribes `k` to the in-transitions of `state`. Existing transitions
    /// are replayed.
    pub fn register_in_listener(&mut self, state: N, k: K) {
        let id = self.intern(state);
        for t in &self.incoming[id.index()] {
            self.events.push_back((k.clone(), *t));
        }
        self.listeners[id.index()].ins.push(k);
    }

    /// Subscribes `k` to every transition. Existing transitions are replayed.
    pub fn register_update_listener(&mut self, k: K) {
        for i in 0..self.edges.len() {
            self.events.push_back((k.clone(), TransitionId(i as u32)));
        }
        self.update_listeners.push(k);
    }

    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.events.len()
    }

    pub fn poll(&mut self) -> Option<Delivery<N, L, W, K>> {
        let (listener, id) = self.events.pop_front()?;
        Some(Delivery {
            listener,
            transition: self.transition(id),
            weight: self.weights[id.index()].clone(),
        })
    }

    pub fn transition(&self, id: TransitionId) -> Transition<N, L> {
        let edge = &self.edges[id.index()];
        Transition {
            source: self.state(edge.source).clone(),
            label: edge.label.clone(),
            target: self.state(edge.target).clone(),
        }
    }

    pub fn weight(&self, t: &Transition<N, L>) -> Option<&W> {
        let edge = Edge {
            source: self.state_id(&t.source)?,
            label: t.label.clone(),
            target: self.state_id(&t.target)?,
        };
        self.edge_ids
            .get(&edge)
            .map(|id| &self.weights[id.index()])
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn num_transitions(&self) -> usize {
        self.edges.len()
    }

    pub fn transitions(&self) -> impl Iterator<Item = (&N, &L, &N, &W)> {
        self.edges.iter().zip(&self.weights).map(|(e, w)| {
            (
                self.state(e.source),
                &e.label,
                self.state(e.target),
                w,
            )
        })
    }

    pub fn out_transitions<'a>(
        &'a self,
        state: &N,
    ) -> impl Iterator<Item = (&'a L, &'a N, &'a W)> + 'a {
        match self.state_id(state) {
            None => Either::Left(std::iter::empty::<(&L, &N, &W)>()),
            Some(id) => Either::Right(self.outgoing[id.index()].iter().map(|t| {
                let e = &self.edges[t.index()];
                (&e.label, self.state(e.target), &self.weights[t.index()])
            })),
        }
    }

    pub fn in_transitions<'a>(
        &'a self,
        state: &N,
    ) -> impl Iterator<Item = (&'a N, &'a L, &'a W)> + 'a {
        match self.state_id(state) {
            None => Either::Left(std::iter::empty::<(&N, &L, &W)>()),
            Some(id) => Either::Right(self.incoming[id.index()].iter().map(|t| {
                let e = &self.edges[t.index()];
                (self.state(e.source), &e.label, &self.weights[t.index()])
            })),
        }
    }

    /// For every transition, the `extend`-composition of the weights along
    /// the paths from it to a final state, merged over all such paths, with
    /// the transitions nearer the final state coming first.
    ///
    /// Transitions with no path to a final state are omitted.
    pub fn transitions_to_final_weights(&self) -> Vec<(Transition<N, L>, W)> {
        let mut dist = vec![W::zero(); self.states.len()];
        for f in &self.finals {
            dist[f.index()] = W::one();
        }
        // Bellman-Ford; `combine` only moves down a bounded lattice.
        for _ in 0..=self.states.len() {
            let mut changed = false;
            for (e, w) in self.edges.iter().zip(&self.weights) {
                let d = &dist[e.target.index()];
                if d.is_zero() {
                    continue;
                }
                let candidate = d.extend(w);
                let merged = dist[e.source.index()].combine(&candidate);
                if merged != dist[e.source.index()] {
                    dist[e.source.index()] = merged;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(i, e)| {
                let d = &dist[e.target.index()];
                if d.is_zero() {
                    return None;
                }
                Some((
                    self.transition(TransitionId(i as u32)),
                    d.extend(&self.weights[i]),
                ))
            })
            .collect()
    }

    /// Whether a cycle of non-epsilon transitions is reachable from an
    /// initial state. Self-loops count.
    pub fn contains_loop(&self) -> bool {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            New,
            OnStack,
            Done,
        }
        let mut marks = vec![Mark::New; self.states.len()];
        let mut roots: Vec<_> = self.initial.iter().copied().collect();
        roots.sort();
        for root in roots {
            if marks[root.index()] != Mark::New {
                continue;
            }
            // (state, index of the next out-transition to look at)
            let mut stack = vec![(root, 0usize)];
            marks[root.index()] = Mark::OnStack;
            while let Some((state, next)) = stack.last_mut() {
                let out = &self.outgoing[state.index()];
                if *next == out.len() {
                    marks[state.index()] = Mark::Done;
                    stack.pop();
                    continue;
                }
                let e = &self.edges[out[*next].index()];
                *next += 1;
                if e.label.is_epsilon() {
                    continue;
                }
                match marks[e.target.index()] {
                    Mark::OnStack => return true,
                    Mark::Done => (),
                    Mark::New => {
                        marks[e.target.index()] = Mark::OnStack;
                        stack.push((e.target, 0));
                    }
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::WeightedAutomaton;
    use crate::weight::{NoWeight, Weight};
    use crate::wpa::{Symbol, Transition};

    #[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
    enum Sym {
        Eps,
        A,
        B,
    }

    impl Symbol for Sym {
        fn is_epsilon(&self) -> bool {
            *self == Sym::Eps
        }
    }

    /// Shortest-distance weights, smallest wins
    #[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
    struct Dist(Option<u32>);

    impl Weight for Dist {
        fn one() -> Self {
            Dist(Some(0))
        }
        fn zero() -> Self {
            Dist(None)
        }
        fn combine(&self, other: &Self) -> Self {
            match (self.0, other.0) {
                (None, x) | (x, None) => Dist(x),
                (Some(a), Some(b)) => Dist(Some(a.min(b))),
            }
        }
        fn extend(&self, other: &Self) -> Self {
            match (self.0, other.0) {
                (Some(a), Some(b)) => Dist(Some(a + b)),
                _ => Dist(None),
            }
        }
    }

    type Auto<W> = WeightedAutomaton<u32, Sym, W, &'static str>;

    fn drain<W: Weight>(a: &mut Auto<W>) -> Vec<(&'static str, Transition<u32, Sym>)> {
        let mut out = Vec::new();
        while let Some(d) = a.poll() {
            out.push((d.listener, d.transition));
        }
        out
    }

    #[test]
    fn late_listener_sees_everything() {
        let mut a: Auto<NoWeight> = WeightedAutomaton::new();
        a.add_transition(Transition::new(0, Sym::A, 1), NoWeight::One);
        a.add_transition(Transition::new(0, Sym::B, 2), NoWeight::One);
        a.register_out_listener(0, None, "any");
        a.register_out_listener(0, Some(Sym::B), "b");
        a.add_transition(Transition::new(0, Sym::B, 3), NoWeight::One);
        let seen = drain(&mut a);
        let any: Vec<_> = seen.iter().filter(|(k, _)| *k == "any").collect();
        let b: Vec<_> = seen.iter().filter(|(k, _)| *k == "b").collect();
        assert_eq!(any.len(), 3);
        assert_eq!(b.len(), 2);
        assert!(b.iter().all(|(_, t)| t.label == Sym::B));
    }

    #[test]
    fn in_and_update_listeners() {
        let mut a: Auto<NoWeight> = WeightedAutomaton::new();
        a.register_in_listener(1, "in");
        a.add_transition(Transition::new(0, Sym::A, 1), NoWeight::One);
        a.add_transition(Transition::new(2, Sym::A, 1), NoWeight::One);
        a.add_transition(Transition::new(0, Sym::A, 2), NoWeight::One);
        a.register_update_listener("all");
        let seen = drain(&mut a);
        assert_eq!(seen.iter().filter(|(k, _)| *k == "in").count(), 2);
        assert_eq!(seen.iter().filter(|(k, _)| *k == "all").count(), 3);
    }

    #[test]
    fn unchanged_weight_is_silent() {
        let mut a: Auto<Dist> = WeightedAutomaton::new();
        a.register_update_listener("all");
        assert!(a.add_transition(Transition::new(0, Sym::A, 1), Dist(Some(3))));
        assert!(!a.add_transition(Transition::new(0, Sym::A, 1), Dist(Some(5))));
        assert!(a.add_transition(Transition::new(0, Sym::A, 1), Dist(Some(2))));
        assert!(!a.add_transition(Transition::new(0, Sym::B, 1), Dist::zero()));
        assert_eq!(drain(&mut a).len(), 2);
        assert_eq!(
            a.weight(&Transition::new(0, Sym::A, 1)),
            Some(&Dist(Some(2)))
        );
        assert_eq!(a.num_transitions(), 1);
    }

    #[test]
    fn weights_to_final() {
        let mut a: Auto<Dist> = WeightedAutomaton::new();
        a.add_final_state(9);
        a.add_transition(Transition::new(0, Sym::A, 1), Dist(Some(1)));
        a.add_transition(Transition::new(1, Sym::A, 9), Dist(Some(10)));
        a.add_transition(Transition::new(1, Sym::B, 2), Dist(Some(1)));
        a.add_transition(Transition::new(2, Sym::B, 9), Dist(Some(1)));
        a.add_transition(Transition::new(5, Sym::B, 6), Dist(Some(1)));
        let ws = a.transitions_to_final_weights();
        let w = |t: Transition<u32, Sym>| ws.iter().find(|(u, _)| *u == t).map(|(_, w)| *w);
        assert_eq!(w(Transition::new(0, Sym::A, 1)), Some(Dist(Some(3))));
        assert_eq!(w(Transition::new(1, Sym::A, 9)), Some(Dist(Some(10))));
        assert_eq!(w(Transition::new(5, Sym::B, 6)), None);
    }

    #[test]
    fn loops() {
        let mut a: Auto<NoWeight> = WeightedAutomaton::new();
        a.add_initial_state(0);
        a.add_transition(Transition::new(0, Sym::A, 1), NoWeight::One);
        a.add_transition(Transition::new(1, Sym::Eps, 0), NoWeight::One);
        assert!(!a.contains_loop());
        a.add_transition(Transition::new(1, Sym::B, 1), NoWeight::One);
        assert!(a.contains_loop());

        let mut b: Auto<NoWeight> = WeightedAutomaton::new();
        b.add_initial_state(0);
        b.add_transition(Transition::new(0, Sym::A, 1), NoWeight::One);
        b.add_transition(Transition::new(0, Sym::B, 1), NoWeight::One);
        b.add_transition(Transition::new(3, Sym::A, 3), NoWeight::One);
        assert!(!b.contains_loop());
    }
}
