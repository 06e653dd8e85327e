// SPDX-License-Identifier: BSD-3-Clause
//! Weighted pushdown automata with listener-driven saturation.
//!
//! An automaton stores states and weighted transitions in an arena addressed
//! by [`StateId`]s and [`TransitionId`]s. Clients subscribe plain data
//! listeners (of type `K`) to states; whenever a matching transition is added
//! or its weight changes, a `(listener, transition)` pair is queued, and
//! clients drain the queue with [`WeightedAutomaton::poll`]. Registering a
//! listener queues every matching transition that already exists, so the
//! order of registration never matters.

use std::fmt::Debug;
use std::hash::Hash;

mod automaton;
mod transition;

pub use automaton::{Delivery, WeightedAutomaton};
pub use transition::{StateId, Transition, TransitionId};

/// Stack alphabet of an automaton.
pub trait Symbol: Clone + Debug + Eq + Hash {
    /// Epsilon transitions are ignored by loop detection.
    fn is_epsilon(&self) -> bool {
        false
    }
}
