// SPDX-License-Identifier: BSD-3-Clause
use std::fmt;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct StateId(pub(super) u32);

impl StateId {
    #[inline]
    pub(super) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TransitionId(pub(super) u32);

impl TransitionId {
    #[inline]
    pub(super) fn index(self) -> usize {
        self.0 as usize
    }
}

/// An owned transition `source --label--> target`.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Transition<N, L> {
    pub source: N,
    pub label: L,
    pub target: N,
}

impl<N, L> Transition<N, L> {
    pub fn new(source: N, label: L, target: N) -> Self {
        Transition {
            source,
            label,
            target,
        }
    }
}

impl<N: fmt::Display, L: fmt::Display> fmt::Display for Transition<N, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} --{}--> {}", self.source, self.label, self.target)
    }
}

/// Arena form of a transition.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub(super) struct Edge<L> {
    pub(super) source: StateId,
    pub(super) label: L,
    pub(super) target: StateId,
}
