// SPDX-License-Identifier: BSD-3-Clause
//! Semiring weights carried by automaton transitions.

use std::fmt::Debug;

mod path;

pub use path::{ConditionDomain, DataFlowPath, PathElement};

/// A bounded idempotent semiring.
///
/// `combine` merges the weights of different paths reaching the same
/// transition and `extend` composes weights along one path, earlier weight
/// first. `zero` is the identity of `combine` and absorbs `extend`; `one` is
/// the identity of `extend`.
pub trait Weight: Clone + Debug + Eq + Send + Sync + 'static {
    fn one() -> Self;

    fn zero() -> Self;

    fn combine(&self, other: &Self) -> Self;

    fn extend(&self, other: &Self) -> Self;

    #[inline]
    fn is_zero(&self) -> bool {
        *self == Self::zero()
    }
}

/// The two-element boolean semiring, for analyses that only care about
/// reachability.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum NoWeight {
    #[default]
    One,
    Zero,
}

impl Weight for NoWeight {
    #[inline]
    fn one() -> Self {
        NoWeight::One
    }

    #[inline]
    fn zero() -> Self {
        NoWeight::Zero
    }

    #[inline]
    fn combine(&self, other: &Self) -> Self {
        match (self, other) {
            (NoWeight::Zero, NoWeight::Zero) => NoWeight::Zero,
            _ => NoWeight::One,
        }
    }

    #[inline]
    fn extend(&self, other: &Self) -> Self {
        match (self, other) {
            (NoWeight::One, NoWeight::One) => NoWeight::One,
            _ => NoWeight::Zero,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{NoWeight, Weight};

    #[test]
    fn no_weight_laws() {
        for x in [NoWeight::One, NoWeight::Zero] {
            assert_eq!(NoWeight::zero().extend(&x), NoWeight::zero());
            assert_eq!(NoWeight::one().extend(&x), x);
            assert_eq!(x.extend(&NoWeight::one()), x);
            assert_eq!(NoWeight::zero().combine(&x), x);
            assert_eq!(x.combine(&x), x);
        }
    }
}
