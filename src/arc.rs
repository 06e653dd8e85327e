// SPDX-License-Identifier: BSD-3-Clause
//! Shared, hash-caching pointers for program entities.
//!
//! Statements, names and generated automaton states are hashed constantly by
//! the automata (every transition insert hashes both endpoints and the
//! label), and they are cloned into many transitions. [`Arc`] makes clones a
//! refcount bump and hashing a single `write_u64`.

use std::cmp::Ordering;
use std::fmt::{Debug, Display};
use std::hash::{Hash, Hasher};
use std::ops::Deref;

struct PreHashed<T> {
    hash: u64,
    val: T,
}

impl<T: Hash> PreHashed<T> {
    fn new(val: T) -> Self {
        let mut hasher = rustc_hash::FxHasher::default();
        val.hash(&mut hasher);
        PreHashed {
            hash: hasher.finish(),
            val,
        }
    }
}

/// A thread-safe reference-counting pointer like [`std::sync::Arc<T>`] that
/// computes the hash of its contained value exactly once, on construction.
///
/// Equality first compares the cached hashes and the pointers, and only falls
/// back to comparing values when both hashes agree.
pub struct Arc<T>(triomphe::Arc<PreHashed<T>>);

fn _assert_arc_sync_send()
where
    Arc<()>: Send + Sync,
{
}

impl<T: Hash> Arc<T> {
    pub fn new(val: T) -> Self {
        Self(triomphe::Arc::new(PreHashed::new(val)))
    }
}

impl<T> Arc<T> {
    #[cfg(test)]
    fn cached_hash(&self) -> u64 {
        self.0.hash
    }

    #[inline]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        triomphe::Arc::ptr_eq(&a.0, &b.0)
    }
}

impl<T> Clone for Arc<T> {
    #[inline]
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Hash for Arc<T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

impl<T: PartialEq> PartialEq for Arc<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other) || (self.0.hash == other.0.hash && self.0.val == other.0.val)
    }
}

impl<T: Eq> Eq for Arc<T> {}

/// Orders by value, so that results are stable across runs.
impl<T: PartialOrd> PartialOrd for Arc<T> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.0.val.partial_cmp(&other.0.val)
    }
}

impl<T: Ord> Ord for Arc<T> {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.val.cmp(&other.0.val)
    }
}

impl<T> Deref for Arc<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0.val
    }
}

impl<T> AsRef<T> for Arc<T> {
    #[inline]
    fn as_ref(&self) -> &T {
        &self.0.val
    }
}

/// Only displays the value
impl<T: Display> Display for Arc<T> {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.val.fmt(f)
    }
}

/// Only shows the value
impl<T: Debug> Debug for Arc<T> {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.val.fmt(f)
    }
}
