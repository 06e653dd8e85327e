// SPDX-License-Identifier: BSD-3-Clause
use std::fmt;

use crate::arc::Arc;
use crate::wpa::Symbol;

/// Labels of the field automaton.
#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Field {
    /// Bottom of every access path; the object itself.
    Empty,
    Named(Arc<String>),
    /// All elements of an array
    Array,
    /// The value stored under a known map key
    Key(Arc<String>),
    /// The value stored under some map key
    AnyKey,
}

impl Field {
    pub fn named(name: impl Into<String>) -> Self {
        Field::Named(Arc::new(name.into()))
    }

    pub fn key(key: impl Into<String>) -> Self {
        Field::Key(Arc::new(key.into()))
    }

    /// Whether a read of `self` may observe a write of `other`.
    pub fn matches(&self, other: &Field) -> bool {
        match (self, other) {
            (Field::Empty, _) | (_, Field::Empty) => false,
            (Field::AnyKey, Field::Key(_) | Field::AnyKey) => true,
            (Field::Key(_), Field::AnyKey) => true,
            (a, b) => a == b,
        }
    }
}

impl Symbol for Field {
    fn is_epsilon(&self) -> bool {
        matches!(self, Field::Empty)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Empty => write!(f, "ε"),
            Field::Named(n) => write!(f, "{n}"),
            Field::Array => write!(f, "[]"),
            Field::Key(k) => write!(f, "[{k:?}]"),
            Field::AnyKey => write!(f, "[*]"),
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::Field;

    #[test]
    fn key_matching() {
        assert!(Field::key("a").matches(&Field::key("a")));
        assert!(!Field::key("a").matches(&Field::key("b")));
        assert!(Field::AnyKey.matches(&Field::key("b")));
        assert!(Field::key("b").matches(&Field::AnyKey));
        assert!(!Field::AnyKey.matches(&Field::named("f")));
        assert!(!Field::Empty.matches(&Field::Empty));
    }
}
