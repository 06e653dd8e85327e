// SPDX-License-Identifier: BSD-3-Clause
use std::fmt;

use crate::arc::Arc;

/// Fully qualified method name, `Class.method`
#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct MethodName(Arc<String>);

impl MethodName {
    pub fn new(name: impl Into<String>) -> Self {
        MethodName(Arc::new(name.into()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn class(&self) -> &str {
        self.0.rsplit_once('.').map(|(c, _)| c).unwrap_or("")
    }

    /// The name without its class
    pub fn name(&self) -> &str {
        self.0
            .rsplit_once('.')
            .map(|(_, m)| m)
            .unwrap_or(self.0.as_str())
    }
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClassName(Arc<String>);

impl ClassName {
    pub fn new(name: impl Into<String>) -> Self {
        ClassName(Arc::new(name.into()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A local variable. Locals of different methods never compare equal.
#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Local {
    method: MethodName,
    name: Arc<String>,
}

impl Local {
    pub fn new(method: MethodName, name: impl Into<String>) -> Self {
        Local {
            method,
            name: Arc::new(name.into()),
        }
    }

    #[inline]
    pub fn method(&self) -> &MethodName {
        &self.method
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }
}

impl fmt::Display for Local {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Debug for Local {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.method, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::{Local, MethodName};

    #[test]
    fn method_parts() {
        let m = MethodName::new("a.b.Main.main");
        assert_eq!(m.class(), "a.b.Main");
        assert_eq!(m.name(), "main");
    }

    #[test]
    fn locals_are_method_scoped() {
        let x = Local::new(MethodName::new("A.f"), "x");
        let y = Local::new(MethodName::new("A.g"), "x");
        assert_ne!(x, y);
        assert_eq!(x, Local::new(MethodName::new("A.f"), "x"));
    }
}
