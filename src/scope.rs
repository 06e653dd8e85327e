// SPDX-License-Identifier: BSD-3-Clause
//! Which methods the analysis may step into.

use regex::RegexSet;

use crate::error::Result;
use crate::ir::{MethodName, Statement};

pub trait DataFlowScope: std::fmt::Debug + Send + Sync {
    /// Excluded methods are never entered, and their statements never
    /// expanded.
    fn is_excluded_method(&self, method: &MethodName) -> bool;

    fn is_excluded(&self, stmt: &Statement) -> bool {
        self.is_excluded_method(stmt.method())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct IncludeAll;

impl DataFlowScope for IncludeAll {
    #[inline]
    fn is_excluded_method(&self, _method: &MethodName) -> bool {
        false
    }
}

pub fn include_all() -> IncludeAll {
    IncludeAll
}

/// JSON form of a [`RegexScope`]
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScopeDesc {
    /// Regexes over `Class.method`
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Excludes every method whose name matches one of a set of regexes.
#[derive(Debug)]
pub struct RegexScope {
    set: RegexSet,
}

impl RegexScope {
    pub fn new<I, S>(exclude: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(RegexScope {
            set: RegexSet::new(exclude)?,
        })
    }

    pub fn from_desc(desc: &ScopeDesc) -> Result<Self> {
        Self::new(&desc.exclude)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let desc: ScopeDesc = serde_json::from_str(json)?;
        Self::from_desc(&desc)
    }
}

impl DataFlowScope for RegexScope {
    fn is_excluded_method(&self, method: &MethodName) -> bool {
        self.set.is_match(method.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{include_all, DataFlowScope, RegexScope};
    use crate::error::Error;
    use crate::ir::MethodName;

    #[test]
    fn it_works() {
        let scope = RegexScope::from_json(r#"{"exclude": ["^java\\.", "Lib\\.helper$"]}"#).unwrap();
        assert!(scope.is_excluded_method(&MethodName::new("java.util.HashMap.put")));
        assert!(scope.is_excluded_method(&MethodName::new("a.Lib.helper")));
        assert!(!scope.is_excluded_method(&MethodName::new("Main.main")));
        assert!(!include_all().is_excluded_method(&MethodName::new("java.lang.Object.init")));
    }

    #[test]
    fn bad_regex() {
        assert!(matches!(RegexScope::new(["("]), Err(Error::Scope(_))));
    }
}
