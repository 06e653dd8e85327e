// SPDX-License-Identifier: BSD-3-Clause
use crate::ir::MethodName;
use crate::nodes::Node;

/// Hard failures. Running out of time or steps is not one of them, see
/// [`crate::analysis::BackwardResults::timed_out`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    /// A node was reached inside a method the program declares unreachable.
    #[error("Unsound result: reached {node} in unreachable method {method}")]
    Unsound { node: Node, method: MethodName },

    #[error("Malformed program: {0}")]
    MalformedProgram(String),

    #[error("Invalid scope: {0}")]
    Scope(#[from] regex::Error),

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
