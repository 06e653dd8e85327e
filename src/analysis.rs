// SPDX-License-Identifier: BSD-3-Clause
//! Demand-driven alias analysis.
//!
//! [`Boomerang`] answers [`crate::query::ForwardQuery`]s and
//! [`crate::query::BackwardQuery`]s by running one synchronized pushdown
//! solver per query, and more solvers for the queries those solvers raise
//! along the way: receivers of virtual calls, bases of field writes and
//! allocations whose fields are read.

use std::time::Duration;

mod backward;
pub mod boomerang;
pub mod callgraph;
mod forward;
pub mod results;
mod solver;
pub mod weights;

pub use boomerang::Boomerang;
pub use callgraph::CallGraph;
pub use results::{AccessPath, BackwardResults, ForwardResults, Snapshot, Stats};
pub use solver::{Direction, Status};
pub use weights::{OneWeights, PathWeights, WeightFunctions};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Options {
    /// Wall-clock budget per query, including all the queries it raises
    pub timeout: Option<Duration>,
    /// Budget in solver steps per query
    pub max_steps: Option<u64>,
    /// Resolve calls with backward queries on their receivers as they are
    /// reached, instead of up front by class hierarchy analysis
    pub on_the_fly_call_graph: bool,
    /// Record the data-flow path to every reached node
    pub track_data_flow_path: bool,
    /// Drop forward results whose path takes a branch that cannot be taken
    pub prune_contradictory_data_flow_path: bool,
    /// Fail on reaching methods the program declares unreachable
    pub check_assertions: bool,
    /// Also report all aliases at the query statement
    pub compute_aliases: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            timeout: Some(Duration::from_secs(10)),
            max_steps: None,
            on_the_fly_call_graph: false,
            track_data_flow_path: false,
            prune_contradictory_data_flow_path: false,
            check_assertions: true,
            compute_aliases: true,
        }
    }
}
