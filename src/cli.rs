// SPDX-License-Identifier: BSD-3-Clause
use std::fmt;
use std::path::PathBuf;

#[derive(Clone, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum Check {
    Default,
    None,
    Strict,
}

impl std::fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Default => write!(f, "default"),
            Check::None => write!(f, "none"),
            Check::Strict => write!(f, "strict"),
        }
    }
}

/// Demand-driven alias analysis
///
/// Answers a backward query for the first argument of every call to a method
/// named `queryFor`, or with --forward, a forward query for every allocation
/// site.
#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Check assertions (strict: also fail on timeouts)
    #[arg(long, default_value_t = Check::Default)]
    pub check: Check,

    /// Forward queries from every allocation site
    #[arg(long)]
    pub forward: bool,

    /// Per-query step budget
    #[arg(long)]
    pub max_steps: Option<u64>,

    /// Build the call graph on the fly instead of by class hierarchy
    #[arg(long)]
    pub on_the_fly: bool,

    /// Record data-flow paths (forward queries)
    #[arg(long)]
    pub path: bool,

    /// Program description (JSON)
    #[arg()]
    pub program: PathBuf,

    /// Drop forward results on contradictory paths; implies --path
    #[arg(long)]
    pub prune: bool,

    /// Quiet
    #[arg(long)]
    pub quiet: bool,

    /// Methods excluded from the analysis (JSON list of regexes)
    #[arg(short, long)]
    pub scope: Option<PathBuf>,

    /// Report statistics
    #[arg(long)]
    pub stats: bool,

    /// Per-query timeout in milliseconds, 0 for none
    #[arg(long, default_value_t = 10_000)]
    pub timeout_ms: u64,

    /// Tracing
    #[arg(long)]
    pub tracing: bool,
}
