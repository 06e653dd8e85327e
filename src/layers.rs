// SPDX-License-Identifier: BSD-3-Clause
//! `tracing` layers used by the command-line tool.

mod counts;
mod nanos;

pub use counts::ExecCountLayer;
pub use nanos::NanoCountLayer;
