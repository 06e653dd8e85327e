// SPDX-License-Identifier: BSD-3-Clause
//! Demand-driven alias analysis with synchronized pushdown systems.
//!
//! Build a [`ir::Program`], then ask a [`Boomerang`] where a value comes
//! from ([`BackwardQuery`]) or where an allocated object goes
//! ([`ForwardQuery`]).

pub mod analysis;
pub mod arc;
pub mod error;
pub mod ir;
pub mod layers;
pub mod nodes;
pub mod query;
pub mod scope;
pub mod weight;
pub mod wpa;

pub use analysis::{Boomerang, Options};
pub use error::{Error, Result};
pub use query::{BackwardQuery, ForwardQuery, Query};
