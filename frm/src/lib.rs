// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Forwarding rules manager.
//!
//! Applications request flow entries for network nodes. The manager merges each request
//! with the container flows that restrict what the container may program, checks the
//! result against the flows already installed, programs the network nodes and keeps a
//! software view of what got installed, indexed by node and by group.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod container;
pub mod database;
mod display;
pub mod engine;
pub mod errors;
pub mod flowentry;
pub mod install;
pub mod manager;
pub mod mode;
pub mod params;
pub mod report;
pub mod staticflow;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

#[cfg(test)]
mod test;

// re-exports
pub use container::{Container, ContainerFlow, ContainerView};
pub use engine::FlowEngine;
pub use errors::{ConflictKind, FrmError};
pub use flowentry::FlowEntry;
pub use manager::ForwardingRulesManager;
pub use params::{FrmParams, FrmParamsBuilder};
pub use report::{CandidateOutcome, Outcome, Report};
pub use staticflow::StaticFlow;

use tracectl::trace_target;
trace_target!("frm", LevelFilter::INFO, &["frm"]);
