// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Service abstraction layer: the network element model consumed by the forwarding rules
//! manager (nodes, connectors, matches, actions, flows) and the contract of the component
//! that programs flows into switches.

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

pub mod action;
pub mod errors;
pub mod flow;
pub mod node;
pub mod programmer;
pub mod property;
pub mod registry;
pub mod update;

// re-exports
pub use action::Action;
pub use errors::SalError;
pub use flow::{Flow, Match};
pub use node::{ElementId, Node, NodeConnector};
pub use programmer::{FlowProgrammer, ProgrammerError};
pub use property::Property;
pub use registry::{IdKind, IdTypeRegistry};
pub use update::UpdateType;

use tracectl::trace_target;
trace_target!("sal", LevelFilter::INFO, &["frm"]);
