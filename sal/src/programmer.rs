// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Contract of the component that programs flows into network nodes.

use crate::flow::Flow;
use crate::node::Node;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgrammerError {
    #[error("Node {0} is not connected")]
    NotConnected(Node),

    #[error("Node {node} rejected the request: {reason}")]
    Rejected { node: Node, reason: String },

    #[error("Programmer failure: {0}")]
    Internal(String),
}

/// Programs flows into the hardware of network nodes.
///
/// Calls are synchronous: they return once the node acknowledged or refused the request.
pub trait FlowProgrammer: Send + Sync {
    fn add_flow(&self, node: &Node, flow: &Flow) -> Result<(), ProgrammerError>;
    fn remove_flow(&self, node: &Node, flow: &Flow) -> Result<(), ProgrammerError>;
    fn modify_flow(&self, node: &Node, old: &Flow, new: &Flow) -> Result<(), ProgrammerError>;
}
