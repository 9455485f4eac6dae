// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow entry requests

use crate::staticflow::INTERNAL_FLOW_PREFIX;
use sal::{Flow, Node};
use std::fmt::Display;

/// A request to install `flow` on `node`. The flow name identifies the request on the node
/// for humans; the flow match and priority identify it for the hardware.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowEntry {
    pub group: Option<String>,
    pub name: String,
    pub node: Node,
    pub flow: Flow,
}

impl FlowEntry {
    #[must_use]
    pub fn new(node: Node, name: impl Into<String>, flow: Flow) -> Self {
        Self {
            group: None,
            name: name.into(),
            node,
            flow,
        }
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// The same entry with another flow
    #[must_use]
    pub fn with_flow(&self, flow: Flow) -> Self {
        Self {
            flow,
            ..self.clone()
        }
    }

    /// Requests generated by the controller. They are exempt from container mode.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.name.starts_with(INTERNAL_FLOW_PREFIX)
    }

    /// Tell if `self` and `other` would collide in the node flow table
    #[must_use]
    pub fn same_match_and_priority(&self, other: &FlowEntry) -> bool {
        self.node == other.node
            && self.flow.priority == other.flow.priority
            && self.flow.matching == other.flow.matching
    }
}

impl Display for FlowEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}'", self.name)?;
        if let Some(group) = &self.group {
            write!(f, " group:{group}")?;
        }
        write!(f, " node:{} {}", self.node, self.flow)
    }
}
