// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The error results used by the forwarding rules manager.

use sal::ProgrammerError;
use std::fmt::Display;
use thiserror::Error;

/// The reason a request conflicts with the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    /// A flow with the same match and priority is installed on the node
    DuplicateMatch,
    /// Container flows are active and none of them allows the request
    NoContainerFlowMatch,
    /// The manager is in container mode
    ContainerMode,
    /// A static flow with the same name exists on the node
    StaticFlowExists,
}

impl Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::DuplicateMatch => {
                write!(f, "a flow with the same match and priority is installed")
            }
            ConflictKind::NoContainerFlowMatch => {
                write!(f, "no container flow allows the request")
            }
            ConflictKind::ContainerMode => write!(f, "controller is in container mode"),
            ConflictKind::StaticFlowExists => {
                write!(f, "entry with this name on specified switch already exists")
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrmError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Conflict: {0}")]
    Conflict(ConflictKind),

    #[error("Hardware failure: {0}")]
    Hardware(#[from] ProgrammerError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not acceptable: {0}")]
    NotAcceptable(String),
}

impl FrmError {
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, FrmError::Conflict(_))
    }
}
