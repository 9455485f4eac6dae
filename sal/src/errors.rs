// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Errors of the network element model

use crate::registry::IdKind;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SalError {
    #[error("Unknown node type '{0}'")]
    UnknownNodeType(String),

    #[error("Unknown node connector type '{0}'")]
    UnknownConnectorType(String),

    #[error("Type '{name}' is already registered as {registered}")]
    TypeClash { name: String, registered: IdKind },

    #[error("Type '{0}' is not registered")]
    NotRegistered(String),

    #[error("Type '{ty}' expects a {expected} id, got '{id}'")]
    IdKindMismatch {
        ty: String,
        expected: IdKind,
        id: String,
    },

    #[error("Connector type '{ty}' cannot be attached to a node of type '{node_type}'")]
    IncompatibleNode { ty: String, node_type: String },

    #[error("Malformed {what} '{input}'")]
    Malformed { what: &'static str, input: String },

    #[error("Invalid action '{0}'")]
    InvalidAction(String),

    #[error("Invalid match field '{0}'")]
    InvalidMatch(String),
}
