// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Network nodes and node connectors (ports).

use crate::errors::SalError;
use crate::registry::{IdKind, IdTypeRegistry};
use std::fmt::Display;

/// Identifier of a node or node connector. Whether an id is numeric or textual depends
/// on the type of the element, as registered in an [`IdTypeRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementId {
    Numeric(u64),
    Text(String),
}

impl ElementId {
    #[must_use]
    pub fn kind(&self) -> IdKind {
        match self {
            ElementId::Numeric(_) => IdKind::Numeric,
            ElementId::Text(_) => IdKind::Text,
        }
    }

    fn parse(kind: IdKind, input: &str) -> Option<Self> {
        match kind {
            IdKind::Numeric => input.parse().ok().map(ElementId::Numeric),
            IdKind::Text if !input.is_empty() => Some(ElementId::Text(input.to_owned())),
            IdKind::Text => None,
        }
    }
}

impl From<u64> for ElementId {
    fn from(value: u64) -> Self {
        ElementId::Numeric(value)
    }
}
impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        ElementId::Text(value.to_owned())
    }
}

impl Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementId::Numeric(n) => write!(f, "{n}"),
            ElementId::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A network element, e.g. an `OpenFlow` switch. Displays as `TYPE|ID`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node {
    node_type: String,
    id: ElementId,
}

impl Node {
    /// Build a [`Node`] checking that the id is of the kind required by the node type.
    pub fn new(
        registry: &IdTypeRegistry,
        node_type: &str,
        id: impl Into<ElementId>,
    ) -> Result<Self, SalError> {
        let id = id.into();
        let expected = registry
            .node_id_kind(node_type)
            .ok_or_else(|| SalError::UnknownNodeType(node_type.to_owned()))?;
        if id.kind() != expected {
            return Err(SalError::IdKindMismatch {
                ty: node_type.to_owned(),
                expected,
                id: id.to_string(),
            });
        }
        Ok(Self {
            node_type: node_type.to_owned(),
            id,
        })
    }

    /// Parse a node from its `TYPE|ID` representation
    pub fn parse(registry: &IdTypeRegistry, input: &str) -> Result<Self, SalError> {
        let malformed = || SalError::Malformed {
            what: "node",
            input: input.to_owned(),
        };
        let (node_type, id) = input.trim().split_once('|').ok_or_else(malformed)?;
        let kind = registry
            .node_id_kind(node_type)
            .ok_or_else(|| SalError::UnknownNodeType(node_type.to_owned()))?;
        let id = ElementId::parse(kind, id).ok_or_else(malformed)?;
        Self::new(registry, node_type, id)
    }

    #[must_use]
    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    #[must_use]
    pub fn id(&self) -> &ElementId {
        &self.id
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}", self.node_type, self.id)
    }
}

/// A port of a [`Node`]. Displays as `TYPE|ID@NODE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeConnector {
    connector_type: String,
    id: ElementId,
    node: Node,
}

impl NodeConnector {
    /// Build a [`NodeConnector`]. The id kind must match the connector type and the
    /// connector type, if bound to a node type, must match the type of `node`.
    pub fn new(
        registry: &IdTypeRegistry,
        connector_type: &str,
        id: impl Into<ElementId>,
        node: Node,
    ) -> Result<Self, SalError> {
        let id = id.into();
        let expected = registry
            .connector_id_kind(connector_type)
            .ok_or_else(|| SalError::UnknownConnectorType(connector_type.to_owned()))?;
        if id.kind() != expected {
            return Err(SalError::IdKindMismatch {
                ty: connector_type.to_owned(),
                expected,
                id: id.to_string(),
            });
        }
        if let Some(node_type) = registry.connector_node_type(connector_type)
            && node_type != node.node_type()
        {
            return Err(SalError::IncompatibleNode {
                ty: connector_type.to_owned(),
                node_type: node.node_type().to_owned(),
            });
        }
        Ok(Self {
            connector_type: connector_type.to_owned(),
            id,
            node,
        })
    }

    /// Parse a connector from its `TYPE|ID@NODE` representation
    pub fn parse(registry: &IdTypeRegistry, input: &str) -> Result<Self, SalError> {
        let malformed = || SalError::Malformed {
            what: "node connector",
            input: input.to_owned(),
        };
        let (port, node) = input.trim().split_once('@').ok_or_else(malformed)?;
        let node = Node::parse(registry, node)?;
        let (connector_type, id) = port.split_once('|').ok_or_else(malformed)?;
        let kind = registry
            .connector_id_kind(connector_type)
            .ok_or_else(|| SalError::UnknownConnectorType(connector_type.to_owned()))?;
        let id = ElementId::parse(kind, id).ok_or_else(malformed)?;
        Self::new(registry, connector_type, id, node)
    }

    /// Parse a port given either in full form or as a bare id relative to `node`. A bare
    /// id takes the connector type named like the node type.
    pub fn parse_on(registry: &IdTypeRegistry, node: &Node, input: &str) -> Result<Self, SalError> {
        if input.contains('@') {
            return Self::parse(registry, input);
        }
        let (connector_type, id) = input
            .split_once('|')
            .unwrap_or((node.node_type(), input.trim()));
        let kind = registry
            .connector_id_kind(connector_type)
            .ok_or_else(|| SalError::UnknownConnectorType(connector_type.to_owned()))?;
        let id = ElementId::parse(kind, id).ok_or_else(|| SalError::Malformed {
            what: "node connector",
            input: input.to_owned(),
        })?;
        Self::new(registry, connector_type, id, node.clone())
    }

    #[must_use]
    pub fn connector_type(&self) -> &str {
        &self.connector_type
    }

    #[must_use]
    pub fn id(&self) -> &ElementId {
        &self.id
    }

    #[must_use]
    pub fn node(&self) -> &Node {
        &self.node
    }
}

impl Display for NodeConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}@{}", self.connector_type, self.id, self.node)
    }
}
