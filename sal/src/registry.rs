// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Registry of node and node connector types.
//!
//! A node or node connector type is a short name (e.g. "OF") that determines the kind of
//! identifier its elements carry. Connector types may additionally be restricted to nodes
//! of a given type.

use crate::errors::SalError;
use ahash::RandomState;
use std::collections::HashMap;
use std::fmt::Display;
use tracing::debug;

/// The kind of identifier an element type uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Numeric,
    Text,
}

impl Display for IdKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdKind::Numeric => write!(f, "numeric"),
            IdKind::Text => write!(f, "text"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ConnectorType {
    kind: IdKind,
    node_type: Option<String>,
}

/// Node types
pub mod node_types {
    pub const OPENFLOW: &str = "OF";
    pub const PCEP: &str = "PE";
    pub const ONEPK: &str = "PK";
    pub const PRODUCTION: &str = "PR";
}

/// Node connector types
pub mod connector_types {
    pub const CONTROLLER: &str = "CTRL";
    pub const ALL: &str = "ALL";
    pub const SWSTACK: &str = "SW";
    pub const HWPATH: &str = "HW";
    pub const OPENFLOW: &str = "OF";
    pub const PCEP: &str = "PE";
    pub const ONEPK: &str = "PK";
    pub const OPENFLOW2PCEP: &str = "O2E";
    pub const PCEP2OPENFLOW: &str = "E2O";
    pub const OPENFLOW2ONEPK: &str = "O2K";
    pub const ONEPK2OPENFLOW: &str = "K2O";
    pub const PCEP2ONEPK: &str = "E2K";
    pub const ONEPK2PCEP: &str = "K2E";
    pub const PRODUCTION: &str = "PR";
}

#[derive(Debug, Clone)]
pub struct IdTypeRegistry {
    node_types: HashMap<String, IdKind, RandomState>,
    connector_types: HashMap<String, ConnectorType, RandomState>,
}

impl Default for IdTypeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl IdTypeRegistry {
    /// An empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            node_types: HashMap::with_hasher(RandomState::with_seed(0)),
            connector_types: HashMap::with_hasher(RandomState::with_seed(0)),
        }
    }

    /// A registry with the built-in node and connector types
    #[must_use]
    pub fn with_defaults() -> Self {
        use connector_types as ct;
        use node_types as nt;

        let mut registry = Self::new();
        for (name, kind) in [
            (nt::OPENFLOW, IdKind::Numeric),
            (nt::PCEP, IdKind::Numeric),
            (nt::ONEPK, IdKind::Text),
            (nt::PRODUCTION, IdKind::Text),
        ] {
            registry.node_types.insert(name.to_owned(), kind);
        }
        let connectors = [
            (ct::CONTROLLER, IdKind::Numeric, None),
            (ct::ALL, IdKind::Numeric, None),
            (ct::SWSTACK, IdKind::Numeric, None),
            (ct::HWPATH, IdKind::Numeric, None),
            (ct::OPENFLOW, IdKind::Numeric, Some(nt::OPENFLOW)),
            (ct::PCEP, IdKind::Numeric, Some(nt::PCEP)),
            (ct::ONEPK, IdKind::Text, Some(nt::ONEPK)),
            (ct::OPENFLOW2PCEP, IdKind::Numeric, Some(nt::OPENFLOW)),
            (ct::OPENFLOW2ONEPK, IdKind::Numeric, Some(nt::OPENFLOW)),
            (ct::PCEP2OPENFLOW, IdKind::Numeric, Some(nt::PCEP)),
            (ct::PCEP2ONEPK, IdKind::Numeric, Some(nt::PCEP)),
            (ct::ONEPK2OPENFLOW, IdKind::Text, Some(nt::ONEPK)),
            (ct::ONEPK2PCEP, IdKind::Text, Some(nt::ONEPK)),
            (ct::PRODUCTION, IdKind::Text, Some(nt::PRODUCTION)),
        ];
        for (name, kind, node_type) in connectors {
            registry.connector_types.insert(
                name.to_owned(),
                ConnectorType {
                    kind,
                    node_type: node_type.map(str::to_owned),
                },
            );
        }
        registry
    }

    /// Register a node type. Registering an existing type with the same kind is a no-op.
    pub fn register_node_type(&mut self, name: &str, kind: IdKind) -> Result<(), SalError> {
        match self.node_types.get(name) {
            Some(registered) if *registered == kind => Ok(()),
            Some(registered) => Err(SalError::TypeClash {
                name: name.to_owned(),
                registered: *registered,
            }),
            None => {
                debug!("Registered node type {name} ({kind})");
                self.node_types.insert(name.to_owned(), kind);
                Ok(())
            }
        }
    }

    pub fn unregister_node_type(&mut self, name: &str) -> Result<(), SalError> {
        self.node_types
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SalError::NotRegistered(name.to_owned()))
    }

    /// Register a connector type, optionally restricted to nodes of type `node_type`
    pub fn register_connector_type(
        &mut self,
        name: &str,
        kind: IdKind,
        node_type: Option<&str>,
    ) -> Result<(), SalError> {
        let wanted = ConnectorType {
            kind,
            node_type: node_type.map(str::to_owned),
        };
        match self.connector_types.get(name) {
            Some(registered) if *registered == wanted => Ok(()),
            Some(registered) => Err(SalError::TypeClash {
                name: name.to_owned(),
                registered: registered.kind,
            }),
            None => {
                debug!("Registered connector type {name} ({kind})");
                self.connector_types.insert(name.to_owned(), wanted);
                Ok(())
            }
        }
    }

    pub fn unregister_connector_type(&mut self, name: &str) -> Result<(), SalError> {
        self.connector_types
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SalError::NotRegistered(name.to_owned()))
    }

    #[must_use]
    pub fn node_id_kind(&self, name: &str) -> Option<IdKind> {
        self.node_types.get(name).copied()
    }

    #[must_use]
    pub fn connector_id_kind(&self, name: &str) -> Option<IdKind> {
        self.connector_types.get(name).map(|c| c.kind)
    }

    /// The node type a connector type is bound to, if any
    #[must_use]
    pub fn connector_node_type(&self, name: &str) -> Option<&str> {
        self.connector_types
            .get(name)
            .and_then(|c| c.node_type.as_deref())
    }
}
