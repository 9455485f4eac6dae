// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Static flows: flows configured by users, or generated by the controller for a
//! node, that the manager keeps and (re)installs on their own.

use crate::flowentry::FlowEntry;
use ipnet::IpNet;
use sal::flow::{ETHERTYPE_IPV4, ETHERTYPE_IPV6, IPPROTO_SCTP, IPPROTO_TCP, IPPROTO_UDP};
use sal::{Flow, Node};
use std::collections::BTreeMap;

pub const STATUS_SUCCESS: &str = "Success";
pub const STATUS_NODE_DOWN: &str = "Node is Down";
pub const STATUS_CONTAINER_MODE: &str = "Removed from node because in container mode";
pub const STATUS_PORT_REMOVED: &str = "Port removed";

/// Names of flows generated by the controller start with this
pub const INTERNAL_FLOW_PREFIX: &str = "**";

/// The group of the flow entries of static flows
pub const STATIC_FLOWS_GROUP: &str = "**StaticFlows";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticFlow {
    pub name: String,
    pub node: Node,
    pub flow: Flow,
    /// whether the flow should be installed in the node
    pub install_in_hw: bool,
    /// "Success" or the reason of the last failure
    pub status: String,
}

impl StaticFlow {
    #[must_use]
    pub fn new(name: impl Into<String>, node: Node, flow: Flow) -> Self {
        Self {
            name: name.into(),
            node,
            flow,
            install_in_hw: true,
            status: String::new(),
        }
    }

    #[must_use]
    pub fn with_install_in_hw(mut self, install: bool) -> Self {
        self.install_in_hw = install;
        self
    }

    /// Controller generated flows
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.name.starts_with(INTERNAL_FLOW_PREFIX)
    }

    #[must_use]
    pub fn is_installed_ok(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    #[must_use]
    pub fn flow_entry(&self) -> FlowEntry {
        FlowEntry::new(self.node.clone(), self.name.clone(), self.flow.clone())
            .with_group(STATIC_FLOWS_GROUP)
    }

    /// Same configuration, ignoring the status
    #[must_use]
    pub fn same_config(&self, other: &StaticFlow) -> bool {
        self.name == other.name
            && self.node == other.node
            && self.flow == other.flow
            && self.install_in_hw == other.install_in_hw
    }

    /// Check the configuration is consistent. Returns the reason it is not.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Name is empty".to_owned());
        }
        let m = &self.flow.matching;
        if let Some(port) = &m.in_port
            && port.node() != &self.node
        {
            return Err(format!("Ingress port {port} is not valid for node {}", self.node));
        }
        if (m.tp_src.is_some() || m.tp_dst.is_some())
            && !matches!(m.nw_proto, Some(IPPROTO_TCP | IPPROTO_UDP | IPPROTO_SCTP))
        {
            return Err("Transport ports require protocol TCP, UDP or SCTP".to_owned());
        }
        let families: Vec<bool> = [m.nw_src, m.nw_dst]
            .iter()
            .flatten()
            .map(|n| matches!(n, IpNet::V4(_)))
            .collect();
        if families.windows(2).any(|w| w[0] != w[1]) {
            return Err("IP Src Dest Type mismatch".to_owned());
        }
        let wanted = match m.dl_type {
            Some(ETHERTYPE_IPV4) => Some(true),
            Some(ETHERTYPE_IPV6) => Some(false),
            _ => None,
        };
        if let Some(v4) = wanted
            && families.iter().any(|f| *f != v4)
        {
            return Err("IP address family does not match the ethernet type".to_owned());
        }
        if self.flow.actions.is_empty() {
            return Err("No action specified".to_owned());
        }
        for action in &self.flow.actions {
            action.validate().map_err(|e| e.to_string())?;
        }
        if let Some(port) = self.flow.output_ports().find(|p| p.node() != &self.node) {
            return Err(format!("Output port {port} is not valid for node {}", self.node));
        }
        Ok(())
    }
}

/// Static flows by insertion order
#[derive(Debug, Default)]
pub struct StaticFlowStore {
    flows: BTreeMap<u32, StaticFlow>,
    last_ordinal: u32,
}

impl StaticFlowStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a flow, returning its ordinal
    pub fn insert(&mut self, flow: StaticFlow) -> u32 {
        self.last_ordinal += 1;
        self.flows.insert(self.last_ordinal, flow);
        self.last_ordinal
    }

    /// Replace the flow stored at `ordinal`
    pub fn replace(&mut self, ordinal: u32, flow: StaticFlow) -> Option<StaticFlow> {
        self.flows.insert(ordinal, flow)
    }

    pub fn remove(&mut self, ordinal: u32) -> Option<StaticFlow> {
        self.flows.remove(&ordinal)
    }

    /// Find a flow by name and node
    #[must_use]
    pub fn find(&self, name: &str, node: &Node) -> Option<(u32, &StaticFlow)> {
        self.flows
            .iter()
            .find(|(_, f)| f.name == name && &f.node == node)
            .map(|(ordinal, f)| (*ordinal, f))
    }

    pub fn find_mut(&mut self, name: &str, node: &Node) -> Option<&mut StaticFlow> {
        self.flows
            .values_mut()
            .find(|f| f.name == name && &f.node == node)
    }

    pub fn get_mut(&mut self, ordinal: u32) -> Option<&mut StaticFlow> {
        self.flows.get_mut(&ordinal)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StaticFlow> {
        self.flows.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StaticFlow> {
        self.flows.values_mut()
    }

    /// Keep only the flows for which `keep` is true
    pub fn retain(&mut self, mut keep: impl FnMut(&StaticFlow) -> bool) {
        self.flows.retain(|_, f| keep(f));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}
