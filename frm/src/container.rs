// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Containers and container flows.
//!
//! A container is a slice of the network. Its container flows are filters: a flow entry
//! may only be installed for a container if its match overlaps some container flow, and
//! what gets installed is the flow restricted to that overlap. A container with no
//! container flows is the default container and accepts everything unchanged.

use crate::flowentry::FlowEntry;
use crate::install::InstalledEntry;
use ordermap::OrderSet;
use sal::{Flow, Match};
use std::fmt::Display;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, trace};

pub const DEFAULT_CONTAINER: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerFlow {
    matching: Match,
}

impl ContainerFlow {
    #[must_use]
    pub fn new(matching: Match) -> Self {
        Self { matching }
    }

    #[must_use]
    pub fn matching(&self) -> &Match {
        &self.matching
    }

    /// Tell if `flow` selects some traffic this container flow permits
    #[must_use]
    pub fn allows_flow(&self, flow: &Flow) -> bool {
        flow.matching.intersects(&self.matching)
    }

    /// The flow restricted to this container flow, if they overlap
    #[must_use]
    pub fn merge(&self, flow: &Flow) -> Option<Flow> {
        flow.matching
            .intersection(&self.matching)
            .map(|matching| flow.with_match(matching))
    }
}

impl Display for ContainerFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "container-flow[{}]", self.matching)
    }
}

/// What the manager needs to know about the container it works for
pub trait Container: Send + Sync {
    fn name(&self) -> &str;
    /// The active container flows. Empty for the default container.
    fn container_flows(&self) -> Vec<ContainerFlow>;
}

/// A container whose flows live in memory
#[derive(Debug)]
pub struct ContainerView {
    name: String,
    flows: RwLock<Vec<ContainerFlow>>,
}

impl Default for ContainerView {
    fn default() -> Self {
        Self::new(DEFAULT_CONTAINER)
    }
}

impl ContainerView {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flows: RwLock::new(Vec::new()),
        }
    }

    /// Add a container flow. Returns false if it was already present.
    pub fn add_container_flow(&self, flow: ContainerFlow) -> bool {
        let mut flows = self.flows.write().unwrap_or_else(PoisonError::into_inner);
        if flows.contains(&flow) {
            return false;
        }
        debug!("Container {}: adding {flow}", self.name);
        flows.push(flow);
        true
    }

    /// Remove a container flow. Returns false if it was not present.
    pub fn remove_container_flow(&self, flow: &ContainerFlow) -> bool {
        let mut flows = self.flows.write().unwrap_or_else(PoisonError::into_inner);
        let before = flows.len();
        flows.retain(|f| f != flow);
        let removed = flows.len() != before;
        if removed {
            debug!("Container {}: removed {flow}", self.name);
        }
        removed
    }

    /// Replace all container flows, returning the previous ones
    pub fn set_container_flows(&self, new: Vec<ContainerFlow>) -> Vec<ContainerFlow> {
        let mut flows = self.flows.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *flows, new)
    }
}

impl Container for ContainerView {
    fn name(&self) -> &str {
        &self.name
    }
    fn container_flows(&self) -> Vec<ContainerFlow> {
        self.flows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Derive the entries to install for `request` given the active container flows.
///
/// With no container flows the request is installed as is. Otherwise there is one entry
/// per container flow allowing the request; several container flows may yield the same
/// install flow, in which case only the first is kept.
#[must_use]
pub fn derive_install_entries(
    request: &FlowEntry,
    container_flows: &[ContainerFlow],
) -> Vec<InstalledEntry> {
    if container_flows.is_empty() {
        return vec![InstalledEntry::new(request.clone(), request.clone(), None)];
    }
    let mut derived = OrderSet::new();
    for cflow in container_flows {
        let Some(merged) = cflow.merge(&request.flow) else {
            continue;
        };
        let entry = InstalledEntry::new(
            request.clone(),
            request.with_flow(merged),
            Some(cflow.clone()),
        );
        if !derived.insert(entry) {
            trace!("{cflow} yields a duplicate install entry for {request}");
        }
    }
    derived.into_iter().collect()
}

/// Tell if container flows are active and none of them allows `request`
#[must_use]
pub fn conflicts_with_container_flows(request: &FlowEntry, container_flows: &[ContainerFlow]) -> bool {
    !container_flows.is_empty()
        && !container_flows
            .iter()
            .any(|cflow| cflow.allows_flow(&request.flow))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sal::{Action, IdTypeRegistry, Node};

    fn request(matching: Match) -> FlowEntry {
        let registry = IdTypeRegistry::with_defaults();
        let node = Node::parse(&registry, "OF|1").unwrap();
        FlowEntry::new(node, "req", Flow::new(matching, vec![Action::Drop]).with_priority(10))
    }

    fn vlan(v: u16) -> ContainerFlow {
        ContainerFlow::new(Match::any().with_dl_vlan(v))
    }

    #[test]
    fn default_container_installs_as_is() {
        let req = request(Match::any().with_nw_proto(6));
        let derived = derive_install_entries(&req, &[]);
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].original(), &req);
        assert_eq!(derived[0].install(), &req);
        assert!(derived[0].container_flow().is_none());
        assert!(!conflicts_with_container_flows(&req, &[]));
    }

    #[test]
    fn fan_out_per_allowing_container_flow() {
        let req = request(Match::any().with_nw_proto(6));
        let cflows = [vlan(10), vlan(20)];
        let derived = derive_install_entries(&req, &cflows);
        assert_eq!(derived.len(), 2);
        assert_eq!(
            derived[1].flow().matching,
            Match::any().with_dl_vlan(20).with_nw_proto(6)
        );
        assert_eq!(derived[1].original(), &req);
        assert_eq!(derived[1].flow().priority, 10);
    }

    #[test]
    fn no_allowing_container_flow() {
        let req = request(Match::any().with_dl_vlan(30));
        let cflows = [vlan(10), vlan(20)];
        assert!(derive_install_entries(&req, &cflows).is_empty());
        assert!(conflicts_with_container_flows(&req, &cflows));
    }

    #[test]
    fn identical_merges_are_collapsed() {
        // both container flows restrict the request to vlan 10
        let req = request(Match::any().with_dl_vlan(10));
        let cflows = [vlan(10), ContainerFlow::new(Match::any())];
        let derived = derive_install_entries(&req, &cflows);
        assert_eq!(derived.len(), 1);
    }

    #[test]
    fn view_updates() {
        let view = ContainerView::new("blue");
        assert_eq!(view.name(), "blue");
        assert!(view.add_container_flow(vlan(1)));
        assert!(!view.add_container_flow(vlan(1)));
        assert!(view.add_container_flow(vlan(2)));
        assert!(view.remove_container_flow(&vlan(1)));
        assert!(!view.remove_container_flow(&vlan(1)));
        assert_eq!(view.container_flows(), vec![vlan(2)]);
        assert_eq!(view.set_container_flows(vec![]), vec![vlan(2)]);
    }
}
