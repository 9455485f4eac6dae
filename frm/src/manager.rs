// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The forwarding rules manager: the entry point applications and the controller
//! talk to. It gates requests on the container mode, keeps the static flow
//! configuration and reacts to node, container flow and container mode notifications.

use crate::container::{Container, ContainerFlow};
use crate::engine::FlowEngine;
use crate::errors::{ConflictKind, FrmError};
use crate::flowentry::FlowEntry;
use crate::mode::{ContainerModeCoordinator, Mode};
use crate::params::{FrmParams, ParamsError};
use crate::report::Report;
use crate::staticflow::{
    STATIC_FLOWS_GROUP, STATUS_CONTAINER_MODE, STATUS_NODE_DOWN, STATUS_PORT_REMOVED,
    STATUS_SUCCESS, StaticFlow, StaticFlowStore,
};
use ordermap::OrderSet;
use sal::flow::{ETHERTYPE_ARP, ETHERTYPE_LLDP};
use sal::{Action, Flow, FlowProgrammer, Match, Node, NodeConnector, Property, UpdateType};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, trace, warn};

use tracectl::{get_trace_ctl, trace_target};
trace_target!("frm-manager", LevelFilter::INFO, &["frm"]);

pub const PUNT_ARP_FLOW: &str = "**Punt ARP";
pub const PUNT_LLDP_FLOW: &str = "**Punt LLDP";
pub const CATCH_ALL_DROP_FLOW: &str = "**Catch-All Drop";

pub struct ForwardingRulesManager {
    params: FrmParams,
    engine: FlowEngine,
    mode: ContainerModeCoordinator,
    static_flows: Mutex<StaticFlowStore>,
}

impl ForwardingRulesManager {
    /// Build a manager for `container`, which must be the container named in `params`
    pub fn new(
        params: FrmParams,
        programmer: Arc<dyn FlowProgrammer>,
        container: Arc<dyn Container>,
    ) -> Result<Self, ParamsError> {
        params.validate()?;
        if params.container_name != container.name() {
            return Err(ParamsError::Invalid(format!(
                "configured for container {} but given container {}",
                params.container_name,
                container.name()
            )));
        }
        if let Some(tracing) = &params.tracing
            && let Err(e) = get_trace_ctl().setup_from_string(tracing)
        {
            warn!("Ignoring tracing configuration '{tracing}': {e}");
        }
        let mode = if params.start_in_container_mode {
            Mode::Container
        } else {
            Mode::Normal
        };
        info!(
            "Starting forwarding rules manager for container {} in {mode} mode",
            container.name()
        );
        Ok(Self {
            params,
            engine: FlowEngine::new(programmer, container),
            mode: ContainerModeCoordinator::new(mode),
            static_flows: Mutex::new(StaticFlowStore::new()),
        })
    }

    #[must_use]
    pub fn params(&self) -> &FrmParams {
        &self.params
    }

    #[must_use]
    pub fn engine(&self) -> &FlowEngine {
        &self.engine
    }

    #[must_use]
    pub fn coordinator(&self) -> &ContainerModeCoordinator {
        &self.mode
    }

    #[must_use]
    pub fn in_container_mode(&self) -> bool {
        self.mode.in_container_mode()
    }

    pub(crate) fn static_flows(&self) -> MutexGuard<'_, StaticFlowStore> {
        self.static_flows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn check_mode(&self, what: &str, request: &FlowEntry) -> Result<(), FrmError> {
        if self.mode.in_container_mode() && !request.is_internal() {
            warn!("Refusing to {what} {request}: in container mode");
            return Err(FrmError::Conflict(ConflictKind::ContainerMode));
        }
        Ok(())
    }

    /////////////////////////////////////////////////////////////////////////
    // flow entries
    /////////////////////////////////////////////////////////////////////////

    pub fn install_flow_entry(&self, request: &FlowEntry) -> Result<Report, FrmError> {
        self.check_mode("install", request)?;
        self.engine.add(request)
    }

    /// Uninstall a request. In container mode, a non-internal request is dropped from the
    /// archive so that it is not reinstalled when leaving container mode.
    pub fn uninstall_flow_entry(&self, request: &FlowEntry) -> Result<Report, FrmError> {
        if self.mode.in_container_mode() && !request.is_internal() {
            let forgotten = self.mode.forget(request);
            debug!("In container mode: {request} forgotten: {forgotten}");
            return Ok(Report::new());
        }
        self.engine.remove(request)
    }

    pub fn modify_flow_entry(
        &self,
        current: &FlowEntry,
        new: &FlowEntry,
    ) -> Result<Report, FrmError> {
        self.check_mode("modify", current)?;
        self.engine.modify(current, new)
    }

    pub fn modify_or_add_flow_entry(&self, new: &FlowEntry) -> Result<Report, FrmError> {
        self.check_mode("install", new)?;
        self.engine.modify_or_add(new)
    }

    /// Uninstall every request of `group`. All requests are attempted; the last error is
    /// returned if any failed. The group of static flows is managed through the static flow
    /// operations only.
    pub fn uninstall_flow_entry_group(&self, group: &str) -> Result<(), FrmError> {
        if group.is_empty() {
            return Err(FrmError::InvalidArgument("empty group name".to_string()));
        }
        if group == STATIC_FLOWS_GROUP {
            return Err(FrmError::InvalidArgument(format!(
                "group {group} cannot be uninstalled as a whole"
            )));
        }
        if self.mode.in_container_mode() {
            let forgotten = self.mode.forget_group(group);
            debug!("In container mode: forgot {forgotten} requests of group {group}");
            return Ok(());
        }
        let requests = self.get_flow_entries_for_group(group);
        info!("Uninstalling {} requests of group {group}", requests.len());
        let mut result = Ok(());
        for request in &requests {
            if let Err(e) = self.engine.remove(request) {
                warn!("Failed to uninstall {request}: {e}");
                result = Err(e);
            }
        }
        result
    }

    /// The distinct requests of `group`
    #[must_use]
    pub fn get_flow_entries_for_group(&self, group: &str) -> Vec<FlowEntry> {
        self.engine
            .database()
            .group_entries(group)
            .iter()
            .map(|e| e.original().clone())
            .collect::<OrderSet<_>>()
            .into_iter()
            .collect()
    }

    /// The entries of `group` as installed in the nodes
    #[must_use]
    pub fn get_installed_flow_entries_for_group(&self, group: &str) -> Vec<FlowEntry> {
        self.engine
            .database()
            .group_entries(group)
            .iter()
            .map(|e| e.install().clone())
            .collect()
    }

    /// Tell if container flows are active and none of them allows `request`
    #[must_use]
    pub fn check_flow_entry_conflict(&self, request: &FlowEntry) -> bool {
        self.engine.check_flow_entry_conflict(request)
    }

    /////////////////////////////////////////////////////////////////////////
    // output ports
    /////////////////////////////////////////////////////////////////////////

    fn installed_request(&self, node: &Node, name: &str) -> Result<FlowEntry, FrmError> {
        self.engine
            .database()
            .find_by_name(node, name)
            .map(|e| e.original().clone())
            .ok_or_else(|| FrmError::NotFound(format!("flow '{name}' on node {node}")))
    }

    fn edit_actions(
        &self,
        node: &Node,
        name: &str,
        edit: impl FnOnce(&mut Vec<Action>),
    ) -> Result<Report, FrmError> {
        let current = self.installed_request(node, name)?;
        let mut flow = current.flow.clone();
        edit(&mut flow.actions);
        let new = current.with_flow(flow);
        self.modify_flow_entry(&current, &new)
    }

    /// Add output actions for `ports` to the installed flow `name`
    pub fn add_output_port(
        &self,
        node: &Node,
        name: &str,
        ports: &[NodeConnector],
    ) -> Result<Report, FrmError> {
        self.edit_actions(node, name, |actions| {
            for port in ports {
                let output = Action::Output(port.clone());
                if !actions.contains(&output) {
                    actions.push(output);
                }
            }
        })
    }

    /// Remove the output actions for `ports` from the installed flow `name`
    pub fn remove_output_port(
        &self,
        node: &Node,
        name: &str,
        ports: &[NodeConnector],
    ) -> Result<Report, FrmError> {
        self.edit_actions(node, name, |actions| {
            actions.retain(|a| !matches!(a, Action::Output(p) if ports.contains(p)));
        })
    }

    /// Replace the first output action of the installed flow `name` with one for `port`
    pub fn replace_output_port(
        &self,
        node: &Node,
        name: &str,
        port: &NodeConnector,
    ) -> Result<Report, FrmError> {
        self.edit_actions(node, name, |actions| {
            if let Some(pos) = actions.iter().position(|a| matches!(a, Action::Output(_))) {
                actions.remove(pos);
            }
            actions.push(Action::Output(port.clone()));
        })
    }

    /// The first output port of the installed flow `name`
    #[must_use]
    pub fn get_output_port(&self, node: &Node, name: &str) -> Option<NodeConnector> {
        let request = self.installed_request(node, name).ok()?;
        request.flow.output_ports().next().cloned()
    }

    /////////////////////////////////////////////////////////////////////////
    // static flows
    /////////////////////////////////////////////////////////////////////////

    /// Store a static flow and install it if requested. When restoring a saved
    /// configuration, the flow is not validated and is stored even if it cannot be
    /// installed.
    pub fn add_static_flow(&self, config: StaticFlow, restore: bool) -> Result<(), FrmError> {
        if !restore && config.is_internal() {
            return Err(FrmError::InvalidArgument(format!(
                "flow name '{}' is reserved",
                config.name
            )));
        }
        self.store_static_flow(config, restore)
    }

    fn store_static_flow(&self, mut config: StaticFlow, restore: bool) -> Result<(), FrmError> {
        let mut store = self.static_flows();
        if store.find(&config.name, &config.node).is_some() {
            return Err(FrmError::Conflict(ConflictKind::StaticFlowExists));
        }
        if !restore {
            config.validate().map_err(FrmError::InvalidArgument)?;
        }
        config.status = STATUS_SUCCESS.to_string();
        if config.install_in_hw
            && let Err(e) = self.install_flow_entry(&config.flow_entry())
        {
            if !restore {
                warn!("Static flow '{}' on {} not added: {e}", config.name, config.node);
                return Err(e);
            }
            config.status = e.to_string();
        }
        debug!("Storing static flow '{}' on {}", config.name, config.node);
        store.insert(config);
        Ok(())
    }

    fn drop_static_flow(&self, store: &mut StaticFlowStore, ordinal: u32) -> Result<(), FrmError> {
        let Some(config) = store.get_mut(ordinal) else {
            return Err(FrmError::NotFound("Entry Not Present".to_string()));
        };
        if config.install_in_hw
            && let Err(e) = self.uninstall_flow_entry(&config.flow_entry())
        {
            warn!("Static flow '{}' on {} not removed: {e}", config.name, config.node);
            config.status = e.to_string();
            return Err(e);
        }
        store.remove(ordinal);
        Ok(())
    }

    /// Remove a user static flow
    pub fn remove_static_flow(&self, name: &str, node: &Node) -> Result<(), FrmError> {
        let mut store = self.static_flows();
        let Some((ordinal, config)) = store.find(name, node) else {
            return Err(FrmError::NotFound("Entry Not Present".to_string()));
        };
        if config.is_internal() {
            return Err(FrmError::NotAcceptable(format!(
                "flow '{name}' is internal"
            )));
        }
        self.drop_static_flow(&mut store, ordinal)
    }

    /// Remove any static flow, internal ones included
    pub fn remove_static_flow_config(&self, config: &StaticFlow) -> Result<(), FrmError> {
        let mut store = self.static_flows();
        let Some((ordinal, _)) = store.find(&config.name, &config.node) else {
            return Err(FrmError::NotFound("Entry Not Present".to_string()));
        };
        self.drop_static_flow(&mut store, ordinal)
    }

    /// Change the flow of a user static flow. Whether it is installed does not change:
    /// see [`ForwardingRulesManager::toggle_static_flow_status`].
    pub fn modify_static_flow(&self, mut new: StaticFlow) -> Result<(), FrmError> {
        if new.is_internal() {
            return Err(FrmError::NotAcceptable(format!(
                "flow '{}' is internal",
                new.name
            )));
        }
        new.validate().map_err(FrmError::InvalidArgument)?;
        let mut store = self.static_flows();
        let Some((ordinal, old)) = store.find(&new.name, &new.node) else {
            return Err(FrmError::NotFound("Entry Not Present".to_string()));
        };
        new.install_in_hw = old.install_in_hw;
        new.status.clone_from(&old.status);
        if old.same_config(&new) {
            debug!("Static flow '{}' on {} unchanged", new.name, new.node);
            return Ok(());
        }
        if old.install_in_hw && old.is_installed_ok() {
            self.modify_flow_entry(&old.flow_entry(), &new.flow_entry())?;
        }
        store.replace(ordinal, new);
        Ok(())
    }

    /// Install a static flow that is not installed, or uninstall one that is
    pub fn toggle_static_flow_status(&self, name: &str, node: &Node) -> Result<(), FrmError> {
        let mut store = self.static_flows();
        let Some((ordinal, _)) = store.find(name, node) else {
            return Err(FrmError::NotFound("Entry Not Present".to_string()));
        };
        let Some(config) = store.get_mut(ordinal) else {
            return Err(FrmError::NotFound("Entry Not Present".to_string()));
        };
        let entry = config.flow_entry();
        let result = if config.install_in_hw {
            self.uninstall_flow_entry(&entry)
        } else {
            self.install_flow_entry(&entry)
        };
        match result {
            Ok(_) => {
                config.install_in_hw = !config.install_in_hw;
                config.status = STATUS_SUCCESS.to_string();
                info!(
                    "Static flow '{name}' on {node} {}",
                    if config.install_in_hw { "installed" } else { "uninstalled" }
                );
                Ok(())
            }
            Err(e) => {
                config.status = e.to_string();
                Err(e)
            }
        }
    }

    #[must_use]
    pub fn get_static_flows(&self) -> Vec<StaticFlow> {
        self.static_flows().iter().cloned().collect()
    }

    #[must_use]
    pub fn get_static_flow(&self, name: &str, node: &Node) -> Option<StaticFlow> {
        self.static_flows()
            .find(name, node)
            .map(|(_, config)| config.clone())
    }

    #[must_use]
    pub fn get_static_flows_for_node(&self, node: &Node) -> Vec<StaticFlow> {
        self.static_flows()
            .iter()
            .filter(|config| &config.node == node)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn get_static_flow_names_for_node(&self, node: &Node) -> Vec<String> {
        self.static_flows()
            .iter()
            .filter(|config| &config.node == node)
            .map(|config| config.name.clone())
            .collect()
    }

    /// Nodes with static flows, in order
    #[must_use]
    pub fn get_nodes_with_configured_flows(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self
            .static_flows()
            .iter()
            .map(|config| config.node.clone())
            .collect();
        nodes.sort();
        nodes.dedup();
        nodes
    }

    /////////////////////////////////////////////////////////////////////////
    // notifications
    /////////////////////////////////////////////////////////////////////////

    pub fn notify_node(&self, node: &Node, update: UpdateType, props: &[Property]) {
        trace!(
            "Node {node} {update}: {}",
            props
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        );
        match update {
            UpdateType::Added => self.install_static_flows_on(node),
            UpdateType::Removed => self.forget_node(node),
            UpdateType::Changed => {}
        }
    }

    /// Install the static flows of a node that just came up
    fn install_static_flows_on(&self, node: &Node) {
        let mut store = self.static_flows();
        for config in store.iter_mut() {
            if &config.node != node || !config.install_in_hw || config.is_installed_ok() {
                continue;
            }
            match self.install_flow_entry(&config.flow_entry()) {
                Ok(_) => config.status = STATUS_SUCCESS.to_string(),
                Err(e) => {
                    warn!("Static flow '{}' not installed on {node}: {e}", config.name);
                    config.status = e.to_string();
                }
            }
        }
    }

    /// Drop everything known about a node that went away
    fn forget_node(&self, node: &Node) {
        let purged = self.engine.purge_node(node);
        debug!("Node {node} is down: dropped {} entries", purged.len());
        let mut store = self.static_flows();
        store.retain(|config| &config.node != node || !config.is_internal());
        for config in store.iter_mut().filter(|config| &config.node == node) {
            config.status = STATUS_NODE_DOWN.to_string();
        }
    }

    /// A port was added to or removed from a node. Entries using a removed port are
    /// uninstalled; static flows using an added port are installed again.
    pub fn notify_node_connector(
        &self,
        port: &NodeConnector,
        update: UpdateType,
        props: &[Property],
    ) {
        trace!("Port {port} {update}: {} properties", props.len());
        match update {
            UpdateType::Added => self.install_static_flows_on_port(port),
            UpdateType::Removed => self.uninstall_flows_on_port(port),
            UpdateType::Changed => {}
        }
    }

    fn uninstall_flows_on_port(&self, port: &NodeConnector) {
        let entries: Vec<_> = self
            .engine
            .database()
            .node_entries(port.node())
            .into_iter()
            .filter(|e| e.flow().uses_port(port))
            .collect();
        if entries.is_empty() {
            return;
        }
        info!("Port {port} removed: uninstalling {} entries", entries.len());
        let report = self.engine.remove_internal(entries);
        let mut store = self.static_flows();
        for outcome in report.outcomes() {
            if !outcome.outcome.is_success() {
                warn!("Could not uninstall {}: {}", outcome.entry, outcome.outcome);
                continue;
            }
            if outcome.entry.group.as_deref() != Some(STATIC_FLOWS_GROUP) {
                continue;
            }
            if let Some(config) = store.find_mut(&outcome.entry.name, port.node()) {
                config.status = STATUS_PORT_REMOVED.to_string();
            }
        }
    }

    fn install_static_flows_on_port(&self, port: &NodeConnector) {
        let mut store = self.static_flows();
        for config in store.iter_mut() {
            if &config.node != port.node()
                || !config.install_in_hw
                || config.is_installed_ok()
                || !config.flow.uses_port(port)
            {
                continue;
            }
            match self.install_flow_entry(&config.flow_entry()) {
                Ok(_) => config.status = STATUS_SUCCESS.to_string(),
                Err(e) => {
                    warn!("Static flow '{}' not installed on {port}: {e}", config.name);
                    config.status = e.to_string();
                }
            }
        }
    }

    /// The node removed `flow` on its own, e.g. on a timeout. The entry is forgotten and a
    /// static flow it came from is marked as not installed.
    pub fn flow_removed(&self, node: &Node, flow: &Flow) {
        let lookup = FlowEntry::new(node.clone(), "", flow.clone());
        let Some(entry) = self.engine.find_match(&lookup, false) else {
            trace!("Flow removed from {node} is not known: {flow}");
            return;
        };
        debug!("Node {node} removed {}", entry.install());
        let mut store = self.static_flows();
        if let Some(config) = store.find_mut(entry.name(), node) {
            config.install_in_hw = !config.install_in_hw;
            config.status = STATUS_SUCCESS.to_string();
        }
        self.engine.forget_entry(&entry);
    }

    /// The container flows changed: re-derive what is installed
    pub fn container_flow_updated(
        &self,
        previous: &ContainerFlow,
        current: &ContainerFlow,
        update: UpdateType,
    ) {
        info!("Container flow {update}: {previous} -> {current}");
        self.mode.on_container_flow_set_changed(&self.engine);
    }

    /// A non-default container was created (`Added`) or the last one removed (`Removed`)
    pub fn container_mode_updated(&self, update: UpdateType) {
        let (changed, status) = match update {
            UpdateType::Added => (
                self.mode.enter_container_mode(&self.engine),
                STATUS_CONTAINER_MODE,
            ),
            UpdateType::Removed => (
                self.mode.leave_container_mode(&self.engine),
                STATUS_SUCCESS,
            ),
            UpdateType::Changed => return,
        };
        if !changed {
            return;
        }
        let mut store = self.static_flows();
        for config in store
            .iter_mut()
            .filter(|config| config.install_in_hw && !config.is_internal())
        {
            config.status = status.to_string();
        }
    }

    fn default_flows(&self, node: &Node) -> [StaticFlow; 3] {
        let punt = |name: &str, ethertype: u16| {
            StaticFlow::new(
                name,
                node.clone(),
                Flow::new(
                    Match::any().with_dl_type(ethertype),
                    vec![Action::Controller],
                )
                .with_priority(self.params.punt_priority),
            )
        };
        [
            punt(PUNT_ARP_FLOW, ETHERTYPE_ARP),
            punt(PUNT_LLDP_FLOW, ETHERTYPE_LLDP),
            StaticFlow::new(
                CATCH_ALL_DROP_FLOW,
                node.clone(),
                Flow::new(Match::any(), vec![Action::Drop])
                    .with_priority(self.params.drop_priority),
            ),
        ]
    }

    /// Add the default flows of a node in proactive mode, remove them in reactive mode
    pub fn mode_change_notify(&self, node: &Node, proactive: bool) {
        info!(
            "Node {node} switched to {} mode",
            if proactive { "proactive" } else { "reactive" }
        );
        for config in self.default_flows(node) {
            let name = config.name.clone();
            let result = if proactive {
                self.store_static_flow(config, false)
            } else {
                self.remove_static_flow_config(&config)
            };
            match result {
                Ok(()) | Err(FrmError::NotFound(_)) => {}
                Err(FrmError::Conflict(ConflictKind::StaticFlowExists)) => {
                    debug!("Default flow '{name}' already present on {node}");
                }
                Err(e) => warn!("Default flow '{name}' on {node}: {e}"),
            }
        }
    }
}
