// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Display of the manager state

use crate::database::FlowDatabase;
use crate::install::{EntryStatus, InstalledEntry};
use crate::manager::ForwardingRulesManager;
use crate::staticflow::{StaticFlow, StaticFlowStore};
use std::fmt::Display;

const LINE_WIDTH: usize = 81;

struct Heading(String);
impl Display for Heading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = LINE_WIDTH.saturating_sub(self.0.len() + 2) / 2;
        write!(f, " {0:─<width$}", "─", width = len)?;
        write!(f, " {} ", self.0)?;
        writeln!(f, " {0:─<width$}", "─", width = len)
    }
}

impl Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryStatus::Installed => write!(f, "installed"),
            EntryStatus::PendingDelete => write!(f, "pending-delete"),
        }
    }
}

impl Display for InstalledEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.install())?;
        if self.original() != self.install() {
            write!(f, " (requested as {})", self.original().flow.matching)?;
        }
        if let Some(container_flow) = self.container_flow() {
            write!(f, " via {container_flow}")?;
        }
        if self.status() != EntryStatus::Installed {
            write!(f, " [{}]", self.status())?;
        }
        Ok(())
    }
}

impl Display for FlowDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Heading(format!("installed flow entries ({})", self.len())).fmt(f)?;
        for node in self.nodes() {
            writeln!(f, " node {node}:")?;
            for entry in self.node_entries(&node) {
                writeln!(f, "    {entry}")?;
            }
        }
        let groups = self.groups();
        if !groups.is_empty() {
            writeln!(f, " groups: {}", groups.join(", "))?;
        }
        Ok(())
    }
}

impl Display for StaticFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}' node:{} {} hw:{} status:{}",
            self.name,
            self.node,
            self.flow,
            if self.install_in_hw { "yes" } else { "no" },
            if self.status.is_empty() { "--" } else { &self.status }
        )
    }
}

impl Display for StaticFlowStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Heading(format!("static flows ({})", self.len())).fmt(f)?;
        for config in self.iter() {
            writeln!(f, "    {config}")?;
        }
        Ok(())
    }
}

impl Display for ForwardingRulesManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Forwarding rules manager for container {} ({} mode)",
            self.engine().container().name(),
            self.coordinator().mode()
        )?;
        let archived = self.coordinator().archived();
        if !archived.is_empty() {
            Heading(format!("archived requests ({})", archived.len())).fmt(f)?;
            for request in &archived {
                writeln!(f, "    {request}")?;
            }
        }
        self.engine().database().fmt(f)?;
        self.static_flows().fmt(f)
    }
}
