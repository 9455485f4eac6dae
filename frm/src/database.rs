// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Software view of the entries installed in the network nodes.
//!
//! Entries are indexed by node and, if they belong to a group, by group name. Both
//! indexes are updated together: an entry is in the node index iff it is installed and
//! in the group index iff it is installed and grouped. Empty sets are never kept.

use crate::flowentry::FlowEntry;
use crate::install::InstalledEntry;
use ahash::RandomState;
use sal::{Match, Node};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

type EntrySet = HashSet<Arc<InstalledEntry>, RandomState>;

fn entry_set() -> EntrySet {
    HashSet::with_hasher(RandomState::with_seed(0))
}

/// What a node flow table uses to tell flows apart
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchKey {
    pub matching: Match,
    pub priority: u16,
}

impl MatchKey {
    #[must_use]
    pub fn of(entry: &FlowEntry) -> Self {
        Self {
            matching: entry.flow.matching.clone(),
            priority: entry.flow.priority,
        }
    }
}

#[derive(Debug)]
pub struct FlowDatabase {
    node_flows: HashMap<Node, EntrySet, RandomState>,
    group_flows: HashMap<String, EntrySet, RandomState>,
    reservations: HashMap<Node, HashSet<MatchKey, RandomState>, RandomState>,
}

impl Default for FlowDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowDatabase {
    #[must_use]
    pub fn new() -> Self {
        Self {
            node_flows: HashMap::with_hasher(RandomState::with_seed(0)),
            group_flows: HashMap::with_hasher(RandomState::with_seed(0)),
            reservations: HashMap::with_hasher(RandomState::with_seed(0)),
        }
    }

    /// Number of installed entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.node_flows.values().map(HashSet::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.node_flows.is_empty()
    }

    /// Find an entry on the node of `entry` with the same match and priority. A loose
    /// lookup compares against the original requests, a strict one against the flows
    /// as installed.
    #[must_use]
    pub fn find_match(&self, entry: &FlowEntry, loose: bool) -> Option<Arc<InstalledEntry>> {
        self.node_flows.get(&entry.node).and_then(|set| {
            set.iter()
                .find(|installed| {
                    let other = if loose {
                        installed.original()
                    } else {
                        installed.install()
                    };
                    other.same_match_and_priority(entry)
                })
                .cloned()
        })
    }

    /// Find an installed entry colliding with `candidate`, ignoring entries derived from
    /// `exempt`.
    #[must_use]
    pub fn find_collision(
        &self,
        candidate: &InstalledEntry,
        exempt: Option<&FlowEntry>,
    ) -> Option<Arc<InstalledEntry>> {
        self.node_flows.get(candidate.node()).and_then(|set| {
            set.iter()
                .find(|installed| {
                    installed.collides_with(candidate)
                        && exempt.is_none_or(|e| installed.original() != e)
                })
                .cloned()
        })
    }

    /// Find the first entry on `node` requested with name `name`
    #[must_use]
    pub fn find_by_name(&self, node: &Node, name: &str) -> Option<Arc<InstalledEntry>> {
        self.node_flows
            .get(node)
            .and_then(|set| set.iter().find(|e| e.original().name == name).cloned())
    }

    /// Lookup an entry by identity
    #[must_use]
    pub fn get(&self, entry: &InstalledEntry) -> Option<Arc<InstalledEntry>> {
        self.node_flows
            .get(entry.node())
            .and_then(|set| set.get(entry))
            .cloned()
    }

    #[must_use]
    pub fn contains(&self, entry: &InstalledEntry) -> bool {
        self.get(entry).is_some()
    }

    /// Add an entry to both indexes. Returns false if it was already present.
    pub fn insert(&mut self, entry: Arc<InstalledEntry>) -> bool {
        if let Some(group) = entry.group() {
            self.group_flows
                .entry(group.to_owned())
                .or_insert_with(entry_set)
                .insert(entry.clone());
        }
        self.node_flows
            .entry(entry.node().clone())
            .or_insert_with(entry_set)
            .insert(entry)
    }

    /// Remove an entry from both indexes
    pub fn remove(&mut self, entry: &InstalledEntry) -> Option<Arc<InstalledEntry>> {
        if let Some(group) = entry.group()
            && let Some(set) = self.group_flows.get_mut(group)
        {
            set.remove(entry);
            if set.is_empty() {
                self.group_flows.remove(group);
            }
        }
        let set = self.node_flows.get_mut(entry.node())?;
        let removed = set.take(entry);
        if set.is_empty() {
            self.node_flows.remove(entry.node());
        }
        removed
    }

    /// Replace `old` with `new`
    pub fn replace(&mut self, old: &InstalledEntry, new: Arc<InstalledEntry>) {
        self.remove(old);
        self.insert(new);
    }

    /// Drop every entry of `node` from both indexes, returning them.
    /// Reservations of installs in progress on `node` are dropped too.
    pub fn purge_node(&mut self, node: &Node) -> Vec<Arc<InstalledEntry>> {
        self.reservations.remove(node);
        let Some(set) = self.node_flows.remove(node) else {
            return vec![];
        };
        self.group_flows.retain(|_, group| {
            group.retain(|e| e.node() != node);
            !group.is_empty()
        });
        set.into_iter().collect()
    }

    /// Nodes with installed entries, in order
    #[must_use]
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.node_flows.keys().cloned().collect();
        nodes.sort();
        nodes
    }

    /// The entries installed on `node`, sorted by name and priority
    #[must_use]
    pub fn node_entries(&self, node: &Node) -> Vec<Arc<InstalledEntry>> {
        let mut entries: Vec<_> = self
            .node_flows
            .get(node)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| {
            (a.name(), a.flow().priority).cmp(&(b.name(), b.flow().priority))
        });
        entries
    }

    /// The entries in group `group`, by node then by name and priority
    #[must_use]
    pub fn group_entries(&self, group: &str) -> Vec<Arc<InstalledEntry>> {
        let mut entries: Vec<_> = self
            .group_flows
            .get(group)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| {
            (a.node(), a.name(), a.flow().priority).cmp(&(b.node(), b.name(), b.flow().priority))
        });
        entries
    }

    /// All the entries, by node then by name and priority
    #[must_use]
    pub fn all_entries(&self) -> Vec<Arc<InstalledEntry>> {
        self.nodes()
            .iter()
            .flat_map(|node| self.node_entries(node))
            .collect()
    }

    #[must_use]
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self.group_flows.keys().cloned().collect();
        groups.sort();
        groups
    }

    /// Reserve `key` on `node` for an install in progress. Fails if already reserved.
    pub fn reserve(&mut self, node: &Node, key: MatchKey) -> bool {
        self.reservations
            .entry(node.clone())
            .or_insert_with(|| HashSet::with_hasher(RandomState::with_seed(0)))
            .insert(key)
    }

    pub fn release(&mut self, node: &Node, key: &MatchKey) {
        if let Some(keys) = self.reservations.get_mut(node) {
            keys.remove(key);
            if keys.is_empty() {
                self.reservations.remove(node);
            }
        }
    }

    #[must_use]
    pub fn is_reserved(&self, node: &Node, key: &MatchKey) -> bool {
        self.reservations
            .get(node)
            .is_some_and(|keys| keys.contains(key))
    }

    #[must_use]
    pub fn reservation_count(&self) -> usize {
        self.reservations.values().map(HashSet::len).sum()
    }

    /// Verify that the two indexes agree
    pub fn check_consistency(&self) -> Result<(), String> {
        for (node, set) in &self.node_flows {
            if set.is_empty() {
                return Err(format!("empty entry set for node {node}"));
            }
            for entry in set {
                if entry.node() != node {
                    return Err(format!("entry {} indexed under node {node}", entry.install()));
                }
                if let Some(group) = entry.group()
                    && !self.group_flows.get(group).is_some_and(|g| g.contains(entry))
                {
                    return Err(format!("entry {} missing from group {group}", entry.install()));
                }
            }
        }
        for (group, set) in &self.group_flows {
            if set.is_empty() {
                return Err(format!("empty entry set for group {group}"));
            }
            for entry in set {
                if entry.group() != Some(group.as_str()) {
                    return Err(format!("entry {} indexed under group {group}", entry.install()));
                }
                if !self.node_flows.get(entry.node()).is_some_and(|n| n.contains(entry)) {
                    return Err(format!("grouped entry {} not installed", entry.install()));
                }
            }
        }
        Ok(())
    }

    /// One line per entry, sorted
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .node_flows
            .values()
            .flatten()
            .map(|e| format!("{} <- '{}'", e.install(), e.original().name))
            .collect();
        lines.sort();
        lines
    }
}
