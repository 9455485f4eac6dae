// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Entries as installed in network nodes

use crate::container::ContainerFlow;
use crate::flowentry::FlowEntry;
use sal::{Flow, Node};
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU8, Ordering};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("no such entry status: {0}")]
pub struct NoSuchStatus(u8);

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryStatus {
    Installed = 0,
    PendingDelete = 1,
}

impl TryFrom<u8> for EntryStatus {
    type Error = NoSuchStatus;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EntryStatus::Installed),
            1 => Ok(EntryStatus::PendingDelete),
            v => Err(NoSuchStatus(v)),
        }
    }
}

impl From<EntryStatus> for u8 {
    fn from(status: EntryStatus) -> Self {
        status as u8
    }
}

pub struct AtomicEntryStatus(AtomicU8);

impl Debug for AtomicEntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.load(Ordering::Relaxed))
    }
}

impl AtomicEntryStatus {
    #[must_use]
    pub fn new(status: EntryStatus) -> Self {
        Self(AtomicU8::new(u8::from(status)))
    }

    /// Load the status. Only valid statuses are ever stored, so an unknown value is read
    /// as [`EntryStatus::Installed`].
    #[must_use]
    pub fn load(&self, ordering: Ordering) -> EntryStatus {
        EntryStatus::try_from(self.0.load(ordering)).unwrap_or(EntryStatus::Installed)
    }

    pub fn store(&self, status: EntryStatus, ordering: Ordering) {
        self.0.store(u8::from(status), ordering);
    }

    /// Atomic compare and exchange of the status.
    ///
    /// # Errors
    ///
    /// Returns the current status if it is not `current`.
    pub fn compare_exchange(
        &self,
        current: EntryStatus,
        new: EntryStatus,
        success: Ordering,
        failure: Ordering,
    ) -> Result<EntryStatus, EntryStatus> {
        match self
            .0
            .compare_exchange(u8::from(current), u8::from(new), success, failure)
        {
            Ok(_) => Ok(current),
            Err(actual) => Err(EntryStatus::try_from(actual).unwrap_or(EntryStatus::Installed)),
        }
    }
}

/// An original request merged with at most one container flow.
///
/// Two entries are the same if they have the same original and install entries. The
/// status is not part of the identity.
#[derive(Debug)]
pub struct InstalledEntry {
    original: FlowEntry,
    install: FlowEntry,
    container_flow: Option<ContainerFlow>,
    status: AtomicEntryStatus,
}

impl InstalledEntry {
    #[must_use]
    pub fn new(original: FlowEntry, install: FlowEntry, container_flow: Option<ContainerFlow>) -> Self {
        Self {
            original,
            install,
            container_flow,
            status: AtomicEntryStatus::new(EntryStatus::Installed),
        }
    }

    #[must_use]
    pub fn original(&self) -> &FlowEntry {
        &self.original
    }
    #[must_use]
    pub fn install(&self) -> &FlowEntry {
        &self.install
    }
    #[must_use]
    pub fn container_flow(&self) -> Option<&ContainerFlow> {
        self.container_flow.as_ref()
    }
    #[must_use]
    pub fn node(&self) -> &Node {
        &self.install.node
    }
    #[must_use]
    pub fn group(&self) -> Option<&str> {
        self.install.group.as_deref()
    }
    #[must_use]
    pub fn name(&self) -> &str {
        &self.install.name
    }
    /// The flow as programmed in the node
    #[must_use]
    pub fn flow(&self) -> &Flow {
        &self.install.flow
    }

    #[must_use]
    pub fn status(&self) -> EntryStatus {
        self.status.load(Ordering::Acquire)
    }

    /// Mark the entry for deletion. Fails if the entry is already being deleted.
    pub fn begin_delete(&self) -> Result<(), EntryStatus> {
        self.status
            .compare_exchange(
                EntryStatus::Installed,
                EntryStatus::PendingDelete,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
    }

    /// Undo [`InstalledEntry::begin_delete`] after a failed removal
    pub fn abort_delete(&self) {
        self.status.store(EntryStatus::Installed, Ordering::Release);
    }

    /// Tell if the install flow collides with `other` in the node flow table
    #[must_use]
    pub fn collides_with(&self, other: &InstalledEntry) -> bool {
        self.install.same_match_and_priority(&other.install)
    }
}

impl PartialEq for InstalledEntry {
    fn eq(&self, other: &Self) -> bool {
        self.original == other.original && self.install == other.install
    }
}
impl Eq for InstalledEntry {}

impl Hash for InstalledEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.original.hash(state);
        self.install.hash(state);
    }
}
