// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Container mode.
//!
//! When the first non-default container is created, the default container gives up the
//! network: every installed request is archived and its entries removed. When the last
//! non-default container goes away the archived requests are installed again. Requests
//! are refused in between. Internal requests, generated by the controller, are neither
//! archived nor refused.

use crate::engine::FlowEngine;
use crate::flowentry::FlowEntry;
use crate::install::InstalledEntry;
use ordermap::OrderSet;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Container,
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Normal => write!(f, "normal"),
            Mode::Container => write!(f, "container"),
        }
    }
}

#[derive(Debug)]
struct ModeState {
    mode: Mode,
    archive: Vec<FlowEntry>,
}

/// Serializes mode transitions and container flow migrations
#[derive(Debug)]
pub struct ContainerModeCoordinator {
    state: Mutex<ModeState>,
    container_mode: AtomicBool,
}

impl Default for ContainerModeCoordinator {
    fn default() -> Self {
        Self::new(Mode::Normal)
    }
}

/// The distinct original requests of `entries`, in order
fn originals<'a>(entries: impl IntoIterator<Item = &'a Arc<InstalledEntry>>) -> Vec<FlowEntry> {
    entries
        .into_iter()
        .map(|e| e.original().clone())
        .collect::<OrderSet<_>>()
        .into_iter()
        .collect()
}

impl ContainerModeCoordinator {
    #[must_use]
    pub fn new(mode: Mode) -> Self {
        Self {
            state: Mutex::new(ModeState {
                mode,
                archive: Vec::new(),
            }),
            container_mode: AtomicBool::new(mode == Mode::Container),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ModeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.lock().mode
    }

    /// Lock-free check used to gate requests
    #[must_use]
    pub fn in_container_mode(&self) -> bool {
        self.container_mode.load(Ordering::Acquire)
    }

    /// The requests to reinstall when leaving container mode
    #[must_use]
    pub fn archived(&self) -> Vec<FlowEntry> {
        self.lock().archive.clone()
    }

    /// Drop `request` from the archive so that it is not reinstalled. Returns false if it
    /// was not archived.
    pub fn forget(&self, request: &FlowEntry) -> bool {
        let mut state = self.lock();
        let before = state.archive.len();
        state.archive.retain(|archived| archived != request);
        before != state.archive.len()
    }

    /// Drop every archived request of `group`, returning how many were dropped
    pub fn forget_group(&self, group: &str) -> usize {
        let mut state = self.lock();
        let before = state.archive.len();
        state
            .archive
            .retain(|archived| archived.group.as_deref() != Some(group));
        before - state.archive.len()
    }

    /// Archive and uninstall every non-internal request. Returns false if already in
    /// container mode.
    pub fn enter_container_mode(&self, engine: &FlowEngine) -> bool {
        let mut state = self.lock();
        if state.mode == Mode::Container {
            debug!("Already in container mode");
            return false;
        }
        self.container_mode.store(true, Ordering::Release);
        // controller generated flows are kept
        let entries: Vec<_> = engine
            .database()
            .all_entries()
            .into_iter()
            .filter(|e| !e.original().is_internal())
            .collect();
        state.archive = originals(&entries);
        info!(
            "Entering container mode: uninstalling {} non-internal entries of {} requests",
            entries.len(),
            state.archive.len()
        );
        let report = engine.remove_internal(entries);
        for failure in report.outcomes().iter().filter(|o| !o.outcome.is_success()) {
            warn!("Could not uninstall {}: {}", failure.entry, failure.outcome);
        }
        state.mode = Mode::Container;
        true
    }

    /// Reinstall the archived requests. The archive is cleared whatever the outcome.
    /// Returns false if not in container mode.
    pub fn leave_container_mode(&self, engine: &FlowEngine) -> bool {
        let mut state = self.lock();
        if state.mode == Mode::Normal {
            debug!("Not in container mode");
            return false;
        }
        let archive = std::mem::take(&mut state.archive);
        info!("Leaving container mode: reinstalling {} requests", archive.len());
        for request in &archive {
            if let Err(e) = engine.add(request) {
                warn!("Could not reinstall {request}: {e}");
            }
        }
        state.mode = Mode::Normal;
        self.container_mode.store(false, Ordering::Release);
        true
    }

    /// Re-derive every installed request against the current container flows
    pub fn on_container_flow_set_changed(&self, engine: &FlowEngine) {
        let _state = self.lock();
        let nodes = engine.database().nodes();
        info!("Container flows changed: migrating entries of {} nodes", nodes.len());
        for node in nodes {
            let entries = engine.database().node_entries(&node);
            let requests = originals(&entries);
            debug!(
                "Node {node}: reinstalling {} requests ({} entries)",
                requests.len(),
                entries.len()
            );
            let report = engine.remove_internal(entries);
            for failure in report.outcomes().iter().filter(|o| !o.outcome.is_success()) {
                warn!("Could not uninstall {}: {}", failure.entry, failure.outcome);
            }
            for request in &requests {
                if let Err(e) = engine.add(request) {
                    warn!("Could not reinstall {request}: {e}");
                }
            }
        }
    }
}
