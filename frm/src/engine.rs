// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Reconciliation engine.
//!
//! A flow entry request fans out into one install entry per container flow allowing it.
//! Every install entry is programmed independently: operations succeed as soon as one
//! install entry does, and report the outcome of each one.

use crate::container::{Container, conflicts_with_container_flows, derive_install_entries};
use crate::database::{FlowDatabase, MatchKey};
use crate::errors::{ConflictKind, FrmError};
use crate::flowentry::FlowEntry;
use crate::install::InstalledEntry;
use crate::report::{Outcome, Report, SkipReason};
use sal::FlowProgrammer;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, trace, warn};

use tracectl::trace_target;
trace_target!("frm-engine", LevelFilter::INFO, &["frm"]);

pub struct FlowEngine {
    programmer: Arc<dyn FlowProgrammer>,
    container: Arc<dyn Container>,
    db: RwLock<FlowDatabase>,
}

impl FlowEngine {
    #[must_use]
    pub fn new(programmer: Arc<dyn FlowProgrammer>, container: Arc<dyn Container>) -> Self {
        Self {
            programmer,
            container,
            db: RwLock::new(FlowDatabase::new()),
        }
    }

    #[must_use]
    pub fn container(&self) -> &Arc<dyn Container> {
        &self.container
    }

    /// Read access to the software view of installed entries
    pub fn database(&self) -> RwLockReadGuard<'_, FlowDatabase> {
        self.db.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn database_mut(&self) -> RwLockWriteGuard<'_, FlowDatabase> {
        self.db.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// The entries to install for `request` under the current container flows
    #[must_use]
    pub fn derive(&self, request: &FlowEntry) -> Vec<InstalledEntry> {
        derive_install_entries(request, &self.container.container_flows())
    }

    /// Tell if container flows are active and none of them allows `request`
    #[must_use]
    pub fn check_flow_entry_conflict(&self, request: &FlowEntry) -> bool {
        conflicts_with_container_flows(request, &self.container.container_flows())
    }

    /// Find an installed entry on the node of `entry` with the same match and priority.
    /// See [`FlowDatabase::find_match`].
    #[must_use]
    pub fn find_match(&self, entry: &FlowEntry, loose: bool) -> Option<Arc<InstalledEntry>> {
        self.database().find_match(entry, loose)
    }

    /// Install a flow entry request.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` if the request has no name
    /// * `Conflict` if no container flow allows the request or if every install entry
    ///   collides with an installed entry
    /// * `Hardware` if no install entry could be programmed
    pub fn add(&self, request: &FlowEntry) -> Result<Report, FrmError> {
        if request.name.is_empty() {
            return Err(FrmError::InvalidArgument(format!(
                "flow entry without a name on node {}",
                request.node
            )));
        }
        let candidates = self.derive(request);
        if candidates.is_empty() {
            warn!("No container flow allows {request}");
            return Err(FrmError::Conflict(ConflictKind::NoContainerFlowMatch));
        }
        let attempted = candidates.len();
        let report = self.add_internal(candidates);
        Self::add_result(report, attempted)
    }

    fn add_result(report: Report, attempted: usize) -> Result<Report, FrmError> {
        if report.succeeded() > 0 {
            return Ok(report);
        }
        if report.count(|o| *o == Outcome::Skipped(SkipReason::Conflict)) == attempted {
            return Err(FrmError::Conflict(ConflictKind::DuplicateMatch));
        }
        match report.last_error() {
            Some(e) => Err(FrmError::Hardware(e.clone())),
            None => Ok(report),
        }
    }

    /// Install entries that do not collide with installed ones. The collision check
    /// reserves the match of each surviving entry so that concurrent adds of the same
    /// match cannot both go through.
    pub(crate) fn add_internal(&self, candidates: Vec<InstalledEntry>) -> Report {
        let mut report = Report::new();
        let mut reserved = Vec::with_capacity(candidates.len());
        {
            let mut db = self.database_mut();
            for candidate in candidates {
                let key = MatchKey::of(candidate.install());
                if db.find_collision(&candidate, None).is_some()
                    || !db.reserve(candidate.node(), key.clone())
                {
                    warn!(
                        "Conflict: {} collides with an installed entry",
                        candidate.install()
                    );
                    report.push(candidate.install(), Outcome::Skipped(SkipReason::Conflict));
                    continue;
                }
                reserved.push((candidate, key));
            }
        }
        for (candidate, key) in reserved {
            debug!("Installing {}", candidate.install());
            let result = self
                .programmer
                .add_flow(candidate.node(), candidate.flow());
            let mut db = self.database_mut();
            // a node purge while programming drops the reservation with the node
            let purged = !db.is_reserved(candidate.node(), &key);
            db.release(candidate.node(), &key);
            match result {
                Ok(()) if purged => {
                    info!(
                        "Node {} went away while installing {}",
                        candidate.node(),
                        candidate.install()
                    );
                    report.push(candidate.install(), Outcome::Skipped(SkipReason::NodeGone));
                }
                Ok(()) => {
                    report.push(candidate.install(), Outcome::Installed);
                    db.insert(Arc::new(candidate));
                }
                Err(e) => {
                    warn!("Failed to install {}: {e}", candidate.install());
                    report.push(candidate.install(), Outcome::Failed(e));
                }
            }
        }
        report
    }

    /// Uninstall a flow entry request. Removing a request that is not installed succeeds.
    ///
    /// # Errors
    ///
    /// `Hardware` if nothing was removed and some removal failed.
    pub fn remove(&self, request: &FlowEntry) -> Result<Report, FrmError> {
        let present: Vec<_> = {
            let db = self.database();
            if db.node_entries(&request.node).is_empty() {
                debug!("Nothing installed on {}, nothing to remove", request.node);
                return Ok(Report::new());
            }
            self.derive(request)
                .into_iter()
                .map(|candidate| db.get(&candidate).ok_or(candidate))
                .collect()
        };
        let mut report = Report::new();
        let mut installed = Vec::with_capacity(present.len());
        for lookup in present {
            match lookup {
                Ok(entry) => installed.push(entry),
                Err(absent) => {
                    trace!("{} is not installed", absent.install());
                    report.push(absent.install(), Outcome::Skipped(SkipReason::Absent));
                }
            }
        }
        report.merge(self.remove_internal(installed));
        if report.succeeded() == 0
            && let Some(e) = report.last_error()
        {
            return Err(FrmError::Hardware(e.clone()));
        }
        Ok(report)
    }

    /// Remove installed entries from the nodes and from the database, without looking at
    /// the container flows.
    pub(crate) fn remove_internal(&self, entries: Vec<Arc<InstalledEntry>>) -> Report {
        let mut report = Report::new();
        for entry in entries {
            if entry.begin_delete().is_err() {
                trace!("{} is already being removed", entry.install());
                report.push(entry.install(), Outcome::Skipped(SkipReason::Absent));
                continue;
            }
            debug!("Removing {}", entry.install());
            match self.programmer.remove_flow(entry.node(), entry.flow()) {
                Ok(()) => {
                    self.database_mut().remove(&entry);
                    report.push(entry.install(), Outcome::Removed);
                }
                Err(e) => {
                    entry.abort_delete();
                    warn!("Failed to remove {}: {e}", entry.install());
                    report.push(entry.install(), Outcome::Failed(e));
                }
            }
        }
        report
    }

    /// Replace flow entry request `current` with `new`.
    ///
    /// When both requests fan out into the same number of install entries and none of
    /// the new ones collides with a foreign entry, install entries are modified in place,
    /// pairwise. A failure rolls back the pairs already modified. Otherwise the current
    /// entries are removed and the new ones installed.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` if the requests are for different nodes or names
    /// * `Conflict` if `new` collides with another request or no container flow allows it
    /// * `Hardware` if the nodes refused the change
    /// * `Internal` if a failed change could not be rolled back
    pub fn modify(&self, current: &FlowEntry, new: &FlowEntry) -> Result<Report, FrmError> {
        if current.node != new.node || current.name != new.name {
            return Err(FrmError::InvalidArgument(format!(
                "cannot modify {current} into {new}: node and name must not change"
            )));
        }
        if current == new {
            debug!("No modification needed for {current}");
            let mut report = Report::new();
            report.push(current, Outcome::Skipped(SkipReason::Unchanged));
            return Ok(report);
        }
        let conflicting = self
            .database()
            .node_entries(&new.node)
            .iter()
            .any(|e| e.original() != current && e.original().same_match_and_priority(new));
        if conflicting {
            warn!("Conflict: {new} has the match and priority of another request");
            return Err(FrmError::Conflict(ConflictKind::DuplicateMatch));
        }

        let container_flows = self.container.container_flows();
        let current_set = derive_install_entries(current, &container_flows);
        let new_set = derive_install_entries(new, &container_flows);
        if new_set.is_empty() && !container_flows.is_empty() {
            warn!("No container flow allows {new}");
            return Err(FrmError::Conflict(ConflictKind::NoContainerFlowMatch));
        }

        let pairs = {
            let db = self.database();
            let installed: Option<Vec<_>> = current_set.iter().map(|c| db.get(c)).collect();
            let collision = new_set
                .iter()
                .any(|n| db.find_collision(n, Some(current)).is_some());
            match installed {
                Some(installed) if installed.len() == new_set.len() && !collision => {
                    Ok(installed.into_iter().zip(new_set).collect::<Vec<_>>())
                }
                _ => {
                    let present: Vec<_> = current_set.iter().filter_map(|c| db.get(c)).collect();
                    Err((present, new_set))
                }
            }
        };
        match pairs {
            Ok(pairs) => self.modify_internal(pairs),
            Err((present, new_set)) => {
                info!("Modifying {current} by removing and re-adding it");
                self.decouple(present, new_set)
            }
        }
    }

    fn decouple(
        &self,
        current: Vec<Arc<InstalledEntry>>,
        new: Vec<InstalledEntry>,
    ) -> Result<Report, FrmError> {
        let mut report = self.remove_internal(current);
        let attempted = new.len();
        let added = self.add_internal(new);
        let installed = added.count(|o| *o == Outcome::Installed);
        let conflicts = added.count(|o| *o == Outcome::Skipped(SkipReason::Conflict));
        let last_error = added.last_error().cloned();
        report.merge(added);
        if installed > 0 || attempted == 0 {
            return Ok(report);
        }
        if conflicts == attempted {
            return Err(FrmError::Conflict(ConflictKind::DuplicateMatch));
        }
        match last_error {
            Some(e) => Err(FrmError::Hardware(e)),
            None => Ok(report),
        }
    }

    /// Modify install entries pairwise, rolling back on failure
    pub(crate) fn modify_internal(
        &self,
        pairs: Vec<(Arc<InstalledEntry>, InstalledEntry)>,
    ) -> Result<Report, FrmError> {
        let mut report = Report::new();
        let mut done: Vec<(Arc<InstalledEntry>, Arc<InstalledEntry>)> = Vec::new();
        for (old, new) in pairs {
            debug!("Modifying {} into {}", old.install(), new.install());
            match self.programmer.modify_flow(old.node(), old.flow(), new.flow()) {
                Ok(()) => {
                    let new = Arc::new(new);
                    self.database_mut().replace(&old, new.clone());
                    report.push(new.install(), Outcome::Modified);
                    done.push((old, new));
                }
                Err(e) => {
                    warn!("Failed to modify {}: {e}", old.install());
                    report.push(new.install(), Outcome::Failed(e.clone()));
                    self.rollback(done, &mut report)?;
                    return Err(FrmError::Hardware(e));
                }
            }
        }
        Ok(report)
    }

    /// Undo pairwise modifications, most recent first
    fn rollback(
        &self,
        done: Vec<(Arc<InstalledEntry>, Arc<InstalledEntry>)>,
        report: &mut Report,
    ) -> Result<(), FrmError> {
        for (old, new) in done.into_iter().rev() {
            match self.programmer.modify_flow(new.node(), new.flow(), old.flow()) {
                Ok(()) => {
                    self.database_mut().replace(&new, old.clone());
                    report.push(old.install(), Outcome::RolledBack);
                }
                Err(e) => {
                    error!(
                        "Failed to roll back {} into {}: {e}. Software view and node {} may disagree",
                        new.install(),
                        old.install(),
                        old.node()
                    );
                    return Err(FrmError::Internal(format!(
                        "rollback of {} failed: {e}",
                        old.install()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Modify the request installed with the match and priority of `new`, or install
    /// `new` if there is none.
    pub fn modify_or_add(&self, new: &FlowEntry) -> Result<Report, FrmError> {
        match self.find_match(new, true) {
            Some(found) => {
                let current = found.original().clone();
                self.modify(&current, new)
            }
            None => self.add(new),
        }
    }

    /// Forget an entry the node removed on its own
    pub(crate) fn forget_entry(&self, entry: &InstalledEntry) -> Option<Arc<InstalledEntry>> {
        self.database_mut().remove(entry)
    }

    /// Forget every entry of `node` without programming it
    pub(crate) fn purge_node(&self, node: &sal::Node) -> Vec<Arc<InstalledEntry>> {
        let purged = self.database_mut().purge_node(node);
        info!("Dropped {} entries of node {node}", purged.len());
        purged
    }
}
