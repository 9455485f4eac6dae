// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-candidate results of an operation.

use crate::flowentry::FlowEntry;
use sal::ProgrammerError;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// colliding with an installed entry
    Conflict,
    /// nothing to remove
    Absent,
    /// nothing to change
    Unchanged,
    /// the node went away
    NodeGone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Installed,
    Removed,
    Modified,
    Skipped(SkipReason),
    Failed(ProgrammerError),
    RolledBack,
}

impl Outcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Outcome::Installed | Outcome::Removed | Outcome::Modified
        )
    }
}

/// The outcome for one install entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateOutcome {
    pub entry: FlowEntry,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    outcomes: Vec<CandidateOutcome>,
}

impl Report {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: &FlowEntry, outcome: Outcome) {
        self.outcomes.push(CandidateOutcome {
            entry: entry.clone(),
            outcome,
        });
    }

    pub fn merge(&mut self, other: Report) {
        self.outcomes.extend(other.outcomes);
    }

    #[must_use]
    pub fn outcomes(&self) -> &[CandidateOutcome] {
        &self.outcomes
    }

    #[must_use]
    pub fn count(&self, f: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| f(&o.outcome)).count()
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.count(Outcome::is_success)
    }

    /// The last programmer error recorded
    #[must_use]
    pub fn last_error(&self) -> Option<&ProgrammerError> {
        self.outcomes.iter().rev().find_map(|o| match &o.outcome {
            Outcome::Failed(e) => Some(e),
            _ => None,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Installed => write!(f, "installed"),
            Outcome::Removed => write!(f, "removed"),
            Outcome::Modified => write!(f, "modified"),
            Outcome::Skipped(reason) => write!(f, "skipped ({reason:?})"),
            Outcome::Failed(e) => write!(f, "failed: {e}"),
            Outcome::RolledBack => write!(f, "rolled back"),
        }
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for o in &self.outcomes {
            writeln!(f, "  {} -> {}", o.entry, o.outcome)?;
        }
        Ok(())
    }
}
