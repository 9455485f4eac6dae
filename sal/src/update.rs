// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::fmt::Display;

/// Kind of change carried by a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateType {
    Added,
    Removed,
    Changed,
}

impl Display for UpdateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateType::Added => write!(f, "added"),
            UpdateType::Removed => write!(f, "removed"),
            UpdateType::Changed => write!(f, "changed"),
        }
    }
}
