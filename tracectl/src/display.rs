// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Display implementations

use crate::control::{TargetCfg, TargetDb};
use std::fmt::Display;

macro_rules! TARGET_FMT {
    () => {
        "{:>40} │ {:>16} │ {:>6} │ {}"
    };
}

impl Display for TargetCfg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            format_args!(
                TARGET_FMT!(),
                self.target,
                self.name,
                self.level,
                self.tags.join(",")
            )
        )
    }
}

impl Display for TargetDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, " ──────── tracing targets ────────")?;
        writeln!(
            f,
            "{}",
            format_args!(TARGET_FMT!(), "TARGET", "NAME", "LEVEL", "TAGS")
        )?;
        for cfg in self.targets.values() {
            writeln!(f, "{cfg}")?;
        }
        writeln!(
            f,
            "{}",
            format_args!(TARGET_FMT!(), "(default)", "--", self.default, "--")
        )
    }
}

pub(crate) struct TargetsByTag<'a>(pub(crate) &'a TargetDb);

impl Display for TargetsByTag<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, " ──────── tracing targets by tag ────────")?;
        let db = self.0;
        for (tag, members) in &db.tags {
            writeln!(f, " {tag}:")?;
            for cfg in members.iter().filter_map(|t| db.targets.get(t)) {
                writeln!(f, "   {:<40} : {}", cfg.target, cfg.level)?;
            }
        }
        Ok(())
    }
}
