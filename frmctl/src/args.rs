// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::path::{Path, PathBuf};

pub(crate) use clap::Parser;
#[derive(Parser)]
#[command(name = "frmctl")]
#[command(version = "0.1")]
#[command(about = "Run forwarding rules manager scenarios against simulated nodes", long_about = None)]
pub(crate) struct CmdArgs {
    #[arg(long, value_name = "YAML scenario to run")]
    scenario: Option<PathBuf>,
    #[arg(long, value_name = "tracing config, e.g. default=info,frm-engine=debug")]
    tracing: Option<String>,
    #[arg(long, help = "show the tracing targets and exit")]
    show_tracing_targets: bool,
    #[arg(long, help = "show the tracing targets by tag and exit")]
    show_tracing_tags: bool,
    #[arg(long, help = "print the manager state after every step")]
    verbose: bool,
}

impl CmdArgs {
    pub fn scenario(&self) -> Option<&Path> {
        self.scenario.as_deref()
    }
    pub fn tracing(&self) -> Option<&str> {
        self.tracing.as_deref()
    }
    pub fn show_tracing_targets(&self) -> bool {
        self.show_tracing_targets
    }
    pub fn show_tracing_tags(&self) -> bool {
        self.show_tracing_tags
    }
    pub fn verbose(&self) -> bool {
        self.verbose
    }
}
