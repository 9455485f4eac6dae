// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic)]

mod args;
mod scenario;

use crate::args::{CmdArgs, Parser};
use crate::scenario::{Runner, Scenario};
use std::process::ExitCode;
use tracectl::{get_trace_ctl, trace_target};
use tracing::{error, info};

trace_target!("frmctl", LevelFilter::INFO, &[]);

fn main() -> ExitCode {
    let args = CmdArgs::parse();
    let tctl = get_trace_ctl();
    if let Some(tracing) = args.tracing()
        && let Err(e) = tctl.setup_from_string(tracing)
    {
        error!("Invalid tracing configuration: {e}");
        return ExitCode::FAILURE;
    }
    if args.show_tracing_tags() {
        println!("{}", tctl.dump_by_tag());
        return ExitCode::SUCCESS;
    }
    if args.show_tracing_targets() {
        println!("{}", tctl.dump());
        return ExitCode::SUCCESS;
    }

    let Some(path) = args.scenario() else {
        error!("No scenario given. See --help");
        return ExitCode::FAILURE;
    };
    let scenario = match Scenario::load(path) {
        Ok(scenario) => scenario,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let runner = match Runner::new(scenario.params().clone(), args.verbose()) {
        Ok(runner) => runner,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    info!("Running {} steps from {}", scenario.steps().len(), path.display());
    match runner.run(scenario.steps()) {
        Ok(failures) => {
            println!("{}", runner.manager());
            println!(
                "{} flows programmed in simulated nodes, {failures} steps failed",
                runner.programmer().table_size()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Scenario aborted: {e}");
            println!("{}", runner.manager());
            ExitCode::FAILURE
        }
    }
}
