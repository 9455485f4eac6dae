// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Registry of tracing targets and runtime control of their log levels.
//!
//! Crates declare the targets they log to with [`trace_target!`] (the module path of the
//! caller) or [`custom_target!`] (an arbitrary string). Declarations are collected at link
//! time, so [`get_trace_ctl`] sees every target of every linked crate without explicit
//! registration calls.

pub mod control;
pub mod display;
pub mod targets;

// re-exports
pub use control::{TraceCtlError, TracingControl, get_trace_ctl};
pub use tracing_subscriber::filter::LevelFilter;
