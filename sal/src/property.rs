// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Properties describing nodes and node connectors.

use mac_address::MacAddress;
use std::fmt::Display;

pub const CONFIG_ADMIN_DOWN: u16 = 0;
pub const CONFIG_ADMIN_UP: u16 = 1;
pub const STATE_EDGE_DOWN: u16 = 0;
pub const STATE_EDGE_UP: u16 = 1;
pub const STATE_EDGE_UNKNOWN: u16 = 0x99;

/// A property of a network element. The set of properties is closed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Property {
    Name(String),
    Description(String),
    /// bits per second
    Bandwidth(u64),
    /// picoseconds
    Latency(u64),
    Config(u16),
    State(u16),
    Tier(u32),
    Tables(u8),
    Buffers(u32),
    Capabilities(u32),
    Actions(u32),
    MacAddress(MacAddress),
    /// milliseconds since the epoch, with the name of the event stamped
    TimeStamp { value: u64, name: String },
}

impl Property {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Property::Name(_) => "name",
            Property::Description(_) => "description",
            Property::Bandwidth(_) => "bandwidth",
            Property::Latency(_) => "latency",
            Property::Config(_) => "config",
            Property::State(_) => "state",
            Property::Tier(_) => "tier",
            Property::Tables(_) => "tables",
            Property::Buffers(_) => "buffers",
            Property::Capabilities(_) => "capabilities",
            Property::Actions(_) => "actions",
            Property::MacAddress(_) => "macAddress",
            Property::TimeStamp { .. } => "timeStamp",
        }
    }

    /// Human readable rendition of the value
    #[must_use]
    pub fn string_value(&self) -> String {
        match self {
            Property::Name(s) | Property::Description(s) => s.clone(),
            Property::Bandwidth(bps) => scaled(*bps, "bps"),
            Property::Latency(ps) => format!("{ps}psec"),
            Property::Config(CONFIG_ADMIN_UP) => "UP".to_owned(),
            Property::Config(_) => "DOWN".to_owned(),
            Property::State(STATE_EDGE_UP) => "EDGE_UP".to_owned(),
            Property::State(STATE_EDGE_DOWN) => "EDGE_DOWN".to_owned(),
            Property::State(_) => "EDGE_UNKNOWN".to_owned(),
            Property::Tier(v) | Property::Buffers(v) => v.to_string(),
            Property::Capabilities(v) | Property::Actions(v) => format!("{v:#x}"),
            Property::Tables(v) => v.to_string(),
            Property::MacAddress(mac) => mac.to_string(),
            Property::TimeStamp { value, name } => format!("{name}: {value}"),
        }
    }
}

fn scaled(value: u64, unit: &str) -> String {
    const PREFIXES: [(u64, &str); 4] = [
        (1_000_000_000_000, "T"),
        (1_000_000_000, "G"),
        (1_000_000, "M"),
        (1_000, "K"),
    ];
    if value == 0 {
        return "UnKnown".to_owned();
    }
    PREFIXES
        .iter()
        .find(|(factor, _)| value >= *factor && value % factor == 0)
        .map_or_else(
            || format!("{value}{unit}"),
            |(factor, prefix)| format!("{}{prefix}{unit}", value / factor),
        )
}

impl Display for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.name(), self.string_value())
    }
}
