// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow matches and flows

use crate::action::Action;
use crate::errors::SalError;
use crate::node::{Node, NodeConnector};
use crate::registry::IdTypeRegistry;
use ipnet::IpNet;
use mac_address::MacAddress;
use std::fmt::Display;
use std::net::IpAddr;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;
pub const ETHERTYPE_IPV6: u16 = 0x86dd;
pub const ETHERTYPE_LLDP: u16 = 0x88cc;

pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_SCTP: u8 = 132;

/// A set of header field constraints. A field left unset is a wildcard, so the default
/// [`Match`] matches every packet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Match {
    pub in_port: Option<NodeConnector>,
    pub dl_src: Option<MacAddress>,
    pub dl_dst: Option<MacAddress>,
    pub dl_vlan: Option<u16>,
    pub dl_vlan_pr: Option<u8>,
    pub dl_type: Option<u16>,
    pub nw_tos: Option<u8>,
    pub nw_proto: Option<u8>,
    pub nw_src: Option<IpNet>,
    pub nw_dst: Option<IpNet>,
    pub tp_src: Option<u16>,
    pub tp_dst: Option<u16>,
}

/// Merge a field set on both sides. `None` means the two sides are disjoint.
fn merge_exact<T: Clone + PartialEq>(a: &Option<T>, b: &Option<T>) -> Option<Option<T>> {
    match (a, b) {
        (Some(x), Some(y)) if x != y => None,
        (Some(x), _) | (None, Some(x)) => Some(Some(x.clone())),
        (None, None) => Some(None),
    }
}

/// Prefixes overlap iff one contains the other. The overlap is the narrower one.
fn merge_prefix(a: &Option<IpNet>, b: &Option<IpNet>) -> Option<Option<IpNet>> {
    match (a, b) {
        (Some(x), Some(y)) if x.contains(y) => Some(Some(*y)),
        (Some(x), Some(y)) if y.contains(x) => Some(Some(*x)),
        (Some(_), Some(_)) => None,
        (Some(x), None) | (None, Some(x)) => Some(Some(*x)),
        (None, None) => Some(None),
    }
}

fn parse_u8(field: &str, value: &str) -> Result<u8, SalError> {
    parse_int(value)
        .and_then(|v| u8::try_from(v).ok())
        .ok_or_else(|| SalError::InvalidMatch(format!("{field}={value}")))
}

fn parse_u16(field: &str, value: &str) -> Result<u16, SalError> {
    parse_int(value)
        .and_then(|v| u16::try_from(v).ok())
        .ok_or_else(|| SalError::InvalidMatch(format!("{field}={value}")))
}

/// Decimal, or hexadecimal with a `0x` prefix
fn parse_int(value: &str) -> Option<u64> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// A bare address is a host prefix
fn parse_prefix(field: &str, value: &str) -> Result<IpNet, SalError> {
    let value = value.trim();
    value
        .parse::<IpNet>()
        .map(|net| net.trunc())
        .or_else(|_| value.parse::<IpAddr>().map(IpNet::from))
        .map_err(|_| SalError::InvalidMatch(format!("{field}={value}")))
}

impl Match {
    /// A match with no field set
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_any(&self) -> bool {
        *self == Self::default()
    }

    #[must_use]
    pub fn with_in_port(mut self, port: NodeConnector) -> Self {
        self.in_port = Some(port);
        self
    }
    #[must_use]
    pub fn with_dl_src(mut self, mac: MacAddress) -> Self {
        self.dl_src = Some(mac);
        self
    }
    #[must_use]
    pub fn with_dl_dst(mut self, mac: MacAddress) -> Self {
        self.dl_dst = Some(mac);
        self
    }
    #[must_use]
    pub fn with_dl_vlan(mut self, vlan: u16) -> Self {
        self.dl_vlan = Some(vlan);
        self
    }
    #[must_use]
    pub fn with_dl_vlan_pr(mut self, pcp: u8) -> Self {
        self.dl_vlan_pr = Some(pcp);
        self
    }
    #[must_use]
    pub fn with_dl_type(mut self, ethertype: u16) -> Self {
        self.dl_type = Some(ethertype);
        self
    }
    #[must_use]
    pub fn with_nw_tos(mut self, tos: u8) -> Self {
        self.nw_tos = Some(tos);
        self
    }
    #[must_use]
    pub fn with_nw_proto(mut self, proto: u8) -> Self {
        self.nw_proto = Some(proto);
        self
    }
    /// Host bits of the prefix are cleared
    #[must_use]
    pub fn with_nw_src(mut self, prefix: IpNet) -> Self {
        self.nw_src = Some(prefix.trunc());
        self
    }
    /// Host bits of the prefix are cleared
    #[must_use]
    pub fn with_nw_dst(mut self, prefix: IpNet) -> Self {
        self.nw_dst = Some(prefix.trunc());
        self
    }
    #[must_use]
    pub fn with_tp_src(mut self, port: u16) -> Self {
        self.tp_src = Some(port);
        self
    }
    #[must_use]
    pub fn with_tp_dst(mut self, port: u16) -> Self {
        self.tp_dst = Some(port);
        self
    }

    /// Set the field called `field` from its textual value. Ports are parsed relative to
    /// `node`.
    pub fn with_field(
        self,
        registry: &IdTypeRegistry,
        node: &Node,
        field: &str,
        value: &str,
    ) -> Result<Self, SalError> {
        let bad = || SalError::InvalidMatch(format!("{field}={value}"));
        let m = match field {
            "in_port" => self.with_in_port(
                NodeConnector::parse_on(registry, node, value).map_err(|_| bad())?,
            ),
            "dl_src" => self.with_dl_src(value.trim().parse().map_err(|_| bad())?),
            "dl_dst" => self.with_dl_dst(value.trim().parse().map_err(|_| bad())?),
            "dl_vlan" => self.with_dl_vlan(parse_u16(field, value)?),
            "dl_vlan_pr" => self.with_dl_vlan_pr(parse_u8(field, value)?),
            "dl_type" => self.with_dl_type(parse_u16(field, value)?),
            "nw_tos" => self.with_nw_tos(parse_u8(field, value)?),
            "nw_proto" => self.with_nw_proto(parse_u8(field, value)?),
            "nw_src" => self.with_nw_src(parse_prefix(field, value)?),
            "nw_dst" => self.with_nw_dst(parse_prefix(field, value)?),
            "tp_src" => self.with_tp_src(parse_u16(field, value)?),
            "tp_dst" => self.with_tp_dst(parse_u16(field, value)?),
            _ => return Err(SalError::InvalidMatch(field.to_owned())),
        };
        Ok(m)
    }

    /// Tell if the sets of packets matched by `self` and `other` overlap
    #[must_use]
    pub fn intersects(&self, other: &Match) -> bool {
        self.is_any() || other.is_any() || self.intersection(other).is_some()
    }

    /// The match selecting the packets matched by both `self` and `other`, if any
    #[must_use]
    pub fn intersection(&self, other: &Match) -> Option<Match> {
        Some(Match {
            in_port: merge_exact(&self.in_port, &other.in_port)?,
            dl_src: merge_exact(&self.dl_src, &other.dl_src)?,
            dl_dst: merge_exact(&self.dl_dst, &other.dl_dst)?,
            dl_vlan: merge_exact(&self.dl_vlan, &other.dl_vlan)?,
            dl_vlan_pr: merge_exact(&self.dl_vlan_pr, &other.dl_vlan_pr)?,
            dl_type: merge_exact(&self.dl_type, &other.dl_type)?,
            nw_tos: merge_exact(&self.nw_tos, &other.nw_tos)?,
            nw_proto: merge_exact(&self.nw_proto, &other.nw_proto)?,
            nw_src: merge_prefix(&self.nw_src, &other.nw_src)?,
            nw_dst: merge_prefix(&self.nw_dst, &other.nw_dst)?,
            tp_src: merge_exact(&self.tp_src, &other.tp_src)?,
            tp_dst: merge_exact(&self.tp_dst, &other.tp_dst)?,
        })
    }
}

macro_rules! fmt_field {
    ($f:expr, $sep:ident, $name:literal, $value:expr, $fmt:literal) => {
        if let Some(v) = &$value {
            write!($f, "{}{}=", $sep, $name)?;
            write!($f, $fmt, v)?;
            $sep = ",";
        }
    };
}

impl Display for Match {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_any() {
            return write!(f, "any");
        }
        let mut sep = "";
        fmt_field!(f, sep, "in_port", self.in_port, "{}");
        fmt_field!(f, sep, "dl_src", self.dl_src, "{}");
        fmt_field!(f, sep, "dl_dst", self.dl_dst, "{}");
        fmt_field!(f, sep, "dl_vlan", self.dl_vlan, "{}");
        fmt_field!(f, sep, "dl_vlan_pr", self.dl_vlan_pr, "{}");
        fmt_field!(f, sep, "dl_type", self.dl_type, "{:#06x}");
        fmt_field!(f, sep, "nw_tos", self.nw_tos, "{}");
        fmt_field!(f, sep, "nw_proto", self.nw_proto, "{}");
        fmt_field!(f, sep, "nw_src", self.nw_src, "{}");
        fmt_field!(f, sep, "nw_dst", self.nw_dst, "{}");
        fmt_field!(f, sep, "tp_src", self.tp_src, "{}");
        fmt_field!(f, sep, "tp_dst", self.tp_dst, "{}");
        let _ = sep;
        Ok(())
    }
}

/// A flow: a match, the actions applied to matching packets and the flow attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Flow {
    pub matching: Match,
    pub actions: Vec<Action>,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    /// opaque cookie
    pub id: u64,
}

impl Flow {
    #[must_use]
    pub fn new(matching: Match, actions: Vec<Action>) -> Self {
        Self {
            matching,
            actions,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, idle: u16, hard: u16) -> Self {
        self.idle_timeout = idle;
        self.hard_timeout = hard;
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// The same flow with its match replaced
    #[must_use]
    pub fn with_match(&self, matching: Match) -> Self {
        Self {
            matching,
            ..self.clone()
        }
    }

    /// The output ports of this flow, in action order
    pub fn output_ports(&self) -> impl Iterator<Item = &NodeConnector> {
        self.actions.iter().filter_map(|a| match a {
            Action::Output(port) => Some(port),
            _ => None,
        })
    }

    /// Tell if the flow matches on `port` or sends packets to it
    #[must_use]
    pub fn uses_port(&self, port: &NodeConnector) -> bool {
        self.matching.in_port.as_ref() == Some(port) || self.output_ports().any(|p| p == port)
    }
}

impl Display for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "match[{}] actions[", self.matching)?;
        for (n, action) in self.actions.iter().enumerate() {
            if n > 0 {
                write!(f, ",")?;
            }
            write!(f, "{action}")?;
        }
        write!(f, "] prio:{}", self.priority)?;
        if self.idle_timeout != 0 || self.hard_timeout != 0 {
            write!(f, " idle:{} hard:{}", self.idle_timeout, self.hard_timeout)?;
        }
        Ok(())
    }
}
