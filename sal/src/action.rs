// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow actions

use crate::errors::SalError;
use crate::node::{Node, NodeConnector};
use crate::registry::IdTypeRegistry;
use mac_address::MacAddress;
use std::fmt::Display;
use std::net::IpAddr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Drop,
    Output(NodeConnector),
    Controller,
    Flood,
    FloodAll,
    SetDlSrc(MacAddress),
    SetDlDst(MacAddress),
    SetVlanId(u16),
    SetVlanPcp(u8),
    PopVlan,
    SetNwSrc(IpAddr),
    SetNwDst(IpAddr),
    SetNwTos(u8),
    SetTpSrc(u16),
    SetTpDst(u16),
}

const MAX_VLAN_ID: u16 = 4095;
const MAX_VLAN_PCP: u8 = 7;
const MAX_NW_TOS: u8 = 63;

impl Action {
    /// Parse an action such as `OUTPUT=2`, `DROP` or `SET_VLAN_ID=10`. Output ports may be
    /// given relative to `node`.
    pub fn parse(registry: &IdTypeRegistry, node: &Node, input: &str) -> Result<Self, SalError> {
        let bad = || SalError::InvalidAction(input.to_owned());
        let (name, value) = match input.trim().split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.trim())),
            None => (input.trim(), None),
        };
        let name = name.to_ascii_uppercase();
        let action = match (name.as_str(), value) {
            ("DROP", None) => Action::Drop,
            ("CONTROLLER", None) => Action::Controller,
            ("FLOOD", None) => Action::Flood,
            ("FLOOD_ALL", None) => Action::FloodAll,
            ("POP_VLAN", None) => Action::PopVlan,
            ("OUTPUT", Some(v)) => Action::Output(NodeConnector::parse_on(registry, node, v)?),
            ("SET_DL_SRC", Some(v)) => Action::SetDlSrc(v.parse().map_err(|_| bad())?),
            ("SET_DL_DST", Some(v)) => Action::SetDlDst(v.parse().map_err(|_| bad())?),
            ("SET_VLAN_ID", Some(v)) => Action::SetVlanId(v.parse().map_err(|_| bad())?),
            ("SET_VLAN_PCP", Some(v)) => Action::SetVlanPcp(v.parse().map_err(|_| bad())?),
            ("SET_NW_SRC", Some(v)) => Action::SetNwSrc(v.parse().map_err(|_| bad())?),
            ("SET_NW_DST", Some(v)) => Action::SetNwDst(v.parse().map_err(|_| bad())?),
            ("SET_NW_TOS", Some(v)) => Action::SetNwTos(v.parse().map_err(|_| bad())?),
            ("SET_TP_SRC", Some(v)) => Action::SetTpSrc(v.parse().map_err(|_| bad())?),
            ("SET_TP_DST", Some(v)) => Action::SetTpDst(v.parse().map_err(|_| bad())?),
            _ => return Err(bad()),
        };
        action.validate()?;
        Ok(action)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), SalError> {
        let valid = match self {
            Action::SetVlanId(vid) => (1..=MAX_VLAN_ID).contains(vid),
            Action::SetVlanPcp(pcp) => *pcp <= MAX_VLAN_PCP,
            Action::SetNwTos(tos) => *tos <= MAX_NW_TOS,
            _ => true,
        };
        if valid {
            Ok(())
        } else {
            Err(SalError::InvalidAction(self.to_string()))
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Drop => write!(f, "DROP"),
            Action::Output(port) => write!(f, "OUTPUT={port}"),
            Action::Controller => write!(f, "CONTROLLER"),
            Action::Flood => write!(f, "FLOOD"),
            Action::FloodAll => write!(f, "FLOOD_ALL"),
            Action::SetDlSrc(mac) => write!(f, "SET_DL_SRC={mac}"),
            Action::SetDlDst(mac) => write!(f, "SET_DL_DST={mac}"),
            Action::SetVlanId(vid) => write!(f, "SET_VLAN_ID={vid}"),
            Action::SetVlanPcp(pcp) => write!(f, "SET_VLAN_PCP={pcp}"),
            Action::PopVlan => write!(f, "POP_VLAN"),
            Action::SetNwSrc(a) => write!(f, "SET_NW_SRC={a}"),
            Action::SetNwDst(a) => write!(f, "SET_NW_DST={a}"),
            Action::SetNwTos(tos) => write!(f, "SET_NW_TOS={tos}"),
            Action::SetTpSrc(port) => write!(f, "SET_TP_SRC={port}"),
            Action::SetTpDst(port) => write!(f, "SET_TP_DST={port}"),
        }
    }
}
