use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::ErrorCode;

/// One device discovered on the path to a target. Only responding devices become hops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop {
    pub ttl: u8,
    pub responder: IpAddr,
    pub is_gateway: bool,
    pub is_destination: bool,
}

impl Hop {
    /// The default-route gateway is always hop 1, and is never probed.
    pub fn gateway(responder: IpAddr) -> Self {
        Self {
            ttl: 1,
            responder,
            is_gateway: true,
            is_destination: false,
        }
    }

    pub fn probed(ttl: u8, responder: IpAddr, is_destination: bool) -> Self {
        Self {
            ttl,
            responder,
            is_gateway: false,
            is_destination,
        }
    }

    pub fn label(&self) -> HopLabel {
        if self.is_gateway {
            HopLabel::Gateway
        } else {
            HopLabel::Hop
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HopLabel {
    Gateway,
    Hop,
}

/// Everything a single traceroute run reports, in delivery order. A run's stream ends with
/// exactly one of [TraceEvent::EndOfStream], [TraceEvent::Error], or [TraceEvent::Cancelled].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TraceEvent {
    Hop {
        ttl: u8,
        label: HopLabel,
        address: IpAddr,
    },
    DestinationReached,
    EndOfStream,
    Error {
        code: ErrorCode,
        message: String,
    },
    Cancelled,
}

impl TraceEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TraceEvent::EndOfStream | TraceEvent::Error { .. } | TraceEvent::Cancelled
        )
    }
}

impl From<&Hop> for TraceEvent {
    fn from(hop: &Hop) -> Self {
        TraceEvent::Hop {
            ttl: hop.ttl,
            label: hop.label(),
            address: hop.responder,
        }
    }
}
