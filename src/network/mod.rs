//! Network module: address ranges, port specifications and the per-port result model

pub mod ports;
pub mod range;
pub mod services;

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

pub use ports::{PortRange, PortSpec};
pub use range::{AddressRange, Hosts};
pub use services::ServiceDatabase;

/// A single concrete host address drawn from a range
pub type TargetAddress = Ipv4Addr;

/// Port state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    Open,
    Closed,
    Filtered,
    Unknown,
}

impl PortState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortState::Open => "open",
            PortState::Closed => "closed",
            PortState::Filtered => "filtered",
            PortState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PortState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport protocol enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Sctp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Sctp => "sctp",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation of one port on one host, as reported by a prober.
///
/// Rows are produced only by a [`Prober`](crate::core::Prober) and are not
/// modified afterwards; the builder methods consume `self`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortResult {
    pub host: TargetAddress,
    pub port: u16,
    pub protocol: Protocol,
    pub service_name: String,
    pub state: PortState,
    pub product: String,
    pub extra_info: String,
    pub reason: String,
    pub version: String,
}

impl PortResult {
    pub fn new(host: TargetAddress, port: u16, protocol: Protocol, state: PortState) -> Self {
        Self {
            host,
            port,
            protocol,
            service_name: String::new(),
            state,
            product: String::new(),
            extra_info: String::new(),
            reason: String::new(),
            version: String::new(),
        }
    }

    pub fn with_service(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    pub fn with_product(mut self, product: impl Into<String>, version: impl Into<String>) -> Self {
        self.product = product.into();
        self.version = version.into();
        self
    }

    pub fn with_extra_info(mut self, extra_info: impl Into<String>) -> Self {
        self.extra_info = extra_info.into();
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}
