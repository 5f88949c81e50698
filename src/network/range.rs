//! CIDR host enumeration
//!
//! A range is parsed once into its network address and prefix; every usable
//! host is then addressed by its offset from the first host, so enumeration
//! carries no mutable cursor and can be restarted or indexed at will.

use ipnetwork::Ipv4Network;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::ScanError;
use crate::network::TargetAddress;

/// An IPv4 network block: base address plus prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange {
    network: Ipv4Network,
}

impl AddressRange {
    /// Build a range from an address and prefix. Host bits of `addr` are ignored.
    pub fn new(addr: Ipv4Addr, prefix: u8) -> crate::Result<Self> {
        let network = Ipv4Network::new(addr, prefix)?;
        Ok(Self { network })
    }

    /// Parse `a.b.c.d/p` notation.
    pub fn parse(spec: &str) -> crate::Result<Self> {
        let spec = spec.trim();
        let Some((addr_str, prefix_str)) = spec.split_once('/') else {
            return Err(ScanError::InvalidRange(format!(
                "expected CIDR notation like 192.168.1.0/24, got '{}'",
                spec
            )));
        };

        let addr: Ipv4Addr = addr_str
            .parse()
            .map_err(|_| ScanError::InvalidRange(format!("invalid IPv4 address '{}'", addr_str)))?;

        let prefix: u8 = prefix_str
            .parse()
            .map_err(|_| ScanError::InvalidRange(format!("invalid prefix '{}'", prefix_str)))?;

        if prefix > 32 {
            return Err(ScanError::InvalidRange(format!(
                "prefix length must be <= 32, got {}",
                prefix
            )));
        }

        Self::new(addr, prefix)
    }

    pub fn prefix(&self) -> u8 {
        self.network.prefix()
    }

    /// Range start with all host bits cleared
    pub fn network_address(&self) -> Ipv4Addr {
        self.network.network()
    }

    /// Range start with all host bits set
    pub fn broadcast_address(&self) -> Ipv4Addr {
        self.network.broadcast()
    }

    /// Number of usable hosts: 2^(32 - prefix) - 2, or 0 when nothing is left.
    pub fn host_count(&self) -> u64 {
        let block = 1u64 << (32 - u32::from(self.prefix()));
        block.saturating_sub(2)
    }

    /// The usable host at `offset`, counting from the first address after the
    /// network address.
    pub fn host_at(&self, offset: u64) -> Option<TargetAddress> {
        if offset >= self.host_count() {
            return None;
        }
        let base = u64::from(u32::from(self.network_address()));
        // host_count() < 2^32 - 1, so base + 1 + offset never leaves the block
        Some(Ipv4Addr::from((base + 1 + offset) as u32))
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.network.contains(addr)
    }

    /// Lazily enumerate all usable hosts in ascending order.
    pub fn hosts(&self) -> Hosts {
        Hosts {
            range: *self,
            next: 0,
            end: self.host_count(),
        }
    }
}

impl FromStr for AddressRange {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network_address(), self.prefix())
    }
}

impl IntoIterator for &AddressRange {
    type Item = TargetAddress;
    type IntoIter = Hosts;

    fn into_iter(self) -> Hosts {
        self.hosts()
    }
}

/// Iterator over the usable hosts of an [`AddressRange`]
#[derive(Debug, Clone)]
pub struct Hosts {
    range: AddressRange,
    next: u64,
    end: u64,
}

impl Iterator for Hosts {
    type Item = TargetAddress;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let host = self.range.host_at(self.next);
        self.next += 1;
        host
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.end - self.next).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl DoubleEndedIterator for Hosts {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        self.end -= 1;
        self.range.host_at(self.end)
    }
}

impl ExactSizeIterator for Hosts {}

impl std::iter::FusedIterator for Hosts {}
