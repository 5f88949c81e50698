//! Port range specification parsing

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ScanError;

/// Inclusive port range. Always non-empty and never includes port 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> crate::Result<Self> {
        if start == 0 {
            return Err(ScanError::InvalidPortSpec("port 0 is not valid".to_string()));
        }
        if start > end {
            return Err(ScanError::InvalidPortSpec(format!(
                "start port {} cannot be greater than end port {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn single(port: u16) -> crate::Result<Self> {
        Self::new(port, port)
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    /// Number of ports covered
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// A normalized set of ports: sorted, non-overlapping inclusive ranges.
///
/// Accepts `1-1000`, `22,80,443` and mixtures such as `20-25, 8080`.
/// Serialized as its normalized string form and deserialized through [`PortSpec::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortSpec {
    ranges: Vec<PortRange>,
}

impl PortSpec {
    pub fn parse(spec: &str) -> crate::Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(ScanError::InvalidPortSpec("port specification is empty".to_string()));
        }

        let mut ranges = Vec::new();
        for part in spec.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(ScanError::InvalidPortSpec(format!("empty entry in '{}'", spec)));
            }

            let range = match part.split_once('-') {
                Some((start, end)) => PortRange::new(parse_port(start.trim())?, parse_port(end.trim())?)?,
                None => PortRange::single(parse_port(part)?)?,
            };
            ranges.push(range);
        }

        Self::from_ranges(ranges)
    }

    /// Merge ranges into normalized form. At least one range is required.
    pub fn from_ranges(mut ranges: Vec<PortRange>) -> crate::Result<Self> {
        if ranges.is_empty() {
            return Err(ScanError::InvalidPortSpec("no ports to scan".to_string()));
        }
        ranges.sort_unstable();

        let mut merged: Vec<PortRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if u32::from(range.start) <= u32::from(last.end) + 1 => {
                    last.end = last.end.max(range.end);
                }
                _ => merged.push(range),
            }
        }

        Ok(Self { ranges: merged })
    }

    pub fn ranges(&self) -> &[PortRange] {
        &self.ranges
    }

    /// Number of distinct ports
    pub fn len(&self) -> usize {
        self.ranges.iter().map(PortRange::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn contains(&self, port: u16) -> bool {
        self.ranges.iter().any(|r| r.contains(port))
    }

    /// All ports in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.ranges.iter().flat_map(|r| r.start..=r.end)
    }
}

fn parse_port(s: &str) -> crate::Result<u16> {
    s.parse()
        .map_err(|e| ScanError::InvalidPortSpec(format!("invalid port '{}': {}", s, e)))
}

impl FromStr for PortSpec {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PortSpec {
    type Error = ScanError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<PortSpec> for String {
    fn from(spec: PortSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", range)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_range() {
        let spec = PortSpec::parse("1-1000").unwrap();
        assert_eq!(spec.len(), 1000);
        assert_eq!(spec.iter().next(), Some(1));
        assert_eq!(spec.iter().last(), Some(1000));
        assert_eq!(spec.to_string(), "1-1000");
    }

    #[test]
    fn test_parse_list_and_merge() {
        let spec = PortSpec::parse("443, 80,22,20-25,24-30").unwrap();

        assert_eq!(spec.to_string(), "20-30,80,443");
        assert_eq!(spec.len(), 13);
        assert!(spec.contains(22));
        assert!(!spec.contains(31));
    }

    #[test]
    fn test_adjacent_ranges_merge() {
        let spec = PortSpec::parse("1-10,11-20").unwrap();
        assert_eq!(spec.ranges(), &[PortRange::new(1, 20).unwrap()]);
    }

    #[test]
    fn test_full_range() {
        let spec = PortSpec::parse("1-65535").unwrap();
        assert_eq!(spec.len(), 65535);
    }

    #[test]
    fn test_invalid_specs() {
        for bad in ["", "  ", "0", "1-0", "100-10", "80,", "http", "1-2-3", "65536", "-5"] {
            assert!(
                matches!(PortSpec::parse(bad), Err(ScanError::InvalidPortSpec(_))),
                "expected '{}' to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_range_constructor_rejects_invalid_bounds() {
        assert!(matches!(PortRange::new(9, 3), Err(ScanError::InvalidPortSpec(_))));
        assert!(matches!(PortRange::new(0, 10), Err(ScanError::InvalidPortSpec(_))));
        assert!(matches!(PortRange::single(0), Err(ScanError::InvalidPortSpec(_))));
        assert_eq!(PortRange::new(65535, 65535).unwrap().len(), 1);
    }

    #[test]
    fn test_from_ranges_merges_and_rejects_empty() {
        let ranges = vec![PortRange::new(80, 90).unwrap(), PortRange::single(22).unwrap()];
        let spec = PortSpec::from_ranges(ranges).unwrap();
        assert_eq!(spec.to_string(), "22,80-90");
        assert_eq!(spec.len(), 12);

        assert!(matches!(PortSpec::from_ranges(Vec::new()), Err(ScanError::InvalidPortSpec(_))));
    }

    #[test]
    fn test_deserialize_goes_through_parse() {
        let spec: PortSpec = serde_json::from_str("\"443,20-25\"").unwrap();
        assert_eq!(spec.to_string(), "20-25,443");
        assert_eq!(serde_json::to_string(&spec).unwrap(), "\"20-25,443\"");

        for bad in ["\"0\"", "\"9-3\"", "\"\"", "{\"ranges\":[{\"start\":9,\"end\":3}]}"] {
            assert!(serde_json::from_str::<PortSpec>(bad).is_err(), "accepted {}", bad);
        }
    }
}
