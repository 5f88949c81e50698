//! Error handling for the netsweep scanner
//!
//! Validation errors fail fast before any worker starts, probe errors stay
//! inside the worker pool, and sink errors surface after the scan with the
//! collected results still attached.

use thiserror::Error;

use crate::scanner::ResultSet;

/// Main error type for scanning operations
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid target range: {0}")]
    InvalidRange(String),

    #[error("Invalid port specification: {0}")]
    InvalidPortSpec(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The scan finished but the results could not be written. The collected
    /// rows travel with the error.
    #[error("Failed to write results: {source}")]
    Sink {
        #[source]
        source: SinkError,
        results: ResultSet,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// Results collected before the failure, if the error carries any.
    pub fn results(&self) -> Option<&ResultSet> {
        match self {
            ScanError::Sink { results, .. } => Some(results),
            _ => None,
        }
    }
}

/// Result type alias for scan operations
pub type ScanResult<T> = Result<T, ScanError>;

/// Failure of a single host probe. Never aborts the scan.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Host unreachable: {0}")]
    Unreachable(String),

    /// The scanning machine ran out of sockets, file descriptors or buffers.
    /// Says nothing about the target host.
    #[error("Local resource exhausted: {0}")]
    LocalResource(String),

    #[error("Probe timed out")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Failure to persist or render a result set
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProbeError {
    /// True when the failure originates on the scanning machine
    pub fn is_local(&self) -> bool {
        matches!(self, ProbeError::LocalResource(_))
    }
}

impl From<std::net::AddrParseError> for ScanError {
    fn from(e: std::net::AddrParseError) -> Self {
        ScanError::InvalidRange(e.to_string())
    }
}

impl From<ipnetwork::IpNetworkError> for ScanError {
    fn from(e: ipnetwork::IpNetworkError) -> Self {
        ScanError::InvalidRange(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ProbeError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ProbeError::Timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_error_keeps_results() {
        let err = ScanError::Sink {
            source: SinkError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")),
            results: ResultSet::default(),
        };

        assert!(err.results().is_some());
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_addr_parse_maps_to_invalid_range() {
        let parse_err = "999.1.1.1".parse::<std::net::Ipv4Addr>().unwrap_err();
        let err: ScanError = parse_err.into();

        assert!(matches!(err, ScanError::InvalidRange(_)));
        assert!(err.results().is_none());
    }
}
