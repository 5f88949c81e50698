//! netsweep - bounded-concurrency subnet port sweeper
//!
//! Enumerates the usable hosts of a CIDR range, probes each one from a fixed
//! pool of workers fed by a bounded queue, and collects every port row into a
//! single result set for a CSV, JSON or text sink.

pub mod config;
pub mod core;
pub mod error;
pub mod limits;
pub mod network;
pub mod output;
pub mod scanner;

// Re-export commonly used types
pub use config::ScanConfig;
pub use crate::core::{Prober, TcpConnectProber};
pub use error::{ProbeError, ScanError, SinkError};
pub use network::{AddressRange, PortResult, PortSpec, PortState, Protocol, TargetAddress};
pub use output::{CsvSink, JsonSink, OutputFormat, ResultSink, TextSink};
pub use scanner::{scan, Aggregator, PoolStats, ResultSet, ScanOrchestrator, ScanReport, WorkerPool};

pub type Result<T> = std::result::Result<T, ScanError>;
