//! Scanner module: result aggregation, the worker pool and the scan orchestrator

pub mod engine;
pub mod pool;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::core::Prober;
use crate::network::{AddressRange, PortResult, PortSpec, TargetAddress};
use crate::output::ResultSink;

pub use engine::ScanOrchestrator;
pub use pool::{PoolStats, WorkerPool};

/// Collection of port rows from every scanned host. Row order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet {
    rows: Vec<PortResult>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[PortResult] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PortResult> {
        self.rows.iter()
    }

    pub fn into_rows(self) -> Vec<PortResult> {
        self.rows
    }

    /// Distinct hosts that contributed at least one row
    pub fn hosts(&self) -> BTreeSet<TargetAddress> {
        self.rows.iter().map(|r| r.host).collect()
    }

    /// Sort by host, then port, for stable output
    pub fn sort(&mut self) {
        self.rows.sort_by(|a, b| (a.host, a.port, a.protocol.as_str()).cmp(&(b.host, b.port, b.protocol.as_str())));
    }

    fn extend(&mut self, rows: Vec<PortResult>) {
        self.rows.extend(rows);
    }
}

impl From<Vec<PortResult>> for ResultSet {
    fn from(rows: Vec<PortResult>) -> Self {
        Self { rows }
    }
}

impl IntoIterator for ResultSet {
    type Item = PortResult;
    type IntoIter = std::vec::IntoIter<PortResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a PortResult;
    type IntoIter = std::slice::Iter<'a, PortResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Receives the rows of each successful probe
#[async_trait]
pub trait ResultHandler: Send + Sync {
    async fn on_result(&self, host: TargetAddress, results: Vec<PortResult>);
}

/// Thread-safe result collector.
///
/// Every append takes the same lock, so one host's batch is never interleaved
/// with another's.
#[derive(Debug, Default)]
pub struct Aggregator {
    results: Mutex<ResultSet>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one batch atomically
    pub async fn append(&self, results: Vec<PortResult>) {
        if results.is_empty() {
            return;
        }
        let mut set = self.results.lock().await;
        set.extend(results);
    }

    pub async fn len(&self) -> usize {
        self.results.lock().await.len()
    }

    /// Copy of the current result set. Only meaningful once the pool has drained.
    pub async fn snapshot(&self) -> ResultSet {
        self.results.lock().await.clone()
    }

    /// Take ownership of the collected results
    pub fn into_results(self) -> ResultSet {
        self.results.into_inner()
    }
}

#[async_trait]
impl ResultHandler for Aggregator {
    async fn on_result(&self, host: TargetAddress, results: Vec<PortResult>) {
        log::debug!("Collected {} row(s) from {}", results.len(), host);
        self.append(results).await;
    }
}

/// Outcome of a completed scan
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub range: AddressRange,
    pub ports: PortSpec,
    pub results: ResultSet,
    pub stats: PoolStats,
    pub duration: Duration,
}

impl ScanReport {
    /// Hosts that answered with at least one row
    pub fn responsive_hosts(&self) -> usize {
        self.results.hosts().len()
    }
}

/// Scan `range` with a fresh orchestrator of `workers` workers.
pub async fn scan<P, S>(
    range: &str,
    ports: &str,
    workers: usize,
    prober: Arc<P>,
    sink: &S,
) -> crate::Result<ScanReport>
where
    P: Prober + ?Sized + 'static,
    S: ResultSink + ?Sized,
{
    ScanOrchestrator::new(workers).scan(range, ports, prober, sink).await
}
