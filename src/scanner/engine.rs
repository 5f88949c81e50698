//! Scan orchestration: validate, enumerate, fan out, collect, hand off

use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ScanConfig;
use crate::core::Prober;
use crate::error::ScanError;
use crate::network::{AddressRange, PortSpec};
use crate::output::ResultSink;
use crate::scanner::{Aggregator, PoolStats, ResultSet, ScanReport, WorkerPool};

/// Wires the range enumerator, the worker pool and the aggregator together
/// and passes the finished result set to a sink.
#[derive(Debug, Clone)]
pub struct ScanOrchestrator {
    workers: usize,
    queue_capacity: Option<usize>,
    cancel: CancellationToken,
}

impl ScanOrchestrator {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            queue_capacity: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            workers: config.workers,
            queue_capacity: config.queue_capacity,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops scans cooperatively when cancelled.
    ///
    /// Cancellation is permanent: a scan started after the token fired
    /// enqueues nothing and reports `cancelled`. Use [`Self::with_cancellation`]
    /// with a fresh token to scan again.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Parse `range` and `ports`, then scan. Nothing is probed if either fails to parse.
    pub async fn scan<P, S>(&self, range: &str, ports: &str, prober: Arc<P>, sink: &S) -> crate::Result<ScanReport>
    where
        P: Prober + ?Sized + 'static,
        S: ResultSink + ?Sized,
    {
        let range = AddressRange::parse(range)?;
        let ports = PortSpec::parse(ports)?;
        self.scan_range(range, ports, prober, sink).await
    }

    /// Scan an already parsed range.
    ///
    /// The sink is called exactly once, after every worker has finished, even
    /// when the range holds no usable hosts. A sink failure is returned as
    /// [`ScanError::Sink`] carrying the collected results.
    pub async fn scan_range<P, S>(
        &self,
        range: AddressRange,
        ports: PortSpec,
        prober: Arc<P>,
        sink: &S,
    ) -> crate::Result<ScanReport>
    where
        P: Prober + ?Sized + 'static,
        S: ResultSink + ?Sized,
    {
        if ports.is_empty() {
            return Err(ScanError::InvalidPortSpec("no ports to scan".to_string()));
        }

        let mut pool = WorkerPool::new(self.workers)?.with_cancellation(self.cancel.child_token());
        if let Some(capacity) = self.queue_capacity {
            pool = pool.with_queue_capacity(capacity);
        }

        let start_time = Instant::now();
        let host_count = range.host_count();

        let (results, stats) = if host_count == 0 {
            log::info!("Range {} has no usable hosts, nothing to scan", range);
            (ResultSet::new(), PoolStats::default())
        } else {
            log::info!(
                "Scanning {} hosts in network {} ({} ports, {} workers)",
                host_count,
                range,
                ports.len(),
                pool.workers()
            );

            let aggregator = Arc::new(Aggregator::new());
            let stats = pool
                .run(range.hosts(), prober, Arc::new(ports.clone()), aggregator.clone())
                .await;

            // Every worker has been joined, so this is the last reference
            let results = match Arc::try_unwrap(aggregator) {
                Ok(aggregator) => aggregator.into_results(),
                Err(shared) => shared.snapshot().await,
            };
            (results, stats)
        };

        let duration = start_time.elapsed();
        log::info!(
            "Scan completed in {:.2?}: {} probes, {} failed, {} rows",
            duration,
            stats.probes_attempted,
            stats.probes_failed,
            results.len()
        );

        if let Err(source) = sink.write(&results) {
            log::error!("Error writing results to {}: {}", sink.destination(), source);
            return Err(ScanError::Sink { source, results });
        }

        Ok(ScanReport {
            range,
            ports,
            results,
            stats,
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProbeError, SinkError};
    use crate::network::{PortResult, TargetAddress};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingProber {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Prober for CountingProber {
        async fn probe(&self, _host: TargetAddress, _ports: &PortSpec) -> Result<Vec<PortResult>, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        writes: Mutex<Vec<usize>>,
    }

    impl ResultSink for RecordingSink {
        fn write(&self, results: &ResultSet) -> Result<(), SinkError> {
            self.writes.lock().unwrap().push(results.len());
            Ok(())
        }

        fn destination(&self) -> String {
            "memory".to_string()
        }
    }

    #[tokio::test]
    async fn test_bad_port_spec_fails_before_probing() {
        let prober = Arc::new(CountingProber::default());
        let sink = RecordingSink::default();

        let err = ScanOrchestrator::new(4)
            .scan("10.0.0.0/29", "80-", prober.clone(), &sink)
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::InvalidPortSpec(_)));
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);
        assert!(sink.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_workers_is_config_error() {
        let prober = Arc::new(CountingProber::default());
        let sink = RecordingSink::default();

        let err = ScanOrchestrator::new(0)
            .scan("10.0.0.0/29", "80", prober.clone(), &sink)
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::Config(_)));
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_every_host_probed_once() {
        let prober = Arc::new(CountingProber::default());
        let sink = RecordingSink::default();

        let report = ScanOrchestrator::new(3)
            .with_queue_capacity(1)
            .scan("192.168.7.0/27", "22,80", prober.clone(), &sink)
            .await
            .unwrap();

        assert_eq!(prober.calls.load(Ordering::SeqCst), 30);
        assert_eq!(report.stats.jobs_enqueued, 30);
        assert_eq!(report.stats.probes_attempted, 30);
        assert!(report.results.is_empty());
        assert_eq!(*sink.writes.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_cancelled_orchestrator_needs_fresh_token() {
        let prober = Arc::new(CountingProber::default());
        let sink = RecordingSink::default();
        let orchestrator = ScanOrchestrator::new(2);
        orchestrator.cancellation_token().cancel();

        let report = orchestrator.scan("10.0.0.0/29", "80", prober.clone(), &sink).await.unwrap();
        assert!(report.stats.cancelled);
        assert_eq!(report.stats.jobs_enqueued, 0);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);

        let report = orchestrator
            .with_cancellation(CancellationToken::new())
            .scan("10.0.0.0/29", "80", prober.clone(), &sink)
            .await
            .unwrap();
        assert!(!report.stats.cancelled);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 6);
        assert_eq!(*sink.writes.lock().unwrap(), vec![0, 0]);
    }
}
