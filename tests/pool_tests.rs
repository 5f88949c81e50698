//! Worker pool fan-out/fan-in tests with stub probers

use async_trait::async_trait;
use netsweep::{
    Aggregator, PortResult, PortSpec, PortState, ProbeError, Prober, Protocol, TargetAddress, WorkerPool,
};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Returns `last_octet % 4` rows per host and fails every host listed in `failing`.
struct DeterministicProber {
    attempts: AtomicUsize,
    seen: Mutex<Vec<TargetAddress>>,
    failing: HashSet<TargetAddress>,
}

impl DeterministicProber {
    fn new(failing: impl IntoIterator<Item = TargetAddress>) -> Self {
        Self {
            attempts: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            failing: failing.into_iter().collect(),
        }
    }

    fn rows_for(host: TargetAddress) -> usize {
        usize::from(host.octets()[3] % 4)
    }
}

#[async_trait]
impl Prober for DeterministicProber {
    async fn probe(&self, host: TargetAddress, ports: &PortSpec) -> Result<Vec<PortResult>, ProbeError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(host);

        // Stagger completion so workers interleave
        tokio::time::sleep(Duration::from_millis(u64::from(host.octets()[3] % 3))).await;

        if self.failing.contains(&host) {
            return Err(ProbeError::Unreachable(host.to_string()));
        }

        Ok(ports
            .iter()
            .take(Self::rows_for(host))
            .map(|port| PortResult::new(host, port, Protocol::Tcp, PortState::Open))
            .collect())
    }

    fn name(&self) -> &str {
        "deterministic"
    }
}

fn hosts(count: u8) -> Vec<TargetAddress> {
    (1..=count).map(|i| Ipv4Addr::new(10, 0, 0, i)).collect()
}

fn ports() -> Arc<PortSpec> {
    Arc::new(PortSpec::parse("1-10").unwrap())
}

#[tokio::test]
async fn test_every_job_probed_exactly_once() {
    for workers in [1, 3, 16, 64] {
        let prober = Arc::new(DeterministicProber::new([]));
        let aggregator = Arc::new(Aggregator::new());
        let jobs = hosts(50);

        let stats = WorkerPool::new(workers)
            .unwrap()
            .run(jobs.clone(), prober.clone(), ports(), aggregator.clone())
            .await;

        assert_eq!(stats.jobs_enqueued, 50);
        assert_eq!(stats.probes_attempted, 50);
        assert_eq!(prober.attempts.load(Ordering::SeqCst), 50);

        let mut seen = prober.seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, jobs, "workers = {}", workers);

        let expected: usize = jobs.iter().map(|h| DeterministicProber::rows_for(*h)).sum();
        assert_eq!(stats.rows_collected, expected);
        assert_eq!(aggregator.len().await, expected);
    }
}

#[tokio::test]
async fn test_probe_failure_does_not_stop_other_hosts() {
    let failing = Ipv4Addr::new(10, 0, 0, 7);
    let prober = Arc::new(DeterministicProber::new([failing]));
    let aggregator = Arc::new(Aggregator::new());
    let jobs = hosts(20);

    let stats = WorkerPool::new(4)
        .unwrap()
        .run(jobs.clone(), prober.clone(), ports(), aggregator.clone())
        .await;

    assert_eq!(stats.probes_attempted, 20);
    assert_eq!(stats.probes_failed, 1);

    let expected: usize = jobs
        .iter()
        .filter(|h| **h != failing)
        .map(|h| DeterministicProber::rows_for(*h))
        .sum();
    let results = aggregator.snapshot().await;
    assert_eq!(results.len(), expected);
    assert!(!results.hosts().contains(&failing));
}

#[tokio::test]
async fn test_repeated_runs_collect_same_row_count() {
    let mut counts = Vec::new();

    for _ in 0..2 {
        let prober = Arc::new(DeterministicProber::new([]));
        let aggregator = Arc::new(Aggregator::new());
        WorkerPool::new(8)
            .unwrap()
            .with_queue_capacity(2)
            .run(hosts(200), prober, ports(), aggregator.clone())
            .await;
        counts.push(aggregator.len().await);
    }

    assert_eq!(counts[0], counts[1]);
    assert!(counts[0] > 0);
}

#[tokio::test]
async fn test_empty_job_source_returns_immediately() {
    let prober = Arc::new(DeterministicProber::new([]));
    let aggregator = Arc::new(Aggregator::new());

    let stats = WorkerPool::new(4)
        .unwrap()
        .run(Vec::new(), prober.clone(), ports(), aggregator.clone())
        .await;

    assert_eq!(stats.probes_attempted, 0);
    assert_eq!(prober.attempts.load(Ordering::SeqCst), 0);
    assert_eq!(aggregator.len().await, 0);
}

#[tokio::test]
async fn test_trait_object_prober() {
    let prober: Arc<dyn Prober> = Arc::new(DeterministicProber::new([]));
    let aggregator = Arc::new(Aggregator::new());

    let stats = WorkerPool::new(2)
        .unwrap()
        .run(hosts(8), prober, ports(), aggregator.clone())
        .await;

    assert_eq!(stats.probes_attempted, 8);
}

/// Parks every probe until the test adds permits
struct GatedProber {
    gate: Semaphore,
    entered: AtomicUsize,
}

#[async_trait]
impl Prober for GatedProber {
    async fn probe(&self, host: TargetAddress, _ports: &PortSpec) -> Result<Vec<PortResult>, ProbeError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| ProbeError::Other(e.to_string()))?;
        Ok(vec![PortResult::new(host, 80, Protocol::Tcp, PortState::Open)])
    }

    fn name(&self) -> &str {
        "gated"
    }
}

#[tokio::test]
async fn test_producer_blocks_when_queue_is_full() {
    let workers = 2;
    let capacity = 3;
    let prober = Arc::new(GatedProber {
        gate: Semaphore::new(0),
        entered: AtomicUsize::new(0),
    });
    let aggregator = Arc::new(Aggregator::new());

    let pulled = Arc::new(AtomicUsize::new(0));
    let counter = pulled.clone();
    let jobs = (1..=50u8).map(|i| Ipv4Addr::new(10, 0, 0, i)).inspect(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let pool = WorkerPool::new(workers).unwrap().with_queue_capacity(capacity);
    let run = tokio::spawn({
        let prober = prober.clone();
        let aggregator = aggregator.clone();
        async move { pool.run(jobs, prober, ports(), aggregator).await }
    });

    for _ in 0..200 {
        if prober.entered.load(Ordering::SeqCst) == workers {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(prober.entered.load(Ordering::SeqCst), workers);

    // Give the producer time to run ahead if the queue were unbounded
    tokio::time::sleep(Duration::from_millis(50)).await;

    let in_hand = pulled.load(Ordering::SeqCst);
    assert!(in_hand >= workers + capacity, "pulled only {}", in_hand);
    assert!(in_hand <= workers + capacity + 1, "pulled {} jobs past a full queue", in_hand);
    assert_eq!(prober.entered.load(Ordering::SeqCst), workers);

    prober.gate.add_permits(50);
    let stats = run.await.unwrap();

    assert_eq!(pulled.load(Ordering::SeqCst), 50);
    assert_eq!(stats.probes_attempted, 50);
    assert_eq!(aggregator.len().await, 50);
}

struct ExhaustedProber;

#[async_trait]
impl Prober for ExhaustedProber {
    async fn probe(&self, host: TargetAddress, _ports: &PortSpec) -> Result<Vec<PortResult>, ProbeError> {
        if host.octets()[3] % 2 == 0 {
            Err(ProbeError::LocalResource(format!("{}: Too many open files", host)))
        } else {
            Err(ProbeError::Unreachable(host.to_string()))
        }
    }

    fn name(&self) -> &str {
        "exhausted"
    }
}

#[tokio::test]
async fn test_local_failures_counted_apart_from_unreachable_hosts() {
    let aggregator = Arc::new(Aggregator::new());

    let stats = WorkerPool::new(3)
        .unwrap()
        .run(hosts(10), Arc::new(ExhaustedProber), ports(), aggregator.clone())
        .await;

    assert_eq!(stats.probes_attempted, 10);
    assert_eq!(stats.probes_failed, 10);
    assert_eq!(stats.local_failures, 5);
    assert_eq!(aggregator.len().await, 0);
}
