//! Fixed-size worker pool fed by a bounded job queue

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::core::Prober;
use crate::error::ScanError;
use crate::network::{PortSpec, TargetAddress};
use crate::scanner::ResultHandler;

/// Counters gathered over one pool run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Jobs accepted by the queue
    pub jobs_enqueued: usize,
    /// Probes started, successful or not
    pub probes_attempted: usize,
    /// Probes that returned an error
    pub probes_failed: usize,
    /// Subset of `probes_failed` caused by local resource exhaustion
    pub local_failures: usize,
    /// Rows handed to the result handler
    pub rows_collected: usize,
    pub cancelled: bool,
}

#[derive(Debug, Default)]
struct Counters {
    attempted: AtomicUsize,
    failed: AtomicUsize,
    local: AtomicUsize,
    rows: AtomicUsize,
}

/// A fixed set of workers consuming host jobs from one bounded queue.
///
/// The producer waits when the queue is full. `run` returns only after the
/// job source is exhausted, the queue is drained and every worker has exited.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    queue_capacity: usize,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Create a pool of `workers` workers. The queue holds as many jobs as there are workers.
    pub fn new(workers: usize) -> crate::Result<Self> {
        if workers == 0 {
            return Err(ScanError::Config("worker count must be greater than 0".to_string()));
        }
        Ok(Self {
            workers,
            queue_capacity: workers,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Stop handing out jobs once `token` is cancelled. In-flight probes still finish.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Probe every job with `prober`, forwarding each successful batch to `handler`.
    ///
    /// A failed probe is logged and counted; it never stops the other workers.
    pub async fn run<I, P, H>(
        &self,
        jobs: I,
        prober: Arc<P>,
        ports: Arc<PortSpec>,
        handler: Arc<H>,
    ) -> PoolStats
    where
        I: IntoIterator<Item = TargetAddress>,
        P: Prober + ?Sized + 'static,
        H: ResultHandler + ?Sized + 'static,
    {
        let (job_tx, job_rx) = mpsc::channel::<TargetAddress>(self.queue_capacity);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let counters = Arc::new(Counters::default());

        log::debug!(
            "Starting {} workers ({} prober, queue capacity {})",
            self.workers,
            prober.name(),
            self.queue_capacity
        );

        let mut handles = Vec::with_capacity(self.workers);
        for worker_id in 0..self.workers {
            let job_rx = job_rx.clone();
            let prober = prober.clone();
            let ports = ports.clone();
            let handler = handler.clone();
            let counters = counters.clone();
            let cancel = self.cancel.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = job_rx.lock().await;
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => None,
                            job = rx.recv() => job,
                        }
                    };
                    let Some(host) = job else { break };

                    counters.attempted.fetch_add(1, Ordering::Relaxed);
                    match prober.probe(host, &ports).await {
                        Ok(results) => {
                            counters.rows.fetch_add(results.len(), Ordering::Relaxed);
                            handler.on_result(host, results).await;
                        }
                        Err(e) if e.is_local() => {
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                            counters.local.fetch_add(1, Ordering::Relaxed);
                            log::error!("Could not scan host {}: {}", host, e);
                        }
                        Err(e) => {
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                            log::warn!("Error scanning host {}: {}", host, e);
                        }
                    }
                }
                log::trace!("Worker {} finished", worker_id);
            }));
        }

        let mut enqueued = 0usize;
        for host in jobs {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    log::warn!("Scan cancelled, {} job(s) queued before stop", enqueued);
                    break;
                }
                sent = job_tx.send(host) => {
                    if sent.is_err() {
                        log::error!("All workers exited before the job queue was drained");
                        break;
                    }
                    enqueued += 1;
                }
            }
        }

        // Closing the queue lets workers exit once it is empty
        drop(job_tx);

        for handle in handles {
            if let Err(e) = handle.await {
                log::error!("Worker task failed: {}", e);
            }
        }

        PoolStats {
            jobs_enqueued: enqueued,
            probes_attempted: counters.attempted.load(Ordering::Relaxed),
            probes_failed: counters.failed.load(Ordering::Relaxed),
            local_failures: counters.local.load(Ordering::Relaxed),
            rows_collected: counters.rows.load(Ordering::Relaxed),
            cancelled: self.cancel.is_cancelled(),
        }
    }
}
