// Prober trait and the built-in TCP connect prober

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ProbeError;
use crate::network::{PortResult, PortSpec, PortState, Protocol, ServiceDatabase, TargetAddress};

/// Per-host probe capability.
///
/// A probe may take arbitrary wall-clock time; the worker pool imposes no
/// timeout, so implementations own their timeout policy.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe every port of `ports` on `host`
    async fn probe(&self, host: TargetAddress, ports: &PortSpec) -> Result<Vec<PortResult>, ProbeError>;

    /// Prober name used in log lines
    fn name(&self) -> &str;
}

#[async_trait]
impl<P: Prober + ?Sized> Prober for Arc<P> {
    async fn probe(&self, host: TargetAddress, ports: &PortSpec) -> Result<Vec<PortResult>, ProbeError> {
        (**self).probe(host, ports).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// TCP Connect prober - No privileges required
///
/// Reports only open ports. Refused and timed-out connects produce no row.
/// Running out of local sockets fails the host with [`ProbeError::LocalResource`];
/// any other connect error fails it as unreachable.
#[derive(Debug, Clone)]
pub struct TcpConnectProber {
    timeout: Duration,
    concurrency: usize,
    services: Arc<ServiceDatabase>,
}

enum ConnectOutcome {
    Open,
    Closed,
    Filtered,
}

impl TcpConnectProber {
    pub fn new(timeout: Duration, concurrency: usize) -> Self {
        Self {
            timeout,
            concurrency: concurrency.max(1),
            services: Arc::new(ServiceDatabase::new()),
        }
    }

    async fn connect(&self, host: TargetAddress, port: u16) -> Result<ConnectOutcome, ProbeError> {
        let addr = SocketAddr::from((host, port));

        match tokio::time::timeout(self.timeout, tokio::net::TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                Ok(ConnectOutcome::Open)
            }
            Ok(Err(e)) => classify_connect_error(addr, e),
            Err(_) => Ok(ConnectOutcome::Filtered),
        }
    }
}

fn classify_connect_error(addr: SocketAddr, e: io::Error) -> Result<ConnectOutcome, ProbeError> {
    if is_closed_port(&e) {
        Ok(ConnectOutcome::Closed)
    } else if is_local_exhaustion(&e) {
        Err(ProbeError::LocalResource(format!("{}: {}", addr, e)))
    } else {
        Err(ProbeError::Unreachable(format!("{}: {}", addr, e)))
    }
}

fn is_closed_port(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset | ErrorKind::TimedOut)
}

/// Socket creation failed on this machine (fd table full, no buffers, no ephemeral ports)
fn is_local_exhaustion(e: &io::Error) -> bool {
    if matches!(e.kind(), ErrorKind::AddrNotAvailable | ErrorKind::OutOfMemory) {
        return true;
    }

    #[cfg(unix)]
    {
        matches!(
            e.raw_os_error(),
            Some(libc::EMFILE) | Some(libc::ENFILE) | Some(libc::ENOBUFS) | Some(libc::ENOMEM)
        )
    }

    #[cfg(not(unix))]
    {
        false
    }
}

#[async_trait]
impl Prober for TcpConnectProber {
    async fn probe(&self, host: TargetAddress, ports: &PortSpec) -> Result<Vec<PortResult>, ProbeError> {
        let mut attempts = stream::iter(ports.iter())
            .map(|port| async move { (port, self.connect(host, port).await) })
            .buffer_unordered(self.concurrency);

        let mut results = Vec::new();
        let mut filtered = 0usize;
        while let Some((port, outcome)) = attempts.next().await {
            match outcome? {
                ConnectOutcome::Open => {
                    log::debug!("Found open port: {}:{}", host, port);
                    let service = self.services.name_or_unknown(Protocol::Tcp, port);
                    results.push(
                        PortResult::new(host, port, Protocol::Tcp, PortState::Open)
                            .with_service(service)
                            .with_reason("syn-ack"),
                    );
                }
                ConnectOutcome::Closed => {}
                ConnectOutcome::Filtered => filtered += 1,
            }
        }

        if results.is_empty() {
            log::debug!("Host {} has no open ports ({} filtered)", host, filtered);
        } else {
            log::info!("Host {} is up", host);
            results.sort_by_key(|r| r.port);
        }

        Ok(results)
    }

    fn name(&self) -> &str {
        "TCP Connect"
    }
}
