//! Configuration module for the netsweep scanner

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::limits::{fd_demand, FD_RESERVE};
use crate::network::{AddressRange, PortSpec};
use crate::output::{default_output_path, OutputFormat};

/// Main configuration structure for scanning operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Target network in CIDR notation
    pub target: String,

    /// Port specification, e.g. `1-1000` or `22,80,443`
    pub ports: String,

    /// Number of concurrent host workers
    pub workers: usize,

    /// Job queue capacity. Defaults to the worker count.
    pub queue_capacity: Option<usize>,

    /// Timeout for each connection attempt in milliseconds
    pub connect_timeout_ms: u64,

    /// Concurrent port connects per host
    pub host_concurrency: usize,

    /// Open file limit to apply before scanning. The soft limit is raised as far as allowed when unset.
    pub ulimit: Option<u64>,

    /// Report file. Derived from the target when unset.
    pub output_file: Option<PathBuf>,

    pub output_format: OutputFormat,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            ports: "1-1000".to_string(),
            workers: 50,
            queue_capacity: None,
            connect_timeout_ms: 1000,
            host_concurrency: 256,
            ulimit: None,
            output_file: None,
            output_format: OutputFormat::Csv,
        }
    }
}

impl ScanConfig {
    /// Create a new scan configuration
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn with_ports(mut self, ports: impl Into<String>) -> Self {
        self.ports = ports.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    pub fn with_host_concurrency(mut self, concurrency: usize) -> Self {
        self.host_concurrency = concurrency;
        self
    }

    pub fn with_ulimit(mut self, limit: u64) -> Self {
        self.ulimit = Some(limit);
        self
    }

    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Get timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// The configured report file, or one derived from the target
    pub fn output_path(&self) -> PathBuf {
        self.output_file
            .clone()
            .unwrap_or_else(|| default_output_path(&self.target, self.output_format))
    }

    /// Descriptors this configuration may hold open at once
    pub fn fd_demand(&self) -> u64 {
        fd_demand(self.workers, self.host_concurrency)
    }

    /// Lower `host_concurrency` until the scan fits in `fd_limit` open descriptors.
    ///
    /// Fails when even one connect per worker would not fit.
    pub fn fit_fd_limit(&mut self, fd_limit: u64) -> crate::Result<()> {
        if self.workers > 0 && self.fd_demand() > fd_limit {
            let per_worker = fd_limit.saturating_sub(FD_RESERVE) / self.workers as u64;
            let fitted = usize::try_from(per_worker).unwrap_or(usize::MAX).max(1);
            if fitted < self.host_concurrency {
                log::warn!(
                    "Open file limit {} is too low for {} workers x {} connects, using {} connects per host",
                    fd_limit,
                    self.workers,
                    self.host_concurrency,
                    fitted
                );
                self.host_concurrency = fitted;
            }
        }
        self.check_fd_limit(fd_limit)
    }

    /// Fail when `workers * host_concurrency` plus a reserve exceeds `fd_limit`
    pub fn check_fd_limit(&self, fd_limit: u64) -> crate::Result<()> {
        let demand = self.fd_demand();
        if demand > fd_limit {
            return Err(crate::ScanError::Config(format!(
                "{} workers x {} connects per host need {} open files, but the limit is {}; \
                 lower --workers or --host-concurrency, or raise --ulimit",
                self.workers, self.host_concurrency, demand, fd_limit
            )));
        }
        Ok(())
    }

    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            crate::ScanError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        toml::from_str(&content)
            .map_err(|e| crate::ScanError::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from `~/.netsweep.toml`, falling back to defaults
    pub fn load_default_config() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let config_path = home_dir.join(".netsweep.toml");

        if config_path.exists() {
            match Self::from_toml_file(&config_path) {
                Ok(config) => {
                    log::info!("Loaded config from {}", config_path.display());
                    return config;
                }
                Err(e) => log::warn!("Ignoring {}: {}", config_path.display(), e),
            }
        }

        Self::default()
    }

    /// Validate the configuration. Range and port errors come first, as the scan would report them.
    /// An explicit `ulimit` must cover the descriptor demand; the live limit is checked by [`Self::fit_fd_limit`].
    pub fn validate(&self) -> crate::Result<()> {
        AddressRange::parse(&self.target)?;
        PortSpec::parse(&self.ports)?;

        if self.workers == 0 {
            return Err(crate::ScanError::Config("Worker count must be greater than 0".to_string()));
        }

        if self.queue_capacity == Some(0) {
            return Err(crate::ScanError::Config("Queue capacity must be greater than 0".to_string()));
        }

        if self.connect_timeout_ms == 0 {
            return Err(crate::ScanError::Config("Connect timeout must be greater than 0".to_string()));
        }

        if self.host_concurrency == 0 {
            return Err(crate::ScanError::Config("Host concurrency must be greater than 0".to_string()));
        }

        if let Some(limit) = self.ulimit {
            self.check_fd_limit(limit)?;
        }

        Ok(())
    }
}
