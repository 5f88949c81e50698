//! Open file descriptor limit handling

/// Descriptors kept free for stdio, the log, the report file and the runtime
pub const FD_RESERVE: u64 = 64;

/// Assumed limit where the platform offers no way to query it
pub const FALLBACK_FD_LIMIT: u64 = 65535;

/// Descriptors a scan may hold at once: every worker connecting `host_concurrency` ports.
pub fn fd_demand(workers: usize, host_concurrency: usize) -> u64 {
    (workers as u64).saturating_mul(host_concurrency as u64).saturating_add(FD_RESERVE)
}

/// Apply the requested `ulimit`, or raise the soft limit towards `wanted`
/// (bounded by the hard limit), and return the soft limit now in effect.
#[cfg(unix)]
pub fn adjust_fd_limit(requested: Option<u64>, wanted: u64) -> u64 {
    use rlimit::Resource;

    match requested {
        Some(limit) => match Resource::NOFILE.set(limit, limit) {
            Ok(()) => log::info!("Set open file limit to {}", limit),
            Err(e) => log::error!("Failed to set open file limit to {}: {}", limit, e),
        },
        None => match rlimit::increase_nofile_limit(wanted) {
            Ok(limit) => log::debug!("Open file limit is {}", limit),
            Err(e) => log::warn!("Could not raise open file limit: {}", e),
        },
    }

    current_fd_limit()
}

#[cfg(not(unix))]
pub fn adjust_fd_limit(_requested: Option<u64>, _wanted: u64) -> u64 {
    FALLBACK_FD_LIMIT
}

/// Soft limit on open descriptors for this process
#[cfg(unix)]
pub fn current_fd_limit() -> u64 {
    match rlimit::Resource::NOFILE.get() {
        Ok((soft, _)) => soft,
        Err(e) => {
            log::warn!("Could not read open file limit: {}", e);
            FALLBACK_FD_LIMIT
        }
    }
}

#[cfg(not(unix))]
pub fn current_fd_limit() -> u64 {
    FALLBACK_FD_LIMIT
}
