//! Process statistics for the monitoring heartbeat.
//!
//! [`StatsCollector`] samples this process's memory usage from
//! `/proc/self/statm`. Hosts without procfs report zeros instead of
//! failing the heartbeat.

use std::time::Instant;

use serde::Serialize;

const STATM_PATH: &str = "/proc/self/statm";

/// Used when the page size cannot be queried.
const FALLBACK_PAGE_SIZE: u64 = 4096;

/// Memory usage snapshot, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryUsage {
    /// Resident set size.
    pub rss: u64,
    #[serde(rename = "virtual")]
    pub virtual_size: u64,
}

#[derive(Debug, Clone)]
pub struct StatsCollector {
    started_at: Instant,
    page_size: u64,
}

impl StatsCollector {
    /// `started_at` is the instant uptime is measured from.
    pub fn new(started_at: Instant) -> Self {
        Self {
            started_at,
            page_size: page_size(),
        }
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let pages = match std::fs::read_to_string(STATM_PATH) {
            Ok(contents) => parse_statm(&contents),
            Err(e) => {
                tracing::trace!(error = %e, "Memory statistics unavailable");
                None
            }
        };

        match pages {
            Some((size, resident)) => MemoryUsage {
                rss: resident * self.page_size,
                virtual_size: size * self.page_size,
            },
            None => MemoryUsage::default(),
        }
    }

    /// Seconds since `started_at`.
    pub fn up_time(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}

/// Parse the first two fields of `statm`: total and resident pages.
fn parse_statm(contents: &str) -> Option<(u64, u64)> {
    let mut fields = contents.split_whitespace();
    let size = fields.next()?.parse().ok()?;
    let resident = fields.next()?.parse().ok()?;
    Some((size, resident))
}

#[cfg(unix)]
fn page_size() -> u64 {
    // Safety: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        FALLBACK_PAGE_SIZE
    }
}

#[cfg(not(unix))]
fn page_size() -> u64 {
    FALLBACK_PAGE_SIZE
}
