//! Monitoring configuration and its merge rules.
//!
//! A script may carry a partial [`MonitoringOverride`] in its
//! `script.json`; the application context may carry a global one. The
//! script's values win field by field. [`resolve`] turns the pair into
//! the effective [`MonitoringConfig`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Handshake deadline when none is configured.
pub const DEFAULT_SOCKET_CONNECTION_TIMEOUT_MS: u64 = 5000;

/// Heartbeat period when none is configured.
pub const DEFAULT_PASS_STATS_INTERVAL_MS: u64 = 500;

/// Partial monitoring settings as written in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringOverride {
    #[serde(default)]
    pub status_url: Option<String>,
    #[serde(default)]
    pub ignore_warnings: Option<bool>,
    /// Milliseconds.
    #[serde(default)]
    pub socket_connection_timeout: Option<u64>,
    /// Milliseconds.
    #[serde(default)]
    pub pass_stats_interval: Option<u64>,
}

impl MonitoringOverride {
    /// Overlay `self` on top of `base`; fields set on `self` win.
    pub fn merged_over(&self, base: &MonitoringOverride) -> MonitoringOverride {
        MonitoringOverride {
            status_url: self.status_url.clone().or_else(|| base.status_url.clone()),
            ignore_warnings: self.ignore_warnings.or(base.ignore_warnings),
            socket_connection_timeout: self
                .socket_connection_timeout
                .or(base.socket_connection_timeout),
            pass_stats_interval: self.pass_stats_interval.or(base.pass_stats_interval),
        }
    }
}

/// Effective monitoring settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoringConfig {
    pub status_url: String,
    pub ignore_warnings: bool,
    pub socket_connection_timeout: Duration,
    pub pass_stats_interval: Duration,
}

impl MonitoringConfig {
    /// Config with defaults for everything but the URL.
    pub fn new(status_url: impl Into<String>) -> Self {
        Self {
            status_url: status_url.into(),
            ignore_warnings: false,
            socket_connection_timeout: Duration::from_millis(DEFAULT_SOCKET_CONNECTION_TIMEOUT_MS),
            pass_stats_interval: Duration::from_millis(DEFAULT_PASS_STATS_INTERVAL_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MonitoringConfigError {
    #[error("monitoring is configured without a statusUrl")]
    MissingStatusUrl,
}

/// Resolve the effective config from a script override and a global default.
///
/// `Ok(None)` means monitoring is not configured at all and the script
/// runs standalone. A configuration that exists but lacks a usable
/// `statusUrl` is an error the caller reports before going standalone.
pub fn resolve(
    script: Option<&MonitoringOverride>,
    global: Option<&MonitoringOverride>,
) -> Result<Option<MonitoringConfig>, MonitoringConfigError> {
    let merged = match (script, global) {
        (None, None) => return Ok(None),
        (Some(script), Some(global)) => script.merged_over(global),
        (Some(only), None) | (None, Some(only)) => only.clone(),
    };

    let status_url = merged
        .status_url
        .filter(|url| !url.trim().is_empty())
        .ok_or(MonitoringConfigError::MissingStatusUrl)?;

    Ok(Some(MonitoringConfig {
        status_url,
        ignore_warnings: merged.ignore_warnings.unwrap_or(false),
        socket_connection_timeout: Duration::from_millis(
            merged
                .socket_connection_timeout
                .filter(|ms| *ms > 0)
                .unwrap_or(DEFAULT_SOCKET_CONNECTION_TIMEOUT_MS),
        ),
        pass_stats_interval: Duration::from_millis(
            merged
                .pass_stats_interval
                .filter(|ms| *ms > 0)
                .unwrap_or(DEFAULT_PASS_STATS_INTERVAL_MS),
        ),
    }))
}
