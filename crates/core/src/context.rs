//! Application context: resolved paths plus global defaults.
//!
//! Built once at startup and passed by reference to everything that
//! needs it. There is no process-wide configuration object.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

use crate::monitoring::MonitoringOverride;
use crate::runtime::Stage;

/// Directories the dispatcher and engines work with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppPaths {
    pub root_dir: PathBuf,
    pub scripts_path: PathBuf,
    pub modules_path: PathBuf,
    pub config_path: PathBuf,
    pub application_config_path: PathBuf,
    pub log_dir: PathBuf,
}

impl AppPaths {
    /// Default layout below `root`.
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        let root_dir = root.into();
        let config_path = root_dir.join("config");
        Self {
            scripts_path: root_dir.join("scripts"),
            modules_path: root_dir.join("modules"),
            application_config_path: config_path.join("application"),
            config_path,
            log_dir: root_dir.join("logs"),
            root_dir,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to resolve the working directory: {0}")]
    WorkingDirectory(#[source] io::Error),

    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },
}

/// Explicit context value threaded through the dispatcher.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub paths: AppPaths,
    /// Global monitoring default; merged under each script's override.
    pub monitoring: Option<MonitoringOverride>,
    /// Stage taken from the environment, used when no stage flag is given.
    pub env_stage: Option<Stage>,
    /// Process start, used for the reported uptime.
    pub started_at: Instant,
}

impl AppContext {
    pub fn new(paths: AppPaths) -> Self {
        Self {
            paths,
            monitoring: None,
            env_stage: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_monitoring(mut self, monitoring: MonitoringOverride) -> Self {
        self.monitoring = Some(monitoring);
        self
    }

    pub fn with_env_stage(mut self, stage: Stage) -> Self {
        self.env_stage = Some(stage);
        self
    }

    /// Load the context from process environment variables.
    ///
    /// | Env Var                                  | Default                 |
    /// |------------------------------------------|-------------------------|
    /// | `SCRIPTMUX_ROOT_DIR`                     | current directory       |
    /// | `SCRIPTMUX_SCRIPTS_PATH`                 | `<root>/scripts`        |
    /// | `SCRIPTMUX_MODULES_PATH`                 | `<root>/modules`        |
    /// | `SCRIPTMUX_CONFIG_PATH`                  | `<root>/config`         |
    /// | `SCRIPTMUX_APPLICATION_CONFIG_PATH`      | `<config>/application`  |
    /// | `SCRIPTMUX_LOG_DIR`                      | `<root>/logs`           |
    /// | `SCRIPTMUX_MONITORING_URL`               | unset                   |
    /// | `SCRIPTMUX_MONITORING_TIMEOUT_MS`        | unset                   |
    /// | `SCRIPTMUX_MONITORING_STATS_INTERVAL_MS` | unset                   |
    /// | `SCRIPTMUX_MONITORING_IGNORE_WARNINGS`   | unset                   |
    /// | `STAGE`                                  | unset                   |
    /// | `NODE_ENV`                               | unset                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().map_err(ConfigError::WorkingDirectory)?;
        Self::from_lookup(&cwd, |key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable
    /// source. Relative paths are resolved against `cwd`.
    pub fn from_lookup<F>(cwd: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let resolve = |value: String| cwd.join(value);

        let root_dir = var("SCRIPTMUX_ROOT_DIR")
            .map(resolve)
            .unwrap_or_else(|| cwd.to_path_buf());
        let mut paths = AppPaths::from_root(root_dir);

        if let Some(p) = var("SCRIPTMUX_SCRIPTS_PATH") {
            paths.scripts_path = resolve(p);
        }
        if let Some(p) = var("SCRIPTMUX_MODULES_PATH") {
            paths.modules_path = resolve(p);
        }
        if let Some(p) = var("SCRIPTMUX_CONFIG_PATH") {
            paths.config_path = resolve(p);
            paths.application_config_path = paths.config_path.join("application");
        }
        if let Some(p) = var("SCRIPTMUX_APPLICATION_CONFIG_PATH") {
            paths.application_config_path = resolve(p);
        }
        if let Some(p) = var("SCRIPTMUX_LOG_DIR") {
            paths.log_dir = resolve(p);
        }

        let monitoring = MonitoringOverride {
            status_url: var("SCRIPTMUX_MONITORING_URL"),
            ignore_warnings: parse_var(&var, "SCRIPTMUX_MONITORING_IGNORE_WARNINGS", parse_bool)?,
            socket_connection_timeout: parse_var(&var, "SCRIPTMUX_MONITORING_TIMEOUT_MS", parse_ms)?,
            pass_stats_interval: parse_var(
                &var,
                "SCRIPTMUX_MONITORING_STATS_INTERVAL_MS",
                parse_ms,
            )?,
        };

        let mut context = Self::new(paths);
        if monitoring != MonitoringOverride::default() {
            context.monitoring = Some(monitoring);
        }
        context.env_stage = env_stage(&var);

        Ok(context)
    }
}

/// `STAGE`, then `NODE_ENV`. An unrecognized value is logged and ignored.
fn env_stage(var: &impl Fn(&str) -> Option<String>) -> Option<Stage> {
    let (key, raw) = ["STAGE", "NODE_ENV"]
        .into_iter()
        .find_map(|key| var(key).map(|raw| (key, raw)))?;

    match raw.parse() {
        Ok(stage) => Some(stage),
        Err(e) => {
            tracing::warn!(var = key, error = %e, "Ignoring environment stage, defaulting to dev");
            None
        }
    }
}

fn parse_var<T>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    parse: fn(&str) -> Result<T, String>,
) -> Result<Option<T>, ConfigError> {
    var(key)
        .map(|raw| parse(raw.trim()).map_err(|reason| ConfigError::InvalidValue { var: key, reason }))
        .transpose()
}

fn parse_ms(raw: &str) -> Result<u64, String> {
    raw.parse::<u64>()
        .map_err(|e| format!("expected milliseconds, got '{raw}' ({e})"))
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("expected a boolean, got '{raw}'")),
    }
}
