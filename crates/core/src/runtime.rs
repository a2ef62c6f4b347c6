//! Run stage, log levels, and the configuration bundle given to an engine.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::context::AppPaths;

/// Deployment stage a script runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Prod,
    View,
    Dev,
}

impl Stage {
    /// Every stage an engine may be asked to run under.
    pub const ALL: [Stage; 3] = [Stage::Prod, Stage::View, Stage::Dev];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Prod => "prod",
            Stage::View => "view",
            Stage::Dev => "dev",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown stage '{0}' (expected prod, view or dev)")]
pub struct UnknownStage(pub String);

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Ok(Stage::Prod),
            "view" => Ok(Stage::View),
            "dev" | "development" => Ok(Stage::Dev),
            other => Err(UnknownStage(other.to_string())),
        }
    }
}

/// Verbosity resolved from the global flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything an engine needs to know about the environment it runs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub stage: Stage,
    pub stages: Vec<Stage>,
    pub paths: AppPaths,
    pub log_level_console: LogLevel,
    pub log_level_file: LogLevel,
    pub log_level_remote: LogLevel,
    pub quiet: bool,
}

impl EngineConfig {
    /// Bundle with the same level on every log channel.
    pub fn new(stage: Stage, paths: AppPaths, log_level: LogLevel, quiet: bool) -> Self {
        Self {
            stage,
            stages: Stage::ALL.to_vec(),
            paths,
            log_level_console: log_level,
            log_level_file: log_level,
            log_level_remote: log_level,
            quiet,
        }
    }
}
