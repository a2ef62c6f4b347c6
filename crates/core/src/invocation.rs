//! Per-run data resolved from the command line.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::manifest::ScriptManifest;

/// Resolved value of an option argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OptionValue {
    Switch(bool),
    Value(String),
}

/// A selected script together with everything resolved for this run.
///
/// Options and positional arguments are keyed by the argument's `name`.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub manifest: Arc<ScriptManifest>,
    pub arguments: BTreeMap<String, String>,
    pub options: BTreeMap<String, OptionValue>,
    /// Rule payload assigned by the monitoring service, if connected.
    pub rule_config: Option<Value>,
}

impl Invocation {
    pub fn new(manifest: Arc<ScriptManifest>) -> Self {
        Self {
            manifest,
            arguments: BTreeMap::new(),
            options: BTreeMap::new(),
            rule_config: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Positional values in the order the manifest declares them.
    pub fn positional_values(&self) -> Vec<&str> {
        self.manifest
            .positionals()
            .filter_map(|spec| self.arguments.get(&spec.name).map(String::as_str))
            .collect()
    }
}
