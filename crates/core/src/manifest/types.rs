//! Manifest data model.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::loader::ManifestError;
use crate::monitoring::MonitoringOverride;

/// Contents of a script's `package.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: Option<String>,
    /// Entry point relative to the script directory.
    #[serde(default)]
    pub main: Option<String>,
}

/// Contents of a script's `script.json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptDescriptor {
    #[serde(default)]
    pub arguments: Vec<ArgumentSpec>,
    #[serde(default)]
    pub use_lock_file: bool,
    #[serde(default)]
    pub monitoring: Option<MonitoringOverride>,
}

/// One declared command-line argument of a script.
///
/// An argument is either positional (`isArgument: true`) or an option
/// reachable through at least one of `shortName` / `longName`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentSpec {
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub long_name: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub is_argument: bool,
    #[serde(default)]
    pub description: String,
    /// When set, the option takes a value rendered as `<valueName>` in help.
    #[serde(default)]
    pub value_name: Option<String>,
}

impl ArgumentSpec {
    /// Short flag letter: the first character of `shortName`, lowercased.
    pub fn short_flag(&self) -> Option<char> {
        self.short_name
            .as_deref()
            .and_then(|s| s.chars().next())
            .and_then(|c| c.to_lowercase().next())
    }

    /// Long flag word, ignoring empty strings.
    pub fn long_flag(&self) -> Option<&str> {
        self.long_name.as_deref().filter(|s| !s.is_empty())
    }

    pub fn is_positional(&self) -> bool {
        self.is_argument
    }

    pub fn takes_value(&self) -> bool {
        !self.is_argument && self.value_name.is_some()
    }

    /// Name shown to the user when this argument is missing.
    pub fn display_name(&self) -> String {
        if self.is_argument {
            return self.name.clone();
        }
        match (self.long_flag(), self.short_flag()) {
            (Some(long), _) => format!("--{long}"),
            (None, Some(short)) => format!("-{short}"),
            (None, None) => self.name.clone(),
        }
    }

    /// Flag column used in help output, e.g. `-o, --out <file>`.
    pub fn flags_display(&self) -> String {
        if self.is_argument {
            return if self.required {
                format!("<{}>", self.name)
            } else {
                format!("[{}]", self.name)
            };
        }

        let mut forms = Vec::with_capacity(2);
        if let Some(short) = self.short_flag() {
            forms.push(format!("-{short}"));
        }
        if let Some(long) = self.long_flag() {
            forms.push(format!("--{long}"));
        }
        let mut flags = forms.join(", ");
        if let Some(value) = self.value_name.as_deref() {
            flags.push_str(&format!(" <{value}>"));
        }
        flags
    }
}

/// A discovered script: package metadata merged with its configuration.
///
/// Built once by the loader and treated as read-only afterwards; the
/// per-invocation data lives on [`crate::invocation::Invocation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptManifest {
    pub name: String,
    pub description: String,
    pub version: Option<String>,
    pub main: Option<String>,
    /// Directory the descriptors were read from.
    pub directory: PathBuf,
    pub arguments: Vec<ArgumentSpec>,
    pub use_lock_file: bool,
    pub monitoring: Option<MonitoringOverride>,
}

impl ScriptManifest {
    /// Merge the two descriptors of `directory` into a manifest.
    pub fn assemble(
        directory: PathBuf,
        package: PackageDescriptor,
        script: ScriptDescriptor,
    ) -> Result<Self, ManifestError> {
        if package.name.trim().is_empty() {
            return Err(ManifestError::MissingName { directory });
        }

        validate_arguments(&package.name, &script.arguments)?;

        Ok(Self {
            name: package.name,
            description: package.description,
            version: package.version,
            main: package.main,
            directory,
            arguments: script.arguments,
            use_lock_file: script.use_lock_file,
            monitoring: script.monitoring,
        })
    }

    /// Positional arguments in declared order.
    pub fn positionals(&self) -> impl Iterator<Item = &ArgumentSpec> {
        self.arguments.iter().filter(|a| a.is_positional())
    }

    /// Option arguments in declared order.
    pub fn options(&self) -> impl Iterator<Item = &ArgumentSpec> {
        self.arguments.iter().filter(|a| !a.is_positional())
    }
}

fn validate_arguments(script: &str, arguments: &[ArgumentSpec]) -> Result<(), ManifestError> {
    let invalid = |argument: &ArgumentSpec, reason: &'static str| ManifestError::InvalidArgument {
        script: script.to_string(),
        argument: argument.name.clone(),
        reason,
    };

    let mut seen = HashSet::new();
    for argument in arguments {
        if argument.name.trim().is_empty() {
            return Err(invalid(argument, "argument name is empty"));
        }
        if !seen.insert(argument.name.as_str()) {
            return Err(invalid(argument, "argument name is declared twice"));
        }
        if !argument.is_argument && argument.short_flag().is_none() && argument.long_flag().is_none()
        {
            return Err(invalid(argument, "option needs a shortName or a longName"));
        }
    }
    Ok(())
}
