use scriptmux_core::context::ConfigError;
use scriptmux_core::manifest::ManifestError;

/// Problems with the command line the user typed.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing argument {0}!")]
    MissingArgument(String),

    #[error("Can't use {0} and {1} at the same time!")]
    ConflictingFlags(&'static str, &'static str),

    #[error("Invalid command line: {0}")]
    Unparseable(String),
}

impl From<clap::Error> for ValidationError {
    fn from(err: clap::Error) -> Self {
        let rendered = err.render().to_string();
        let message = rendered
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default();
        ValidationError::Unparseable(message.trim_start_matches("error: ").to_string())
    }
}

/// Problems building the command set from the loaded manifests.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("No scripts found")]
    NoScripts,

    #[error("Script '{script}': {flag} of argument '{argument}' collides with {other}")]
    FlagCollision {
        script: String,
        argument: String,
        flag: String,
        other: String,
    },
}

/// Everything that stops the dispatcher before a script runs.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Printed together with `help`.
    #[error("{error}")]
    Usage { error: ValidationError, help: String },
}

impl CliError {
    /// Help text to show along with the error.
    pub fn help(&self) -> Option<&str> {
        match self {
            CliError::Usage { help, .. } => Some(help),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        assert_eq!(
            ValidationError::MissingArgument("--source".to_string()).to_string(),
            "Missing argument --source!"
        );
        assert_eq!(
            ValidationError::ConflictingFlags("--verbose", "--quiet").to_string(),
            "Can't use --verbose and --quiet at the same time!"
        );
        assert_eq!(
            RegistryError::FlagCollision {
                script: "sync".to_string(),
                argument: "version".to_string(),
                flag: "-v".to_string(),
                other: "the global options".to_string(),
            }
            .to_string(),
            "Script 'sync': -v of argument 'version' collides with the global options"
        );
    }

    #[test]
    fn usage_error_carries_help() {
        let err = CliError::Usage {
            error: ValidationError::MissingArgument("source".to_string()),
            help: "Usage: scriptmux sync".to_string(),
        };
        assert_eq!(err.to_string(), "Missing argument source!");
        assert_eq!(err.help(), Some("Usage: scriptmux sync"));
        assert_eq!(CliError::from(RegistryError::NoScripts).help(), None);
    }
}
