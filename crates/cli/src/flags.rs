//! Global command-line flags and what they resolve to.

use clap::{Arg, Args, Command};

use scriptmux_core::runtime::{LogLevel, Stage};

use crate::error::ValidationError;
use crate::help::OptionHelp;

/// Flags accepted before or after any script command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Args)]
pub struct GlobalFlags {
    #[arg(short = 'h', long, global = true, help = "output usage information")]
    pub help: bool,

    #[arg(short = 'v', long, global = true, help = "Script verbosity")]
    pub verbose: bool,

    #[arg(short = 'q', long, global = true, help = "Disables script output")]
    pub quiet: bool,

    #[arg(short = 'V', long, global = true, help = "Enables view stage")]
    pub view: bool,

    #[arg(short = 'd', long, global = true, help = "Enables dev stage")]
    pub dev: bool,
}

impl GlobalFlags {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.verbose && self.quiet {
            return Err(ValidationError::ConflictingFlags("--verbose", "--quiet"));
        }
        if self.view && self.dev {
            return Err(ValidationError::ConflictingFlags("--view", "--dev"));
        }
        Ok(())
    }

    /// View flag, then dev flag, then the environment, then dev.
    pub fn stage(&self, env_stage: Option<Stage>) -> Stage {
        if self.view {
            Stage::View
        } else if self.dev {
            Stage::Dev
        } else {
            env_stage.unwrap_or(Stage::Dev)
        }
    }

    pub fn log_level(&self) -> LogLevel {
        if self.quiet {
            LogLevel::Error
        } else if self.dev || self.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        }
    }
}

/// The global flag definitions, in help order.
pub fn global_args() -> Vec<Arg> {
    GlobalFlags::augment_args(Command::new("global"))
        .get_arguments()
        .cloned()
        .collect()
}

/// Help lines for the global flags.
pub fn global_option_help() -> Vec<OptionHelp> {
    global_args().iter().map(OptionHelp::from_arg).collect()
}
