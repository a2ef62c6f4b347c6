//! Script execution seam.
//!
//! Defines [`ScriptEngine`], the trait the dispatcher hands a resolved
//! [`Invocation`] to, and [`EngineError`]. [`subprocess::SubprocessEngine`]
//! is the default implementation.

pub mod subprocess;

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use crate::invocation::Invocation;
use crate::runtime::EngineConfig;
use crate::telemetry::TelemetrySink;

pub use subprocess::SubprocessEngine;

/// Errors an engine can fail a run with.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Script '{0}' declares no entry point (\"main\" in package.json)")]
    NoEntryPoint(String),

    #[error("Script '{name}' is already running (lock file {})", path.display())]
    Locked { name: String, path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Runs a script's own logic.
///
/// `run` resolves with the script's completion code once the script is
/// done. `stop` releases anything the engine still holds and is called
/// once before the process exits.
pub trait ScriptEngine: Send + Sync + 'static {
    fn run(
        &self,
        invocation: Invocation,
        config: EngineConfig,
        telemetry: Option<Arc<dyn TelemetrySink>>,
    ) -> impl Future<Output = Result<i32, EngineError>> + Send;

    fn stop(&self);
}
