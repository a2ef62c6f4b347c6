//! Remote monitoring for script runs.
//!
//! A run with a monitoring `statusUrl` opens a Socket.IO session, waits for
//! the server to acknowledge it with a rule configuration, then streams
//! console output, runtime signals and process statistics until the server
//! lets the process exit.

pub mod ansi;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod state;
pub mod stats;

pub use endpoint::SessionIdentity;
pub use error::SetupError;
pub use relay::{install_panic_relay, SessionHandle};
pub use session::{MonitoringSession, SessionOutcome};
pub use stats::StatsCollector;
