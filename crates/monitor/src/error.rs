use scriptmux_core::monitoring::MonitoringConfigError;
use tokio_tungstenite::tungstenite;

use crate::protocol::ProtocolError;

/// Reasons a monitoring session could not be established.
///
/// None of these are fatal to the run: the dispatcher logs them and runs
/// the script without monitoring.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] MonitoringConfigError),

    #[error("Invalid monitoring URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Could not reach monitoring server at {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<tungstenite::Error>,
    },

    #[error("Monitoring server at {url} did not acknowledge within {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("Monitoring server rejected the session: {0}")]
    Server(String),

    #[error("Monitoring server closed the connection during the handshake")]
    Closed,

    #[error("Monitoring protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
