//! Seam between a running script and whatever relays its telemetry.
//!
//! Engines report output and runtime signals through a [`TelemetrySink`]
//! when one is attached. Reporting never changes the local effect of the
//! signal: output is still printed, errors still propagate.

/// A process-level occurrence raised while a script runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeSignal {
    Warning(String),
    UnhandledRejection(String),
    RejectionHandled(String),
    UncaughtException(String),
}

impl RuntimeSignal {
    pub fn is_warning(&self) -> bool {
        matches!(self, RuntimeSignal::Warning(_))
    }

    pub fn message(&self) -> &str {
        match self {
            RuntimeSignal::Warning(m)
            | RuntimeSignal::UnhandledRejection(m)
            | RuntimeSignal::RejectionHandled(m)
            | RuntimeSignal::UncaughtException(m) => m,
        }
    }
}

/// Receiver of script output and runtime signals.
pub trait TelemetrySink: Send + Sync {
    /// Text the script wrote to standard output.
    fn console(&self, text: &str);

    fn signal(&self, signal: RuntimeSignal);
}
