//! Telemetry relay from the running script to the monitoring session.

use std::panic;

use tokio::sync::mpsc::UnboundedSender;

use scriptmux_core::telemetry::{RuntimeSignal, TelemetrySink};

use crate::ansi::strip_ansi;
use crate::events::Outbound;

/// Cloneable sender side of a connected session.
///
/// Events are queued for the session loop; after the session has closed
/// they are dropped silently.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    script_id: Option<String>,
    ignore_warnings: bool,
    outbound: UnboundedSender<Outbound>,
}

impl SessionHandle {
    pub(crate) fn new(
        script_id: Option<String>,
        ignore_warnings: bool,
        outbound: UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            script_id,
            ignore_warnings,
            outbound,
        }
    }

    pub fn script_id(&self) -> Option<&str> {
        self.script_id.as_deref()
    }

    fn send(&self, event: Outbound) {
        if self.outbound.send(event).is_err() {
            tracing::trace!("Monitoring session closed, dropping event");
        }
    }
}

impl TelemetrySink for SessionHandle {
    fn console(&self, text: &str) {
        self.send(Outbound::Console {
            script_id: self.script_id.clone(),
            data: strip_ansi(text),
        });
    }

    fn signal(&self, signal: RuntimeSignal) {
        if self.ignore_warnings && signal.is_warning() {
            return;
        }
        self.send(Outbound::Signal {
            script_id: self.script_id.clone(),
            signal,
        });
    }
}

/// Relay panics as `event:uncaughtException`, then defer to the
/// previously installed hook.
pub fn install_panic_relay(handle: SessionHandle) {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        handle.signal(RuntimeSignal::UncaughtException(info.to_string()));
        previous(info);
    }));
}
