//! Monitoring event names and payloads.

use serde_json::{json, Value};

use scriptmux_core::telemetry::RuntimeSignal;

use crate::protocol::{Packet, SocketPacket};
use crate::stats::MemoryUsage;

pub const STATUS_STARTING: &str = "status:starting";
pub const STATUS_FINISHED: &str = "status:finished";
pub const EVENT_STATS: &str = "event:stats";
pub const EVENT_CONSOLE: &str = "event:console";
pub const EVENT_WARNING: &str = "event:warning";
pub const EVENT_UNHANDLED_REJECTION: &str = "event:unhandledRejection";
pub const EVENT_REJECTION_HANDLED: &str = "event:rejectionHandled";
pub const EVENT_UNCAUGHT_EXCEPTION: &str = "event:uncaughtException";

pub const STATUS_CONNECTED: &str = "status:connected";
pub const STATUS_ERROR: &str = "status:error";
pub const STATUS_EXIT: &str = "status:exit";
pub const ACTION_KILL_PROCESS: &str = "action:killProcess";
pub const DISCONNECT: &str = "disconnect";

/// Events the runner sends to the monitoring server.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Starting,
    Stats {
        script_id: Option<String>,
        memory_usage: MemoryUsage,
        up_time: f64,
    },
    Console {
        script_id: Option<String>,
        data: String,
    },
    Signal {
        script_id: Option<String>,
        signal: RuntimeSignal,
    },
    Finished {
        script_id: Option<String>,
        code: i32,
    },
}

impl Outbound {
    pub fn event_name(&self) -> &'static str {
        match self {
            Outbound::Starting => STATUS_STARTING,
            Outbound::Stats { .. } => EVENT_STATS,
            Outbound::Console { .. } => EVENT_CONSOLE,
            Outbound::Signal { signal, .. } => match signal {
                RuntimeSignal::Warning(_) => EVENT_WARNING,
                RuntimeSignal::UnhandledRejection(_) => EVENT_UNHANDLED_REJECTION,
                RuntimeSignal::RejectionHandled(_) => EVENT_REJECTION_HANDLED,
                RuntimeSignal::UncaughtException(_) => EVENT_UNCAUGHT_EXCEPTION,
            },
            Outbound::Finished { .. } => STATUS_FINISHED,
        }
    }

    pub fn payload(&self) -> Option<Value> {
        match self {
            Outbound::Starting => None,
            Outbound::Stats {
                script_id,
                memory_usage,
                up_time,
            } => Some(json!({
                "scriptId": script_id,
                "memoryUsage": memory_usage,
                "upTime": up_time,
            })),
            Outbound::Console { script_id, data } => Some(json!({
                "scriptId": script_id,
                "data": data,
            })),
            Outbound::Signal { script_id, signal } => Some(json!({
                "scriptId": script_id,
                "data": signal.message(),
            })),
            Outbound::Finished { script_id, code } => Some(json!({
                "scriptId": script_id,
                "data": code,
            })),
        }
    }

    pub fn into_packet(self, namespace: &str) -> Packet {
        let data = self.payload();
        Packet::Message(SocketPacket::event(namespace, self.event_name(), data))
    }
}

/// Events the monitoring server sends to the runner.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Acknowledgement carrying the rule configuration.
    Connected(Value),
    Error(Value),
    Disconnect,
    Exit,
    KillProcess,
    Other(String),
}

impl Inbound {
    pub fn from_event(name: &str, data: Option<Value>) -> Self {
        match name {
            STATUS_CONNECTED => Inbound::Connected(data.unwrap_or(Value::Null)),
            STATUS_ERROR => Inbound::Error(data.unwrap_or(Value::Null)),
            DISCONNECT => Inbound::Disconnect,
            STATUS_EXIT => Inbound::Exit,
            ACTION_KILL_PROCESS => Inbound::KillProcess,
            other => Inbound::Other(other.to_string()),
        }
    }
}
