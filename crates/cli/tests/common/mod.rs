//! Shared fixtures for dispatcher tests: a recording engine and a minimal
//! Socket.IO peer.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use scriptmux_core::engine::{EngineError, ScriptEngine};
use scriptmux_core::invocation::Invocation;
use scriptmux_core::manifest::{ArgumentSpec, ScriptManifest};
use scriptmux_core::runtime::EngineConfig;
use scriptmux_core::telemetry::TelemetrySink;
use scriptmux_monitor::protocol::{Packet, SocketPacket};

pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Manifests
// ---------------------------------------------------------------------------

/// `sync <source> [target] [-f|--force]`
pub fn sync_manifest() -> ScriptManifest {
    ScriptManifest {
        name: "sync".to_string(),
        description: "Synchronize records".to_string(),
        version: Some("1.0.0".to_string()),
        main: Some("index.sh".to_string()),
        directory: PathBuf::from("/srv/apps/billing/scripts/sync"),
        arguments: vec![
            ArgumentSpec {
                name: "source".to_string(),
                short_name: None,
                long_name: None,
                required: true,
                is_argument: true,
                description: "Where to read from".to_string(),
                value_name: None,
            },
            ArgumentSpec {
                name: "target".to_string(),
                short_name: None,
                long_name: None,
                required: false,
                is_argument: true,
                description: "Where to write to".to_string(),
                value_name: None,
            },
            ArgumentSpec {
                name: "force".to_string(),
                short_name: Some("f".to_string()),
                long_name: Some("force".to_string()),
                required: false,
                is_argument: false,
                description: "Overwrite existing records".to_string(),
                value_name: None,
            },
        ],
        use_lock_file: false,
        monitoring: None,
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Exit(i32),
    Fail,
    /// Never completes on its own.
    Hang,
}

#[derive(Debug, Clone)]
pub struct RecordedRun {
    pub invocation: Invocation,
    pub config: EngineConfig,
    pub monitored: bool,
}

#[derive(Debug, Default)]
pub struct Recorder {
    pub runs: Mutex<Vec<RecordedRun>>,
    pub stops: AtomicUsize,
}

impl Recorder {
    pub fn runs(&self) -> Vec<RecordedRun> {
        self.runs.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

pub struct FakeEngine {
    behavior: Behavior,
    console: Option<String>,
    recorder: Arc<Recorder>,
}

impl FakeEngine {
    pub fn new(behavior: Behavior) -> (Self, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let engine = Self {
            behavior,
            console: None,
            recorder: Arc::clone(&recorder),
        };
        (engine, recorder)
    }

    /// Write `text` to the console before completing.
    pub fn with_console(mut self, text: &str) -> Self {
        self.console = Some(text.to_string());
        self
    }
}

impl ScriptEngine for FakeEngine {
    async fn run(
        &self,
        invocation: Invocation,
        config: EngineConfig,
        telemetry: Option<Arc<dyn TelemetrySink>>,
    ) -> Result<i32, EngineError> {
        let name = invocation.name().to_string();
        self.recorder.runs.lock().unwrap().push(RecordedRun {
            invocation,
            config,
            monitored: telemetry.is_some(),
        });

        if let (Some(text), Some(sink)) = (&self.console, &telemetry) {
            sink.console(text);
        }

        match self.behavior {
            Behavior::Exit(code) => Ok(code),
            Behavior::Fail => Err(EngineError::NoEntryPoint(name)),
            Behavior::Hang => std::future::pending().await,
        }
    }

    fn stop(&self) {
        self.recorder.stops.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Monitoring server
// ---------------------------------------------------------------------------

pub struct Peer {
    ws: WebSocketStream<TcpStream>,
}

impl Peer {
    pub async fn accept(listener: &TcpListener) -> Self {
        let (tcp, _) = tokio::time::timeout(STEP_TIMEOUT, listener.accept())
            .await
            .expect("client connected in time")
            .unwrap();
        let ws = accept_async(tcp).await.unwrap();
        Self { ws }
    }

    pub async fn send_raw(&mut self, frame: &str) {
        self.ws.send(Message::Text(frame.to_string())).await.unwrap();
    }

    pub async fn send_event(&mut self, name: &str, data: Option<Value>) {
        let frame = Packet::Message(SocketPacket::event("/", name, data)).encode();
        self.send_raw(&frame).await;
    }

    /// Next Socket.IO event; `None` once the client has gone away.
    pub async fn next_event(&mut self) -> Option<(String, Option<Value>)> {
        loop {
            let message = tokio::time::timeout(STEP_TIMEOUT, self.ws.next())
                .await
                .expect("frame arrived in time");
            let text = match message {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
                Some(Ok(_)) => continue,
            };
            if let Ok(Packet::Message(SocketPacket::Event { name, data, .. })) = Packet::decode(&text)
            {
                if name != "event:stats" {
                    return Some((name, data));
                }
            }
        }
    }

    /// Open, wait for the namespace join, acknowledge and expect
    /// `status:starting`.
    pub async fn handshake(&mut self, rule_config: Value) {
        self.send_raw(r#"0{"sid":"cli-test","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#)
            .await;
        let join = tokio::time::timeout(STEP_TIMEOUT, self.ws.next())
            .await
            .expect("connect packet in time");
        assert!(matches!(join, Some(Ok(Message::Text(ref t))) if t == "40"));

        self.send_event("status:connected", Some(rule_config)).await;
        let (name, _) = self.next_event().await.expect("status:starting");
        assert_eq!(name, "status:starting");
    }
}
