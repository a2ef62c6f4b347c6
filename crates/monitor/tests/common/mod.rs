//! In-process Socket.IO server double for session tests.
//!
//! Speaks just enough Engine.IO v4 / Socket.IO v4 over a plain websocket
//! to drive a [`MonitoringSession`](scriptmux_monitor::MonitoringSession)
//! through its lifecycle.

#![allow(dead_code)]

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

use scriptmux_core::monitoring::MonitoringConfig;
use scriptmux_monitor::protocol::{Packet, SocketPacket};

/// Upper bound on any single wait in a test.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

pub const OPEN_FRAME: &str =
    r#"0{"sid":"test-sid","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

pub struct MockServer {
    listener: TcpListener,
    pub url: String,
}

impl MockServer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        Self { listener, url }
    }

    /// Monitoring config pointing at this server with short test timings.
    pub fn config(&self) -> MonitoringConfig {
        MonitoringConfig {
            socket_connection_timeout: Duration::from_secs(2),
            pass_stats_interval: Duration::from_secs(60),
            ..MonitoringConfig::new(self.url.clone())
        }
    }

    /// Accept one websocket client and record its request URI.
    pub async fn accept(&self) -> Peer {
        let (tcp, _) = tokio::time::timeout(STEP_TIMEOUT, self.listener.accept())
            .await
            .expect("client connected in time")
            .unwrap();

        let mut uri = String::new();
        let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            uri = request.uri().to_string();
            Ok(response)
        };
        let ws = accept_hdr_async(tcp, callback).await.unwrap();

        Peer { ws, uri }
    }

    /// Accept a TCP connection and never answer it.
    pub async fn accept_silently(&self) -> TcpStream {
        let (tcp, _) = self.listener.accept().await.unwrap();
        tcp
    }
}

pub struct Peer {
    ws: WebSocketStream<TcpStream>,
    pub uri: String,
}

impl Peer {
    pub async fn send_raw(&mut self, frame: &str) {
        self.ws.send(Message::Text(frame.to_string())).await.unwrap();
    }

    /// Send a frame the client may no longer be around to receive.
    pub async fn try_send_raw(&mut self, frame: &str) -> bool {
        self.ws.send(Message::Text(frame.to_string())).await.is_ok()
    }

    pub async fn send_event(&mut self, name: &str, data: Option<Value>) {
        let frame = Packet::Message(SocketPacket::event("/", name, data)).encode();
        self.send_raw(&frame).await;
    }

    /// Next text frame, or `None` once the client has gone away.
    pub async fn next_text(&mut self) -> Option<String> {
        loop {
            let message = tokio::time::timeout(STEP_TIMEOUT, self.ws.next())
                .await
                .expect("frame arrived in time");
            match message {
                Some(Ok(Message::Text(text))) => return Some(text),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
                Some(Ok(_)) => {}
            }
        }
    }

    /// Open the Engine.IO session and wait for the namespace join.
    pub async fn open(&mut self) {
        self.send_raw(OPEN_FRAME).await;
        let join = self.next_text().await.expect("connect packet");
        assert_eq!(join, "40");
    }

    /// Full handshake: open, acknowledge with `rule_config`, expect
    /// `status:starting`.
    pub async fn handshake(&mut self, rule_config: Value) {
        self.open().await;
        self.send_event("status:connected", Some(rule_config)).await;
        let (name, _) = self.next_event().await.expect("status:starting");
        assert_eq!(name, "status:starting");
    }

    /// Next Socket.IO event, skipping everything else.
    pub async fn next_event(&mut self) -> Option<(String, Option<Value>)> {
        loop {
            let text = self.next_text().await?;
            if let Ok(Packet::Message(SocketPacket::Event { name, data, .. })) = Packet::decode(&text)
            {
                return Some((name, data));
            }
        }
    }

    /// Next event other than the stats heartbeat.
    pub async fn next_non_stats_event(&mut self) -> Option<(String, Option<Value>)> {
        loop {
            let (name, data) = self.next_event().await?;
            if name != "event:stats" {
                return Some((name, data));
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
