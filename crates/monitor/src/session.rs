//! Monitoring session driver.
//!
//! [`MonitoringSession::connect`] opens the websocket and completes the
//! Socket.IO handshake within the configured timeout.
//! [`MonitoringSession::run`] then multiplexes relayed telemetry, the
//! script's completion, server directives and the stats heartbeat until
//! the session decides how the process ends. Lifecycle decisions are made
//! by [`SessionMachine`]; this module only performs the I/O they call for.

use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use scriptmux_core::monitoring::{MonitoringConfig, DEFAULT_PASS_STATS_INTERVAL_MS};

use crate::endpoint::{Endpoint, SessionIdentity};
use crate::error::SetupError;
use crate::events::{Inbound, Outbound};
use crate::protocol::{Packet, SocketPacket};
use crate::relay::SessionHandle;
use crate::state::{Effect, SessionMachine, SessionState, Trigger};
use crate::stats::StatsCollector;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a monitored run ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Exit the process with this code.
    Exited(i32),
    /// The server asked for immediate termination.
    Killed,
}

/// A decoded frame, reduced to what the session reacts to.
#[derive(Debug)]
enum Incoming {
    Open,
    Ping(String),
    Event(Inbound),
    Ignored,
}

#[derive(Debug)]
struct Connection {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
    namespace: String,
}

impl Connection {
    async fn send(&mut self, packet: Packet) -> Result<(), tungstenite::Error> {
        self.sink.send(Message::Text(packet.encode())).await
    }

    async fn emit(&mut self, event: Outbound) {
        let name = event.event_name();
        let packet = event.into_packet(&self.namespace);
        tracing::trace!(event = name, "Emitting monitoring event");
        if let Err(e) = self.send(packet).await {
            tracing::warn!(event = name, error = %e, "Failed to send monitoring event");
        }
    }

    /// Next meaningful frame; `None` once the transport is gone.
    async fn recv(&mut self) -> Option<Incoming> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => match Packet::decode(&text) {
                    Ok(packet) => return Some(self.classify(packet)),
                    Err(e) => {
                        tracing::warn!(error = %e, raw = %text, "Ignoring malformed monitoring frame");
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "Monitoring server closed the websocket");
                    return None;
                }
                Some(Ok(_)) => {
                    // Websocket-level ping/pong and binary frames.
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Monitoring websocket receive error");
                    return None;
                }
                None => return None,
            }
        }
    }

    fn classify(&self, packet: Packet) -> Incoming {
        match packet {
            Packet::Open(handshake) => {
                tracing::debug!(sid = %handshake.sid, "Engine.IO session opened");
                Incoming::Open
            }
            Packet::Ping(payload) => Incoming::Ping(payload),
            Packet::Close => Incoming::Event(Inbound::Disconnect),
            Packet::Message(message) if message.namespace() != self.namespace => {
                tracing::debug!(namespace = message.namespace(), "Ignoring packet for another namespace");
                Incoming::Ignored
            }
            Packet::Message(SocketPacket::Event { name, data, .. }) => {
                Incoming::Event(Inbound::from_event(&name, data))
            }
            Packet::Message(SocketPacket::ConnectError { data, .. }) => {
                Incoming::Event(Inbound::Error(data.unwrap_or(Value::Null)))
            }
            Packet::Message(SocketPacket::Disconnect { .. }) => Incoming::Event(Inbound::Disconnect),
            Packet::Message(SocketPacket::Connect { .. })
            | Packet::Pong(_)
            | Packet::Upgrade
            | Packet::Noop => Incoming::Ignored,
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            tracing::trace!(error = %e, "Websocket close failed");
        }
    }
}

/// A live, acknowledged monitoring session.
#[derive(Debug)]
pub struct MonitoringSession {
    config: MonitoringConfig,
    machine: SessionMachine,
    conn: Connection,
    stats: StatsCollector,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
}

impl MonitoringSession {
    /// Connect and wait for the server's acknowledgement.
    ///
    /// The connection timer covers both the transport connect and the
    /// handshake. `status:starting` has been emitted when this returns
    /// `Ok`.
    pub async fn connect(
        config: MonitoringConfig,
        identity: &SessionIdentity,
        stats: StatsCollector,
    ) -> Result<Self, SetupError> {
        let endpoint = Endpoint::build(&config.status_url, identity)?;
        let status_url = config.status_url.clone();
        let timeout = config.socket_connection_timeout;
        let timed_out = || SetupError::Timeout {
            url: status_url.clone(),
            timeout_ms: timeout.as_millis() as u64,
        };

        let mut machine = SessionMachine::new();
        machine.apply(Trigger::Open);

        tracing::debug!(url = %endpoint.url, namespace = %endpoint.namespace, "Connecting to monitoring server");

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let ws = tokio::select! {
            result = connect_async(endpoint.url.as_str()) => match result {
                Ok((ws, _response)) => ws,
                Err(e) => {
                    machine.apply(Trigger::ConnectionLost);
                    return Err(transport_error(&status_url, e));
                }
            },
            _ = &mut deadline => {
                machine.apply(Trigger::TimerFired);
                return Err(timed_out());
            }
        };

        let (sink, stream) = ws.split();
        let mut conn = Connection {
            sink,
            stream,
            namespace: endpoint.namespace,
        };

        loop {
            let incoming = tokio::select! {
                biased;
                incoming = conn.recv() => incoming,
                _ = &mut deadline => {
                    machine.apply(Trigger::TimerFired);
                    conn.close().await;
                    return Err(timed_out());
                }
            };

            let trigger = match incoming {
                None => Trigger::ConnectionLost,
                Some(Incoming::Open) => {
                    let join = Packet::Message(SocketPacket::connect(conn.namespace.clone()));
                    conn.send(join)
                        .await
                        .map_err(|e| transport_error(&status_url, e))?;
                    continue;
                }
                Some(Incoming::Ping(payload)) => {
                    conn.send(Packet::Pong(payload))
                        .await
                        .map_err(|e| transport_error(&status_url, e))?;
                    continue;
                }
                Some(Incoming::Ignored) => continue,
                Some(Incoming::Event(Inbound::Connected(rule_config))) => {
                    Trigger::Acknowledged(rule_config)
                }
                Some(Incoming::Event(Inbound::Error(reason))) => Trigger::ServerError(reason),
                Some(Incoming::Event(Inbound::Disconnect)) => Trigger::ConnectionLost,
                Some(Incoming::Event(other)) => {
                    tracing::debug!(event = ?other, "Ignoring event before acknowledgement");
                    continue;
                }
            };

            let rejection = match &trigger {
                Trigger::ServerError(reason) => Some(describe(reason)),
                _ => None,
            };

            for effect in machine.apply(trigger) {
                match effect {
                    Effect::EmitStarting => conn.emit(Outbound::Starting).await,
                    Effect::Teardown => conn.close().await,
                    _ => {}
                }
            }

            match machine.state() {
                SessionState::Connected => break,
                SessionState::Error => {
                    return Err(match rejection {
                        Some(reason) => SetupError::Server(reason),
                        None => SetupError::Closed,
                    });
                }
                _ => {}
            }
        }

        tracing::info!(
            url = %config.status_url,
            script_id = ?machine.script_id(),
            "Connected to monitoring server",
        );

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            machine,
            conn,
            stats,
            outbound_tx,
            outbound_rx,
        })
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    /// Rule payload from the server's acknowledgement.
    pub fn rule_config(&self) -> Option<&Value> {
        self.machine.rule_config()
    }

    pub fn script_id(&self) -> Option<String> {
        self.machine.script_id()
    }

    /// Telemetry sink feeding this session.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(
            self.machine.script_id(),
            self.config.ignore_warnings,
            self.outbound_tx.clone(),
        )
    }

    /// Drive the session until the run should end.
    ///
    /// `completion` resolves with the script's completion code; a dropped
    /// sender counts as code 1. Telemetry queued through a
    /// [`SessionHandle`] is always sent before a completion that follows
    /// it.
    pub async fn run(mut self, mut completion: oneshot::Receiver<i32>) -> SessionOutcome {
        self.machine.apply(Trigger::Start);
        let script_id = self.machine.script_id();

        let period = heartbeat_period(self.config.pass_stats_interval);
        let mut heartbeat = tokio::time::interval(period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut completed = false;

        loop {
            let trigger = tokio::select! {
                biased;
                Some(event) = self.outbound_rx.recv() => {
                    self.conn.emit(event).await;
                    continue;
                }
                code = &mut completion, if !completed => {
                    completed = true;
                    Trigger::Completed(code.unwrap_or(1))
                }
                incoming = self.conn.recv() => match incoming {
                    None => Trigger::ConnectionLost,
                    Some(Incoming::Ping(payload)) => {
                        if let Err(e) = self.conn.send(Packet::Pong(payload)).await {
                            tracing::warn!(error = %e, "Failed to answer monitoring ping");
                        }
                        continue;
                    }
                    Some(Incoming::Event(Inbound::Exit)) => Trigger::ExitDirective,
                    Some(Incoming::Event(Inbound::KillProcess)) => Trigger::KillDirective,
                    Some(Incoming::Event(Inbound::Disconnect)) => Trigger::ConnectionLost,
                    Some(Incoming::Event(other)) => {
                        tracing::debug!(event = ?other, "Ignoring monitoring event");
                        continue;
                    }
                    Some(Incoming::Open | Incoming::Ignored) => continue,
                },
                _ = heartbeat.tick() => {
                    let stats = Outbound::Stats {
                        script_id: script_id.clone(),
                        memory_usage: self.stats.memory_usage(),
                        up_time: self.stats.up_time(),
                    };
                    self.conn.emit(stats).await;
                    continue;
                }
            };

            let mut lost = false;
            for effect in self.machine.apply(trigger) {
                match effect {
                    Effect::EmitFinished(code) => {
                        tracing::debug!(code, "Script finished, waiting for exit directive");
                        self.conn
                            .emit(Outbound::Finished {
                                script_id: script_id.clone(),
                                code,
                            })
                            .await;
                    }
                    Effect::Exit(code) => {
                        self.conn.close().await;
                        return SessionOutcome::Exited(code);
                    }
                    Effect::Kill => {
                        tracing::info!("Monitoring server requested termination");
                        return SessionOutcome::Killed;
                    }
                    Effect::LostConnection => {
                        tracing::warn!(
                            url = %self.config.status_url,
                            "Lost connection to monitoring server, continuing without monitoring",
                        );
                        lost = true;
                    }
                    Effect::CancelTimer | Effect::EmitStarting | Effect::Teardown => {}
                }
            }

            if lost {
                break;
            }
        }

        // Only reachable while the script is still running.
        SessionOutcome::Exited(completion.await.unwrap_or(1))
    }
}

/// A zero period falls back to the default interval.
fn heartbeat_period(configured: Duration) -> Duration {
    if configured.is_zero() {
        Duration::from_millis(DEFAULT_PASS_STATS_INTERVAL_MS)
    } else {
        configured
    }
}

fn transport_error(url: &str, source: tungstenite::Error) -> SetupError {
    SetupError::Transport {
        url: url.to_string(),
        source: Box::new(source),
    }
}

/// Human-readable reason from a `status:error` payload.
fn describe(reason: &Value) -> String {
    match reason {
        Value::String(text) => text.clone(),
        Value::Object(map) => match map.get("message") {
            Some(Value::String(text)) => text.clone(),
            _ => reason.to_string(),
        },
        Value::Null => "no reason given".to_string(),
        other => other.to_string(),
    }
}
