//! Engine.IO v4 / Socket.IO v4 text framing.
//!
//! Every websocket text frame is one Engine.IO packet: a type digit and an
//! optional payload. Message packets (`4`) wrap a Socket.IO packet: a type
//! digit, an optional `/namespace,` prefix, an optional ack id and an
//! optional JSON body. Binary attachments and acks are not used by the
//! monitoring protocol and are rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_NAMESPACE: &str = "/";

/// Payload of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

/// One Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// One Socket.IO packet carried in an Engine.IO message.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        name: String,
        data: Option<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    Empty,

    #[error("unknown packet type '{0}'")]
    UnknownType(char),

    #[error("unsupported Socket.IO packet type '{0}'")]
    Unsupported(char),

    #[error("malformed event: {0}")]
    MalformedEvent(&'static str),

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl Packet {
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        let rest = chars.as_str();

        match kind {
            '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping(rest.to_string())),
            '3' => Ok(Packet::Pong(rest.to_string())),
            '4' => Ok(Packet::Message(SocketPacket::decode(rest)?)),
            '5' => Ok(Packet::Upgrade),
            '6' => Ok(Packet::Noop),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Packet::Open(handshake) => {
                format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
            }
            Packet::Close => "1".to_string(),
            Packet::Ping(payload) => format!("2{payload}"),
            Packet::Pong(payload) => format!("3{payload}"),
            Packet::Message(packet) => format!("4{}", packet.encode()),
            Packet::Upgrade => "5".to_string(),
            Packet::Noop => "6".to_string(),
        }
    }
}

impl SocketPacket {
    pub fn connect(namespace: impl Into<String>) -> Self {
        SocketPacket::Connect {
            namespace: namespace.into(),
            data: None,
        }
    }

    pub fn event(namespace: impl Into<String>, name: impl Into<String>, data: Option<Value>) -> Self {
        SocketPacket::Event {
            namespace: namespace.into(),
            name: name.into(),
            data,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace, .. }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::ConnectError { namespace, .. } => namespace,
        }
    }

    fn decode(body: &str) -> Result<Self, ProtocolError> {
        let mut chars = body.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        let mut rest = chars.as_str();

        match kind {
            '0' | '1' | '2' | '4' => {}
            '3' | '5' | '6' => return Err(ProtocolError::Unsupported(kind)),
            other => return Err(ProtocolError::UnknownType(other)),
        }

        let namespace = if rest.starts_with('/') {
            let end = rest.find(',').unwrap_or(rest.len());
            let namespace = &rest[..end];
            rest = rest.get(end + 1..).unwrap_or("");
            namespace
        } else {
            DEFAULT_NAMESPACE
        }
        .to_string();

        // Ack id, unused by this protocol.
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        rest = &rest[digits..];

        let data = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(rest)?)
        };

        Ok(match kind {
            '0' => SocketPacket::Connect { namespace, data },
            '1' => SocketPacket::Disconnect { namespace },
            '2' => {
                let (name, data) = split_event(data)?;
                SocketPacket::Event {
                    namespace,
                    name,
                    data,
                }
            }
            _ => SocketPacket::ConnectError { namespace, data },
        })
    }

    fn encode(&self) -> String {
        let (kind, body) = match self {
            SocketPacket::Connect { data, .. } => ('0', data.clone()),
            SocketPacket::Disconnect { .. } => ('1', None),
            SocketPacket::Event { name, data, .. } => {
                let mut args = vec![Value::String(name.clone())];
                args.extend(data.clone());
                ('2', Some(Value::Array(args)))
            }
            SocketPacket::ConnectError { data, .. } => ('4', data.clone()),
        };

        let mut out = String::new();
        out.push(kind);
        if self.namespace() != DEFAULT_NAMESPACE {
            out.push_str(self.namespace());
            out.push(',');
        }
        if let Some(body) = body {
            out.push_str(&body.to_string());
        }
        out
    }
}

/// Split an event body `["name", payload?]` into its parts.
fn split_event(data: Option<Value>) -> Result<(String, Option<Value>), ProtocolError> {
    let Some(Value::Array(mut args)) = data else {
        return Err(ProtocolError::MalformedEvent("event body is not an array"));
    };
    if args.is_empty() {
        return Err(ProtocolError::MalformedEvent("event has no name"));
    }
    let Value::String(name) = args.remove(0) else {
        return Err(ProtocolError::MalformedEvent("event name is not a string"));
    };
    let payload = if args.is_empty() {
        None
    } else {
        Some(args.remove(0))
    };
    Ok((name, payload))
}
