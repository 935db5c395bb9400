//! Socket.IO wire format over a WebSocket transport
//!
//! # Layering
//!
//! The analysis service speaks Socket.IO v5 on top of Engine.IO v4. Over a
//! WebSocket every text message is one Engine.IO packet:
//!
//! ```text
//! ┌──────────────┬───────────────────────────────┐
//! │ Type (1 char)│ Data (rest of the message)    │
//! └──────────────┴───────────────────────────────┘
//!   0 open   1 close   2 ping   3 pong   4 message   5 upgrade   6 noop
//! ```
//!
//! A `message` packet carries one Socket.IO packet:
//!
//! ```text
//! <type>[<namespace>,][<ack id>][<json payload>]
//!   0 connect   1 disconnect   2 event   3 ack   4 connect_error
//! ```
//!
//! so a frame event looks like `42["frame","/9j/4AAQ..."]`.
//!
//! # Session Flow
//!
//! 1. Server sends `0{"sid":...,"pingInterval":...}` (Engine.IO open)
//! 2. Client sends `40` (connect to the default namespace)
//! 3. Server answers `40{"sid":...}`
//! 4. Server pushes `42[...]` events; on `2` the client answers `3`. A server
//!    silent for longer than `pingInterval + pingTimeout` counts as gone
//! 5. Client leaves with `41`, then closes the socket
//!
//! Binary attachments are not used by the service and are rejected.

use crate::error::{ClientError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Engine.IO server defaults, used when the open packet leaves them out.
const DEFAULT_PING_INTERVAL_MS: u64 = 25_000;
const DEFAULT_PING_TIMEOUT_MS: u64 = 20_000;

/// Payload of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

impl OpenHandshake {
    /// How long to wait for the next server ping before giving up on the peer.
    pub fn heartbeat_window(&self) -> Duration {
        let interval = if self.ping_interval == 0 { DEFAULT_PING_INTERVAL_MS } else { self.ping_interval };
        let timeout = if self.ping_timeout == 0 { DEFAULT_PING_TIMEOUT_MS } else { self.ping_timeout };
        Duration::from_millis(interval.saturating_add(timeout))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ClientError::Protocol("empty engine packet".into()))?;
        let data = chars.as_str();
        match kind {
            '0' => Ok(Self::Open(serde_json::from_str(data)?)),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(data.to_string())),
            '3' => Ok(Self::Pong(data.to_string())),
            '4' => Ok(Self::Message(data.to_string())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(ClientError::Protocol(format!("unknown engine packet type {other:?}"))),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            // Clients never send `open`; encode it for completeness.
            Self::Open(open) => format!("0{{\"sid\":\"{}\"}}", open.sid),
            Self::Close => "1".to_string(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(data) => format!("4{data}"),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect { namespace: String, payload: Option<Value> },
    Disconnect { namespace: String },
    Event { namespace: String, ack_id: Option<u64>, name: String, args: Vec<Value> },
    Ack { namespace: String, ack_id: u64, args: Vec<Value> },
    ConnectError { namespace: String, payload: Option<Value> },
}

const DEFAULT_NAMESPACE: &str = "/";

impl SocketPacket {
    /// The packet a client sends to join the default namespace.
    pub fn connect() -> Self {
        Self::Connect { namespace: DEFAULT_NAMESPACE.to_string(), payload: None }
    }

    pub fn disconnect() -> Self {
        Self::Disconnect { namespace: DEFAULT_NAMESPACE.to_string() }
    }

    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ClientError::Protocol("empty socket packet".into()))?;
        let mut rest = chars.as_str();

        if matches!(kind, '5' | '6') {
            return Err(ClientError::Protocol("binary socket packets are not supported".into()));
        }

        let namespace = if rest.starts_with('/') {
            let (ns, tail) = rest.split_once(',').unwrap_or((rest, ""));
            rest = tail;
            ns.to_string()
        } else {
            DEFAULT_NAMESPACE.to_string()
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let ack_id = if digits > 0 {
            let id = rest[..digits]
                .parse::<u64>()
                .map_err(|e| ClientError::Protocol(format!("bad ack id: {e}")))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let payload: Option<Value> = if rest.is_empty() { None } else { Some(serde_json::from_str(rest)?) };

        match kind {
            '0' => Ok(Self::Connect { namespace, payload }),
            '1' => Ok(Self::Disconnect { namespace }),
            '2' => {
                let mut args = match payload {
                    Some(Value::Array(items)) => items,
                    _ => return Err(ClientError::Protocol("event payload must be an array".into())),
                };
                if args.is_empty() {
                    return Err(ClientError::Protocol("event without a name".into()));
                }
                let Value::String(name) = args.remove(0) else {
                    return Err(ClientError::Protocol("event name must be a string".into()));
                };
                Ok(Self::Event { namespace, ack_id, name, args })
            }
            '3' => {
                let ack_id = ack_id.ok_or_else(|| ClientError::Protocol("ack without id".into()))?;
                let args = match payload {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                Ok(Self::Ack { namespace, ack_id, args })
            }
            '4' => Ok(Self::ConnectError { namespace, payload }),
            other => Err(ClientError::Protocol(format!("unknown socket packet type {other:?}"))),
        }
    }

    pub fn encode(&self) -> String {
        fn prefix(kind: char, namespace: &str) -> String {
            if namespace == DEFAULT_NAMESPACE {
                kind.to_string()
            } else {
                format!("{kind}{namespace},")
            }
        }

        match self {
            Self::Connect { namespace, payload } => {
                let mut out = prefix('0', namespace);
                if let Some(p) = payload {
                    out.push_str(&p.to_string());
                }
                out
            }
            Self::Disconnect { namespace } => prefix('1', namespace),
            Self::Event { namespace, ack_id, name, args } => {
                let mut out = prefix('2', namespace);
                if let Some(id) = ack_id {
                    out.push_str(&id.to_string());
                }
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                out.push_str(&Value::Array(items).to_string());
                out
            }
            Self::Ack { namespace, ack_id, args } => {
                format!("{}{}{}", prefix('3', namespace), ack_id, Value::Array(args.clone()))
            }
            Self::ConnectError { namespace, payload } => {
                let mut out = prefix('4', namespace);
                if let Some(p) = payload {
                    out.push_str(&p.to_string());
                }
                out
            }
        }
    }

    /// Wraps this packet in an Engine.IO `message`.
    pub fn to_engine_text(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}
