//! Client configuration
//!
//! Every setting has a default matching a locally running analysis service and
//! can be overridden through the environment:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `ZW_SERVICE_URL` | `http://localhost:5920` | Base URL for HTTP requests |
//! | `ZW_STREAM_URL` | `ws://127.0.0.1:5920` | Socket.IO server for frames and telemetry |
//! | `ZW_BIND` | `127.0.0.1:3001` | Address of the local presentation server |
//! | `ZW_REQUEST_TIMEOUT_MS` | `5000` | Timeout for each HTTP request |

use crate::error::{ClientError, Result};
use std::time::Duration;
use url::Url;

pub const DEFAULT_SERVICE_URL: &str = "http://localhost:5920";
pub const DEFAULT_STREAM_URL: &str = "ws://127.0.0.1:5920";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3001";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;
/// Capacity of the ordered event queue between the socket reader and the session
/// loop. Frames never wait here: they go through a single latest-wins slot.
const DEFAULT_EVENT_QUEUE: usize = 64;
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

const SOCKET_IO_PATH: &str = "/socket.io/";

/// Where the Socket.IO stream lives.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: Url,
    pub event_queue: usize,
    /// Upper bound on connecting plus receiving the Engine.IO `open` packet.
    pub handshake_timeout: Duration,
}

impl StreamConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            event_queue: DEFAULT_EVENT_QUEUE,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// The Engine.IO v4 WebSocket endpoint derived from the base URL.
    pub fn endpoint(&self) -> Result<Url> {
        let mut endpoint = self.url.clone();
        match endpoint.scheme() {
            "ws" | "wss" => {}
            "http" => endpoint
                .set_scheme("ws")
                .map_err(|_| ClientError::Config("cannot switch stream URL to ws".into()))?,
            "https" => endpoint
                .set_scheme("wss")
                .map_err(|_| ClientError::Config("cannot switch stream URL to wss".into()))?,
            other => return Err(ClientError::Config(format!("unsupported stream scheme: {other}"))),
        }
        if endpoint.path().is_empty() || endpoint.path() == "/" {
            endpoint.set_path(SOCKET_IO_PATH);
        }
        endpoint.query_pairs_mut().append_pair("EIO", "4").append_pair("transport", "websocket");
        Ok(endpoint)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub service_url: Url,
    pub stream: StreamConfig,
    pub bind_addr: String,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let service_url = Url::parse(&get("ZW_SERVICE_URL").unwrap_or_else(|| DEFAULT_SERVICE_URL.into()))?;
        let stream_url = Url::parse(&get("ZW_STREAM_URL").unwrap_or_else(|| DEFAULT_STREAM_URL.into()))?;
        let bind_addr = get("ZW_BIND").unwrap_or_else(|| DEFAULT_BIND_ADDR.into());
        let timeout_ms = match get("ZW_REQUEST_TIMEOUT_MS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| ClientError::Config(format!("ZW_REQUEST_TIMEOUT_MS: {e}")))?,
            None => DEFAULT_REQUEST_TIMEOUT_MS,
        };

        Ok(Self {
            service_url,
            stream: StreamConfig::new(stream_url),
            bind_addr,
            request_timeout: Duration::from_millis(timeout_ms),
        })
    }

    /// Resolves a service route such as `create_zone` against the base URL.
    pub fn endpoint(&self, route: &str) -> Result<Url> {
        let mut base = self.service_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base.join(route)?)
    }
}
