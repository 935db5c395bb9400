//! Long-lived Socket.IO stream from the analysis service
//!
//! `StreamChannel` owns one WebSocket connection and turns the two events the
//! service pushes (`frame` and `response`) into typed [`StreamEvent`]s. It never
//! reconnects; a dropped or silent connection surfaces as
//! `StreamEvent::Disconnected` and the channel stays down.
//!
//! # Lifecycle
//!
//! ```text
//! connect() ── handshake ──> reader task ── events ──> StreamEvents
//!                                 │
//! close() ── shutdown signal ─────┘  (sends `41`, closes socket, drops senders)
//! ```
//!
//! Connection and telemetry events go through a bounded ordered queue. Frames
//! do not queue: the reader overwrites a single slot, so a slow consumer only
//! ever sees the newest frame.
//!
//! The server must ping within `pingInterval + pingTimeout` of the handshake
//! and of every previous ping, otherwise the peer is treated as gone.
//!
//! After `close()` returns, the reader task has exited and its senders are
//! gone, so no further event can be produced.

use crate::config::StreamConfig;
use crate::error::{ClientError, Result};
use crate::wire::{EnginePacket, OpenHandshake, SocketPacket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;
use zone_watch::{ConnectionState, FramePacket, StreamEvent};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Receiving side of a stream: ordered events plus the latest unseen frame.
pub struct StreamEvents {
    events: mpsc::Receiver<StreamEvent>,
    frames: watch::Receiver<Option<FramePacket>>,
    events_open: bool,
    frames_open: bool,
}

impl StreamEvents {
    /// Next event, or `None` once the reader has gone and everything is drained.
    ///
    /// Queued events are preferred; a pending frame comes next.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        loop {
            tokio::select! {
                biased;
                event = self.events.recv(), if self.events_open => match event {
                    Some(event) => return Some(event),
                    None => self.events_open = false,
                },
                changed = self.frames.changed(), if self.frames_open => match changed {
                    Ok(()) => {
                        if let Some(frame) = self.frames.borrow_and_update().clone() {
                            return Some(StreamEvent::Frame(frame));
                        }
                    }
                    Err(_) => self.frames_open = false,
                },
                else => return None,
            }
        }
    }
}

/// Feeds prerecorded events, frames included, through the ordered queue.
impl From<mpsc::Receiver<StreamEvent>> for StreamEvents {
    fn from(events: mpsc::Receiver<StreamEvent>) -> Self {
        let (_, frames) = watch::channel(None);
        Self { events, frames, events_open: true, frames_open: false }
    }
}

pub struct StreamChannel {
    state: watch::Receiver<ConnectionState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl StreamChannel {
    /// Opens the connection, completes the Engine.IO handshake and starts reading.
    pub async fn connect(config: &StreamConfig) -> Result<(Self, StreamEvents)> {
        let endpoint = config.endpoint()?;
        tracing::info!("Connecting to stream at {}", endpoint);

        let (mut socket, open) = tokio::time::timeout(config.handshake_timeout, handshake(&endpoint))
            .await
            .map_err(|_| {
                ClientError::TransportFailure(format!("no handshake within {:?}", config.handshake_timeout))
            })??;
        let heartbeat = open.heartbeat_window();
        tracing::debug!(sid = %open.sid, ?heartbeat, "Engine.IO session opened");

        socket.send(Message::Text(SocketPacket::connect().to_engine_text().into())).await?;

        let (events_tx, events_rx) = mpsc::channel(config.event_queue.max(1));
        let (frames_tx, frames_rx) = watch::channel(None);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let reader = Reader { events: events_tx, frames: frames_tx, state: state_tx };
        let task = tokio::spawn(reader.run(socket, heartbeat, shutdown_rx));

        Ok((
            Self {
                state: state_rx,
                shutdown: Some(shutdown_tx),
                task: Some(task),
            },
            StreamEvents {
                events: events_rx,
                frames: frames_rx,
                events_open: true,
                frames_open: true,
            },
        ))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watches connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_none()
    }

    /// Closes the connection and waits for the reader to exit. Idempotent.
    pub async fn close(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            return;
        };
        // The reader may already be gone if the server hung up first.
        let _ = shutdown.send(());
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Stream reader ended abnormally: {e}");
            }
        }
        tracing::info!("Stream connection closed");
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Connects and waits for the Engine.IO `open` packet.
async fn handshake(endpoint: &Url) -> Result<(Socket, OpenHandshake)> {
    let (mut socket, _) = connect_async(endpoint.as_str())
        .await
        .map_err(|e| ClientError::TransportFailure(e.to_string()))?;
    loop {
        match next_text(&mut socket).await? {
            Some(text) => match EnginePacket::decode(&text)? {
                EnginePacket::Open(open) => return Ok((socket, open)),
                other => tracing::debug!("Ignoring {:?} before handshake", other),
            },
            None => return Err(ClientError::TransportFailure("closed during handshake".into())),
        }
    }
}

async fn next_text(socket: &mut Socket) -> Result<Option<String>> {
    while let Some(msg) = socket.next().await {
        match msg? {
            Message::Text(text) => return Ok(Some(text.as_str().to_string())),
            Message::Close(_) => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}

enum Flow {
    Continue,
    /// A server ping arrived; the peer is alive.
    Pinged,
    Stop,
}

struct Reader {
    events: mpsc::Sender<StreamEvent>,
    frames: watch::Sender<Option<FramePacket>>,
    state: watch::Sender<ConnectionState>,
}

impl Reader {
    async fn run(self, mut socket: Socket, heartbeat: Duration, mut shutdown: oneshot::Receiver<()>) {
        let deadline = tokio::time::sleep(heartbeat);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    let leave = SocketPacket::disconnect().to_engine_text();
                    let _ = socket.send(Message::Text(leave.into())).await;
                    let _ = socket.close(None).await;
                    let _ = self.state.send(ConnectionState::Disconnected);
                    return;
                }
                _ = &mut deadline => {
                    tracing::warn!("No ping from stream within {heartbeat:?}");
                    break;
                }
                msg = socket.next() => {
                    let flow = match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(text.as_str(), &mut socket).await,
                        Some(Ok(Message::Close(_))) | None => Flow::Stop,
                        Some(Ok(_)) => Flow::Continue,
                        Some(Err(e)) => {
                            tracing::warn!("Stream transport failure: {e}");
                            Flow::Stop
                        }
                    };
                    match flow {
                        Flow::Continue => {}
                        Flow::Pinged => deadline.as_mut().reset(Instant::now() + heartbeat),
                        Flow::Stop => break,
                    }
                }
            }
        }

        let _ = self.state.send(ConnectionState::Disconnected);
        tracing::info!("Disconnected from stream");
        let _ = self.events.send(StreamEvent::Disconnected).await;
    }

    async fn handle_text(&self, text: &str, socket: &mut Socket) -> Flow {
        let packet = match EnginePacket::decode(text) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!("Skipping undecodable packet: {e}");
                return Flow::Continue;
            }
        };

        match packet {
            EnginePacket::Ping(data) => {
                let pong = EnginePacket::Pong(data).encode();
                if socket.send(Message::Text(pong.into())).await.is_err() {
                    return Flow::Stop;
                }
                Flow::Pinged
            }
            EnginePacket::Close => Flow::Stop,
            EnginePacket::Message(body) => match SocketPacket::decode(&body) {
                Ok(SocketPacket::Connect { .. }) => {
                    let _ = self.state.send(ConnectionState::Connected);
                    tracing::info!("Connected to stream");
                    self.deliver(StreamEvent::Connected).await
                }
                Ok(SocketPacket::Disconnect { .. }) => Flow::Stop,
                Ok(SocketPacket::ConnectError { payload, .. }) => {
                    tracing::warn!("Stream refused connection: {:?}", payload);
                    Flow::Stop
                }
                Ok(SocketPacket::Event { name, mut args, .. }) => {
                    let payload = if args.is_empty() { serde_json::Value::Null } else { args.swap_remove(0) };
                    match StreamEvent::from_named(&name, payload) {
                        Ok(Some(StreamEvent::Frame(frame))) => {
                            self.frames.send_replace(Some(frame));
                            Flow::Continue
                        }
                        Ok(Some(event)) => self.deliver(event).await,
                        Ok(None) => Flow::Continue,
                        Err(e) => {
                            tracing::debug!("Skipping '{name}' event: {e}");
                            Flow::Continue
                        }
                    }
                }
                Ok(SocketPacket::Ack { .. }) => Flow::Continue,
                Err(e) => {
                    tracing::debug!("Skipping undecodable socket packet: {e}");
                    Flow::Continue
                }
            },
            EnginePacket::Open(_) | EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {
                Flow::Continue
            }
        }
    }

    async fn deliver(&self, event: StreamEvent) -> Flow {
        // Nobody listening any more: stop reading.
        if self.events.send(event).await.is_err() { Flow::Stop } else { Flow::Continue }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use std::io::Cursor;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    const OPEN: &str = r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

    fn jpeg_base64(width: u32, height: u32) -> String {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Jpeg).unwrap();
        base64::engine::general_purpose::STANDARD.encode(out.into_inner())
    }

    async fn recv_text(ws: &mut WebSocketStream<TcpStream>) -> Option<String> {
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                return Some(text.as_str().to_string());
            }
        }
        None
    }

    /// Minimal Socket.IO server: handshake with `open`, then the scripted
    /// packets with `gap` before each, then reports what the client sent back.
    /// The socket stays open until the client leaves.
    async fn fake_service_with(open: &str, script: Vec<String>, gap: Duration) -> (Url, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let open = open.to_string();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            let mut received = Vec::new();

            ws.send(Message::Text(open.into())).await.unwrap();
            received.push(recv_text(&mut ws).await.unwrap());
            ws.send(Message::Text(r#"40{"sid":"n1"}"#.to_string().into())).await.unwrap();

            for line in script {
                tokio::time::sleep(gap).await;
                if ws.send(Message::Text(line.into())).await.is_err() {
                    return received;
                }
            }
            while let Some(text) = recv_text(&mut ws).await {
                received.push(text);
            }
            received
        });
        (Url::parse(&format!("ws://{addr}")).unwrap(), server)
    }

    async fn fake_service(script: Vec<String>) -> (Url, JoinHandle<Vec<String>>) {
        fake_service_with(OPEN, script, Duration::ZERO).await
    }

    async fn drain(events: &mut StreamEvents) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(300), events.recv()).await {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn delivers_events_and_answers_pings() {
        let script = vec![
            format!(r#"42["frame","{}"]"#, jpeg_base64(32, 24)),
            r#"42["response",{"footfall_summary":{"zone_footfall":{"zone-1":3}}}]"#.to_string(),
            r#"42["unrelated",1]"#.to_string(),
            r#"42["frame",17]"#.to_string(),
            "2".to_string(),
            r#"42["response",{"fps":30}]"#.to_string(),
        ];
        let (url, server) = fake_service(script).await;

        let (mut channel, mut events) = StreamChannel::connect(&StreamConfig::new(url)).await.unwrap();

        assert!(matches!(events.recv().await, Some(StreamEvent::Connected)));
        assert_eq!(channel.state(), ConnectionState::Connected);

        let rest = drain(&mut events).await;
        let telemetry: Vec<_> = rest
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Telemetry(t) => Some(t.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(telemetry.len(), 2);
        assert_eq!(telemetry[1].as_value()["fps"], 30);
        assert!(rest.iter().any(|e| matches!(e, StreamEvent::Frame(f) if f.width == 32 && f.height == 24)));

        channel.close().await;
        channel.close().await;
        assert!(channel.is_closed());
        assert_eq!(channel.state(), ConnectionState::Disconnected);

        // The reader is gone: nothing further is produced.
        assert!(events.recv().await.is_none());

        let sent = tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
        assert_eq!(sent.first().map(String::as_str), Some("40"));
        assert!(sent.iter().any(|t| t == "3"), "ping must be answered: {sent:?}");
        assert_eq!(sent.last().map(String::as_str), Some("41"));
    }

    #[tokio::test]
    async fn frames_coalesce_to_the_newest() {
        let mut script: Vec<String> = (0..5).map(|_| format!(r#"42["frame","{}"]"#, jpeg_base64(32, 24))).collect();
        script.push(format!(r#"42["frame","{}"]"#, jpeg_base64(48, 36)));
        script.push(r#"42["response",{"fps":30}]"#.to_string());
        let (url, server) = fake_service(script).await;

        let (mut channel, mut events) = StreamChannel::connect(&StreamConfig::new(url)).await.unwrap();
        assert!(matches!(events.recv().await, Some(StreamEvent::Connected)));

        // Let the whole burst land before reading anything.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let rest = drain(&mut events).await;

        let widths: Vec<u32> = rest
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Frame(f) => Some(f.width),
                _ => None,
            })
            .collect();
        assert_eq!(widths, vec![48]);
        assert!(rest.iter().any(|e| matches!(e, StreamEvent::Telemetry(_))));

        channel.close().await;
        server.abort();
    }

    #[tokio::test]
    async fn silent_server_is_reported_disconnected() {
        let open = r#"0{"sid":"s1","upgrades":[],"pingInterval":50,"pingTimeout":50}"#;
        let (url, server) = fake_service_with(open, Vec::new(), Duration::ZERO).await;

        let (channel, mut events) = StreamChannel::connect(&StreamConfig::new(url)).await.unwrap();
        assert!(matches!(events.recv().await, Some(StreamEvent::Connected)));

        let next = tokio::time::timeout(Duration::from_secs(2), events.recv()).await;
        assert!(matches!(next, Ok(Some(StreamEvent::Disconnected))));
        assert_eq!(channel.state(), ConnectionState::Disconnected);

        drop(channel);
        server.abort();
    }

    #[tokio::test]
    async fn pings_keep_a_quiet_connection_alive() {
        let open = r#"0{"sid":"s1","upgrades":[],"pingInterval":100,"pingTimeout":100}"#;
        let pings = vec!["2".to_string(); 8];
        let (url, server) = fake_service_with(open, pings, Duration::from_millis(80)).await;

        let (channel, mut events) = StreamChannel::connect(&StreamConfig::new(url)).await.unwrap();
        assert!(matches!(events.recv().await, Some(StreamEvent::Connected)));

        // Pings span well past one 200ms window.
        let quiet = tokio::time::timeout(Duration::from_millis(500), events.recv()).await;
        assert!(quiet.is_err(), "connection dropped while pings were flowing");
        assert_eq!(channel.state(), ConnectionState::Connected);

        // Once the pings stop, the window runs out.
        let next = tokio::time::timeout(Duration::from_secs(2), events.recv()).await;
        assert!(matches!(next, Ok(Some(StreamEvent::Disconnected))));

        drop(channel);
        server.abort();
    }

    #[tokio::test]
    async fn server_hangup_reports_disconnect() {
        let (url, server) = fake_service(vec!["1".to_string()]).await;
        let (channel, mut events) = StreamChannel::connect(&StreamConfig::new(url)).await.unwrap();

        assert!(matches!(events.recv().await, Some(StreamEvent::Connected)));
        assert!(matches!(events.recv().await, Some(StreamEvent::Disconnected)));
        assert!(events.recv().await.is_none());
        assert_eq!(channel.state(), ConnectionState::Disconnected);

        drop(channel);
        server.abort();
    }

    #[tokio::test]
    async fn missing_open_packet_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            // Accept the socket, then say nothing.
            while ws.next().await.is_some() {}
        });

        let mut config = StreamConfig::new(Url::parse(&format!("ws://{addr}")).unwrap());
        config.handshake_timeout = Duration::from_millis(200);
        let err = StreamChannel::connect(&config).await.err().unwrap();
        assert!(matches!(err, ClientError::TransportFailure(_)));

        server.abort();
    }

    #[tokio::test]
    async fn unreachable_service_is_transport_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("ws://{addr}")).unwrap();
        let err = StreamChannel::connect(&StreamConfig::new(url)).await.err().unwrap();
        assert!(matches!(err, ClientError::TransportFailure(_)));
    }

    #[tokio::test]
    async fn recorded_events_pass_through_unchanged() {
        let (tx, rx) = mpsc::channel(4);
        let mut events = StreamEvents::from(rx);
        tx.send(StreamEvent::Connected).await.unwrap();
        tx.send(StreamEvent::Disconnected).await.unwrap();
        drop(tx);

        assert!(matches!(events.recv().await, Some(StreamEvent::Connected)));
        assert!(matches!(events.recv().await, Some(StreamEvent::Disconnected)));
        assert!(events.recv().await.is_none());
    }
}
