//! Browser view for a zone session
//!
//! Serves a single page that shows the live frame, lets the operator drag
//! zones over it, charts footfall per zone and dumps the latest telemetry.
//!
//! Page <-> server traffic runs over one WebSocket at `/ws`:
//!
//! | direction | message                                                      |
//! |-----------|--------------------------------------------------------------|
//! | out       | `{"type":"frame","src":<data uri>,"width":..,"height":..}`   |
//! | out       | any [`ViewUpdate`] as JSON                                   |
//! | in        | `{"type":"pointer","kind":"down","point":{..},"rect":{..}}`  |
//! | in        | `{"type":"generate_heatmap"}`                                |
//!
//! `rect` is the image's bounding rectangle at the moment of the event, so the
//! session always maps against the current layout.

use crate::config::ClientConfig;
use crate::runtime::UiCommand;
use crate::{ViewBus, ViewUpdate};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use zone_watch::{FramePacket, PointerInput};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PageMessage {
    Pointer(PointerInput),
    GenerateHeatmap,
}

#[derive(Serialize)]
#[serde(tag = "type", rename = "frame")]
struct FrameMessage {
    src: String,
    width: u32,
    height: u32,
}

fn frame_message(frame: &FramePacket) -> Option<String> {
    serde_json::to_string(&FrameMessage {
        src: frame.to_data_uri(),
        width: frame.width,
        height: frame.height,
    })
    .ok()
}

/// Binds `cfg.bind_addr` and serves the view until the task is aborted.
pub async fn start_server(
    bus: ViewBus,
    cfg: &ClientConfig,
    commands: mpsc::Sender<UiCommand>,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    let app = Router::new()
        .route("/", get(|| async { Html(INDEX_HTML) }))
        .route("/healthz", get(|| async { "ok" }))
        .route(
            "/ws",
            get(move |ws: WebSocketUpgrade| {
                let bus = bus.clone();
                let commands = commands.clone();
                async move { ws_handler(ws, bus, commands) }
            }),
        );

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!("Zone view listening on http://{addr}");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Zone view server stopped: {e}");
        }
    });
    Ok((addr, server))
}

fn ws_handler(ws: WebSocketUpgrade, bus: ViewBus, commands: mpsc::Sender<UiCommand>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_conn(socket, bus, commands))
}

async fn ws_conn(socket: WebSocket, bus: ViewBus, commands: mpsc::Sender<UiCommand>) {
    let (mut sink, mut stream) = socket.split();
    let mut frames = bus.frames_tx.subscribe();
    let mut updates = bus.updates_tx.subscribe();

    let mut initial: Vec<String> = Vec::new();
    if let Some(frame) = frames.borrow_and_update().as_ref() {
        initial.extend(frame_message(frame));
    }
    initial.extend(serde_json::to_string(&ViewUpdate::Series { series: bus.latest_series() }).ok());

    let forward = tokio::spawn(async move {
        for text in initial {
            if sink.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        loop {
            let text = tokio::select! {
                changed = frames.changed() => {
                    if changed.is_err() { break; }
                    let frame = frames.borrow_and_update().clone();
                    match frame.as_ref().and_then(frame_message) {
                        Some(text) => text,
                        None => continue,
                    }
                }
                update = updates.recv() => match update {
                    Ok(update) => match serde_json::to_string(&update) {
                        Ok(text) => text,
                        Err(_) => continue,
                    },
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let command = match serde_json::from_str::<PageMessage>(&text) {
            Ok(PageMessage::Pointer(input)) => UiCommand::Pointer(input),
            Ok(PageMessage::GenerateHeatmap) => UiCommand::GenerateHeatmap,
            Err(e) => {
                tracing::debug!("Ignoring page message: {e}");
                continue;
            }
        };
        if commands.send(command).await.is_err() {
            break;
        }
    }
    forward.abort();
}

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>Zone Watch</title>
<style>
  body { font-family: sans-serif; margin: 16px; background: #111; color: #ddd; }
  #stage { position: relative; display: inline-block; }
  #frame { display: block; max-width: 90vw; cursor: crosshair; user-select: none; }
  #overlay { position: absolute; left: 0; top: 0; pointer-events: none; }
  #charts canvas { background: #1b1b1b; margin: 4px; }
  #response { white-space: pre; background: #1b1b1b; padding: 8px; max-height: 300px; overflow: auto; }
  #status { font-size: 12px; color: #888; }
</style>
</head>
<body>
<div id="status">connecting</div>
<div id="stage">
  <img id="frame" alt="Live frame" draggable="false">
  <canvas id="overlay"></canvas>
</div>
<p><button id="heatmap">Generate Heatmap</button> <span id="notice"></span></p>
<div id="charts"></div>
<h3>Response</h3>
<div id="response"></div>
<script>
const ws = new WebSocket((location.protocol === 'https:' ? 'wss://' : 'ws://') + location.host + '/ws');
const img = document.getElementById('frame');
const overlay = document.getElementById('overlay');
const charts = document.getElementById('charts');
let overlayRect = null;

function send(msg) { if (ws.readyState === WebSocket.OPEN) ws.send(JSON.stringify(msg)); }
function pointer(kind, e) {
  const r = img.getBoundingClientRect();
  send({ type: 'pointer', kind, point: { x: e.clientX, y: e.clientY },
         rect: { left: r.left, top: r.top, width: r.width, height: r.height } });
}
img.addEventListener('mousedown', e => { e.preventDefault(); pointer('down', e); });
img.addEventListener('mousemove', e => pointer('move', e));
img.addEventListener('mouseup', e => pointer('up', e));
document.getElementById('heatmap').onclick = () => send({ type: 'generate_heatmap' });

function drawOverlay() {
  overlay.width = img.clientWidth;
  overlay.height = img.clientHeight;
  const ctx = overlay.getContext('2d');
  ctx.clearRect(0, 0, overlay.width, overlay.height);
  if (!overlayRect) return;
  ctx.strokeStyle = '#ff0000';
  ctx.lineWidth = 2;
  ctx.strokeRect(overlayRect.x, overlayRect.y, overlayRect.width, overlayRect.height);
}

function drawSeries(series) {
  charts.innerHTML = '';
  for (const [zone, points] of Object.entries(series)) {
    const c = document.createElement('canvas');
    c.width = 320; c.height = 120; c.title = zone;
    charts.appendChild(c);
    const ctx = c.getContext('2d');
    ctx.fillStyle = '#ddd';
    ctx.fillText(zone, 6, 12);
    if (points.length === 0) continue;
    const max = Math.max(1, ...points.map(p => p.footfall));
    ctx.strokeStyle = '#4bc0c0';
    ctx.beginPath();
    points.forEach((p, i) => {
      const x = points.length === 1 ? 0 : i * (c.width - 1) / (points.length - 1);
      const y = c.height - 4 - (p.footfall / max) * (c.height - 20);
      if (i === 0) ctx.moveTo(x, y); else ctx.lineTo(x, y);
    });
    ctx.stroke();
    ctx.fillText(points[points.length - 1].time, c.width - 80, 12);
  }
}

ws.onopen = () => { document.getElementById('status').textContent = 'view connected'; };
ws.onclose = () => { document.getElementById('status').textContent = 'view closed'; };
ws.onmessage = ev => {
  const msg = JSON.parse(ev.data);
  switch (msg.type) {
    case 'frame': img.src = msg.src; break;
    case 'overlay': overlayRect = msg.rect; drawOverlay(); break;
    case 'series': drawSeries(msg.series); break;
    case 'telemetry': document.getElementById('response').textContent = msg.pretty; break;
    case 'connection': document.getElementById('status').textContent = 'stream ' + msg.state; break;
    case 'zone_committed': document.getElementById('notice').textContent = 'Submitting ' + msg.zone.zone_id; break;
    case 'zone_submitted': document.getElementById('notice').textContent = msg.zone_id + ': ' + msg.detail; break;
    case 'notice': document.getElementById('notice').textContent = msg.message; break;
  }
};
img.onload = drawOverlay;
</script>
</body>
</html>
"#;
