// THEORY:
// The `session` module is the top-level API of the annotation core. A `ZoneSession`
// is created when the operator opens the live view and torn down when they leave.
// It owns every piece of mutable state the view needs:
//
// - the draw state machine and the zone id counter,
// - the telemetry aggregator and its per-zone series,
// - the latest frame (latest-wins: each new frame replaces the previous one)
//   and the latest raw telemetry snapshot,
// - the connection state reported by the stream.
//
// Nothing here is shared or global. The session is driven from a single event
// loop, so all transitions are serialized by construction. After `teardown` every
// input is ignored, which is how late network callbacks are kept from mutating a
// view that no longer exists.

use crate::core_modules::draw_state::{OverlayRect, ZoneDrawState};
use crate::core_modules::frame::FramePacket;
use crate::core_modules::geometry::{DisplayedImage, NativeResolution, ScreenPoint, ScreenRect};
use crate::core_modules::stream_event::{ConnectionState, StreamEvent};
use crate::core_modules::telemetry::{Clock, FootfallSample, TelemetryAggregator, TelemetrySnapshot};
use crate::core_modules::zone::{ZoneDescriptor, ZoneIdAllocator};
use crate::error::ZoneError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerKind {
    Down,
    Move,
    Up,
}

/// A pointer event together with where the image sat on screen when it fired.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerInput {
    pub kind: PointerKind,
    pub point: ScreenPoint,
    pub rect: ScreenRect,
}

/// What the view should do after a pointer event.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerOutcome {
    /// A gesture started; nothing to draw yet.
    Started,
    /// Redraw the in-progress rectangle.
    Overlay(OverlayRect),
    /// Clear the overlay and submit this zone.
    Committed(ZoneDescriptor),
    /// Drawing is not possible right now; clear the overlay.
    Suppressed(ZoneError),
    /// Nothing happened.
    Ignored,
}

/// What changed after a stream event.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    FrameReplaced(FramePacket),
    /// A telemetry snapshot arrived; `zones_updated` is 0 when it had no footfall summary.
    Telemetry { zones_updated: usize },
    ConnectionChanged(ConnectionState),
    /// The event was malformed and dropped.
    Skipped(ZoneError),
    /// The session has been torn down.
    Ignored,
}

pub struct ZoneSession {
    draw: ZoneDrawState,
    ids: ZoneIdAllocator,
    aggregator: TelemetryAggregator,
    latest_frame: Option<FramePacket>,
    /// Raw telemetry for the response panel, kept even without a footfall summary.
    latest_telemetry: Option<TelemetrySnapshot>,
    connection: ConnectionState,
    live: bool,
}

impl ZoneSession {
    pub fn new() -> Self {
        Self::with_aggregator(TelemetryAggregator::new())
    }

    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self::with_aggregator(TelemetryAggregator::with_clock(clock))
    }

    fn with_aggregator(aggregator: TelemetryAggregator) -> Self {
        Self {
            draw: ZoneDrawState::new(),
            ids: ZoneIdAllocator::new(),
            aggregator,
            latest_frame: None,
            latest_telemetry: None,
            connection: ConnectionState::Connecting,
            live: true,
        }
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Applies one stream event.
    pub fn handle_event(&mut self, event: StreamEvent) -> SessionUpdate {
        if !self.live {
            return SessionUpdate::Ignored;
        }
        match event {
            StreamEvent::Connected => self.set_connection(ConnectionState::Connected),
            StreamEvent::Disconnected => self.set_connection(ConnectionState::Disconnected),
            StreamEvent::Frame(frame) => {
                self.latest_frame = Some(frame.clone());
                SessionUpdate::FrameReplaced(frame)
            }
            StreamEvent::Telemetry(snapshot) => {
                let update = match self.aggregator.ingest(&snapshot) {
                    Ok(zones_updated) => SessionUpdate::Telemetry { zones_updated },
                    Err(e) => {
                        tracing::debug!("Skipping telemetry snapshot: {e}");
                        SessionUpdate::Skipped(e)
                    }
                };
                self.latest_telemetry = Some(snapshot);
                update
            }
        }
    }

    fn set_connection(&mut self, state: ConnectionState) -> SessionUpdate {
        if state == ConnectionState::Disconnected {
            // A gesture cannot outlive the feed it was drawn on.
            self.draw.reset();
        }
        self.connection = state;
        SessionUpdate::ConnectionChanged(state)
    }

    /// Applies one pointer event, using the last frame's resolution as the native size.
    pub fn handle_pointer(&mut self, input: PointerInput) -> PointerOutcome {
        if !self.live {
            return PointerOutcome::Ignored;
        }
        let viewport = DisplayedImage::new(input.rect, self.natural_resolution());
        match input.kind {
            PointerKind::Down => match self.draw.pointer_down(input.point, &viewport) {
                Ok(_) => PointerOutcome::Started,
                Err(e) => PointerOutcome::Suppressed(e),
            },
            PointerKind::Move => self
                .draw
                .pointer_move(input.point, &viewport)
                .map_or(PointerOutcome::Ignored, PointerOutcome::Overlay),
            PointerKind::Up => match self.draw.pointer_up(input.point, &viewport, &mut self.ids) {
                Ok(Some(zone)) => {
                    tracing::info!(
                        zone_id = %zone.zone_id,
                        coordinates = ?zone.coordinates,
                        "Calculated zone coordinates"
                    );
                    PointerOutcome::Committed(zone)
                }
                Ok(None) => PointerOutcome::Ignored,
                Err(e) => PointerOutcome::Suppressed(e),
            },
        }
    }

    /// Ends the session: pending gestures and series are discarded and all
    /// further input is ignored. Idempotent.
    pub fn teardown(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        self.draw.reset();
        self.aggregator.clear();
        self.latest_frame = None;
        self.latest_telemetry = None;
        self.connection = ConnectionState::Disconnected;
    }

    pub fn natural_resolution(&self) -> Option<NativeResolution> {
        self.latest_frame.as_ref().map(FramePacket::resolution)
    }

    pub fn latest_frame(&self) -> Option<&FramePacket> {
        self.latest_frame.as_ref()
    }

    pub fn latest_telemetry(&self) -> Option<&TelemetrySnapshot> {
        self.latest_telemetry.as_ref()
    }

    pub fn series(&self) -> BTreeMap<String, Vec<FootfallSample>> {
        self.aggregator.snapshot()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn zones_committed(&self) -> u64 {
        self.ids.issued()
    }

    pub fn is_drawing(&self) -> bool {
        self.draw.is_dragging()
    }
}

impl Default for ZoneSession {
    fn default() -> Self {
        Self::new()
    }
}
