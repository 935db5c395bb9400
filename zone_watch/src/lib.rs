// THEORY:
// This file is the main entry point for the `zone_watch` library crate. It exposes
// the client-side core of the live zone view: the coordinate mapper and draw state
// machine that turn pointer gestures into native-resolution zones, and the
// telemetry aggregator that folds the service's metric stream into bounded
// per-zone series.
//
// `ZoneSession` is the high-level interface. Transport, HTTP and presentation
// live in `zone_watch_client`; this crate does no I/O, so every behaviour can be
// replayed deterministically from a recorded event sequence.

pub mod core_modules;
pub mod error;
pub mod session;

pub use core_modules::draw_state::{DrawPhase, OverlayRect, ZoneDrawState};
pub use core_modules::frame::{FrameFormat, FramePacket};
pub use core_modules::geometry::{
    map_local_to_native, map_to_native, DisplayedImage, NativePoint, NativeResolution, ScreenPoint,
    ScreenRect, ViewportGeometry,
};
pub use core_modules::stream_event::{ConnectionState, RecordedEvent, StreamEvent, FRAME_EVENT, TELEMETRY_EVENT};
pub use core_modules::telemetry::{
    Clock, FootfallSample, LocalClock, TelemetryAggregator, TelemetrySnapshot, SERIES_CAPACITY,
};
pub use core_modules::zone::{ZoneCoordinates, ZoneDescriptor, ZoneIdAllocator};
pub use error::ZoneError;
pub use session::{PointerInput, PointerKind, PointerOutcome, SessionUpdate, ZoneSession};
