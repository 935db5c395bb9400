//! Error types for the zone annotation core

use thiserror::Error;

/// Conditions raised by the annotation and aggregation layers.
///
/// None of these are fatal to a session: callers log them and carry on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ZoneError {
    /// The displayed image has no usable layout yet (zero-sized bounding rect
    /// or no frame received). Drawing is suppressed until it becomes available.
    #[error("Viewport geometry unavailable: {0}")]
    UnavailableGeometry(&'static str),

    /// A telemetry snapshot carried a `footfall_summary` of the wrong shape.
    #[error("Malformed telemetry: {0}")]
    MalformedTelemetry(String),

    /// A frame payload could not be decoded.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
}
