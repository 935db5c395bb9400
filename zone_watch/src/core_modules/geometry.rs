// THEORY:
// The `geometry` module is the bridge between what the operator sees and what the
// analysis service understands. The video frame is rendered scaled (and possibly
// offset) inside a page, but zones must be expressed in the frame's native pixel
// grid, because that is the grid the detector runs on.
//
// The mapping is a pure linear transform from the on-screen bounding rectangle of
// the displayed image to `[0, natural_width] x [0, natural_height]`. Where the
// rectangle and resolution come from is abstracted behind `ViewportGeometry`, so
// the draw state machine can be exercised without a real rendering surface.

use crate::error::ZoneError;
use serde::{Deserialize, Serialize};

/// A pointer position in viewport (client) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The on-screen bounding rectangle of the displayed image, in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self { left, top, width, height }
    }

    /// A rect is laid out once it has a finite, non-zero extent.
    pub fn is_laid_out(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    /// Converts a viewport point to coordinates relative to the rect's top-left corner.
    pub fn to_local(&self, point: ScreenPoint) -> (f64, f64) {
        (point.x - self.left, point.y - self.top)
    }
}

/// The true pixel resolution of the source frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeResolution {
    pub width: u32,
    pub height: u32,
}

impl NativeResolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A point in native image-pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativePoint {
    pub x: i64,
    pub y: i64,
}

/// Capability that reports where the image currently sits on screen and what
/// resolution it was decoded at.
pub trait ViewportGeometry {
    fn bounding_rect(&self) -> ScreenRect;
    fn natural_resolution(&self) -> Option<NativeResolution>;
}

/// Geometry captured at a single instant, e.g. reported alongside a pointer event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayedImage {
    pub rect: ScreenRect,
    pub resolution: Option<NativeResolution>,
}

impl DisplayedImage {
    pub fn new(rect: ScreenRect, resolution: Option<NativeResolution>) -> Self {
        Self { rect, resolution }
    }
}

impl ViewportGeometry for DisplayedImage {
    fn bounding_rect(&self) -> ScreenRect {
        self.rect
    }

    fn natural_resolution(&self) -> Option<NativeResolution> {
        self.resolution
    }
}

/// Maps a viewport point into native image-pixel space.
///
/// Rounds half-up, so `x.5` always moves towards positive infinity.
pub fn map_to_native<G: ViewportGeometry + ?Sized>(
    point: ScreenPoint,
    viewport: &G,
) -> Result<NativePoint, ZoneError> {
    map_local_to_native(viewport.bounding_rect().to_local(point), viewport)
}

/// Like [`map_to_native`], for an offset already relative to the image's
/// top-left corner. Scaling uses the current on-screen size.
pub fn map_local_to_native<G: ViewportGeometry + ?Sized>(
    (local_x, local_y): (f64, f64),
    viewport: &G,
) -> Result<NativePoint, ZoneError> {
    let rect = viewport.bounding_rect();
    if !rect.is_laid_out() {
        return Err(ZoneError::UnavailableGeometry("image has no on-screen extent"));
    }
    let resolution = match viewport.natural_resolution() {
        Some(r) if r.width > 0 && r.height > 0 => r,
        _ => return Err(ZoneError::UnavailableGeometry("no frame resolution known")),
    };

    Ok(NativePoint {
        x: round_half_up(local_x / rect.width * resolution.width as f64),
        y: round_half_up(local_y / rect.height * resolution.height as f64),
    })
}

fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}
