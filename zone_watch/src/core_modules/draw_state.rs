// THEORY:
// The `draw_state` module turns raw pointer gestures into zones. It is a two-state
// machine: `Idle` waits for a press, `Dragging` remembers where the press started.
//
// Key rules:
// 1.  **Anchor fixed at the press**: the press point is stored relative to the
//     image's top-left corner as it sat at that moment, so scrolling mid-drag does
//     not drag the anchor along. The transient rectangle handed back on every move
//     is only meant for drawing the overlay.
// 2.  **Native space on release**: both corners are scaled with the image's size at
//     release time, the bounds are normalized, and a fresh zone id is taken.
// 3.  **No re-entrancy**: a press while already dragging discards the unfinished
//     gesture and starts a new one from the new point.
// 4.  **Suppression**: when the image has no usable geometry yet, a press is
//     refused and the machine stays idle.

use crate::core_modules::geometry::{map_local_to_native, map_to_native, ScreenPoint, ViewportGeometry};
use crate::core_modules::zone::{ZoneCoordinates, ZoneDescriptor, ZoneIdAllocator};
use crate::error::ZoneError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DrawPhase {
    #[default]
    Idle,
    Dragging {
        /// Offset from the image's top-left corner at the press.
        anchor: (f64, f64),
        /// Last pointer position, in viewport coordinates.
        current: ScreenPoint,
    },
}

/// The in-progress rectangle, relative to the image's top-left corner on screen.
/// Width and height are signed: a backward drag yields negative extents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Default)]
pub struct ZoneDrawState {
    phase: DrawPhase,
}

impl ZoneDrawState {
    pub fn new() -> Self {
        Self { phase: DrawPhase::Idle }
    }

    pub fn phase(&self) -> DrawPhase {
        self.phase
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.phase, DrawPhase::Dragging { .. })
    }

    /// Starts a gesture at `point`.
    ///
    /// Returns `true` when an unfinished gesture was discarded to make room.
    pub fn pointer_down<G: ViewportGeometry + ?Sized>(
        &mut self,
        point: ScreenPoint,
        viewport: &G,
    ) -> Result<bool, ZoneError> {
        let discarded = self.is_dragging();
        self.phase = DrawPhase::Idle;

        // Refuse to start a gesture we could never commit.
        let anchor = viewport.bounding_rect().to_local(point);
        map_local_to_native(anchor, viewport)?;

        self.phase = DrawPhase::Dragging { anchor, current: point };
        if discarded {
            tracing::debug!("Discarded unfinished zone gesture");
        }
        Ok(discarded)
    }

    /// Tracks the pointer while dragging and returns the overlay to draw.
    pub fn pointer_move<G: ViewportGeometry + ?Sized>(
        &mut self,
        point: ScreenPoint,
        viewport: &G,
    ) -> Option<OverlayRect> {
        let DrawPhase::Dragging { anchor, .. } = self.phase else {
            return None;
        };
        self.phase = DrawPhase::Dragging { anchor, current: point };

        let (ax, ay) = anchor;
        let (cx, cy) = viewport.bounding_rect().to_local(point);
        Some(OverlayRect { x: ax, y: ay, width: cx - ax, height: cy - ay })
    }

    /// Finishes the gesture and commits a zone.
    ///
    /// Returns `Ok(None)` when no gesture was in progress. The machine is idle
    /// afterwards in every case, and a zone id is only consumed on success.
    pub fn pointer_up<G: ViewportGeometry + ?Sized>(
        &mut self,
        point: ScreenPoint,
        viewport: &G,
        ids: &mut ZoneIdAllocator,
    ) -> Result<Option<ZoneDescriptor>, ZoneError> {
        let DrawPhase::Dragging { anchor, .. } = std::mem::take(&mut self.phase) else {
            return Ok(None);
        };

        let start = map_local_to_native(anchor, viewport)?;
        let end = map_to_native(point, viewport)?;

        Ok(Some(ZoneDescriptor {
            zone_id: ids.next_id(),
            coordinates: ZoneCoordinates::from_corners(start, end),
        }))
    }

    /// Drops any gesture in progress.
    pub fn reset(&mut self) {
        self.phase = DrawPhase::Idle;
    }
}
