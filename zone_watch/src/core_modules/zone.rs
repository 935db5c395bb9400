use crate::core_modules::geometry::NativePoint;
use serde::{Deserialize, Serialize};

const ZONE_ID_PREFIX: &str = "zone-";

/// Rectangle bounds in native image space. Always normalized: `x_min <= x_max`, `y_min <= y_max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneCoordinates {
    pub x_min: i64,
    pub y_min: i64,
    pub x_max: i64,
    pub y_max: i64,
}

impl ZoneCoordinates {
    /// Builds bounds from two opposite corners, in whichever order they were dragged.
    pub fn from_corners(a: NativePoint, b: NativePoint) -> Self {
        Self {
            x_min: a.x.min(b.x),
            y_min: a.y.min(b.y),
            x_max: a.x.max(b.x),
            y_max: a.y.max(b.y),
        }
    }
}

/// A committed zone, exactly as it is sent to the analysis service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneDescriptor {
    pub zone_id: String,
    pub coordinates: ZoneCoordinates,
}

/// Hands out `zone-1`, `zone-2`, ... for the lifetime of one session.
///
/// The counter only moves forward; a failed submission does not give its id back.
#[derive(Debug, Default)]
pub struct ZoneIdAllocator {
    issued: u64,
}

impl ZoneIdAllocator {
    pub fn new() -> Self {
        Self { issued: 0 }
    }

    pub fn next_id(&mut self) -> String {
        self.issued += 1;
        format!("{ZONE_ID_PREFIX}{}", self.issued)
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential() {
        let mut ids = ZoneIdAllocator::new();
        assert_eq!(ids.next_id(), "zone-1");
        assert_eq!(ids.next_id(), "zone-2");
        assert_eq!(ids.next_id(), "zone-3");
        assert_eq!(ids.issued(), 3);
    }

    #[test]
    fn corners_are_normalized() {
        let c = ZoneCoordinates::from_corners(NativePoint { x: 400, y: 50 }, NativePoint { x: 100, y: 300 });
        assert_eq!(c, ZoneCoordinates { x_min: 100, y_min: 50, x_max: 400, y_max: 300 });
    }

    #[test]
    fn serializes_to_service_payload() {
        let zone = ZoneDescriptor {
            zone_id: "zone-7".into(),
            coordinates: ZoneCoordinates { x_min: 1, y_min: 2, x_max: 3, y_max: 4 },
        };
        let json = serde_json::to_value(&zone).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "zone_id": "zone-7",
                "coordinates": { "x_min": 1, "y_min": 2, "x_max": 3, "y_max": 4 }
            })
        );
    }
}
