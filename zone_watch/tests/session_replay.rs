//! Replays recorded stream sessions through `ZoneSession`.

use base64::Engine as _;
use serde_json::json;
use std::io::Cursor;
use zone_watch::{
    Clock, ConnectionState, PointerInput, PointerKind, PointerOutcome, RecordedEvent, ScreenPoint, ScreenRect,
    ZoneSession, SERIES_CAPACITY,
};

struct FixedClock;

impl Clock for FixedClock {
    fn time_label(&self) -> String {
        "12:00:00 PM".to_string()
    }
}

fn frame_line(width: u32, height: u32) -> String {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Jpeg).unwrap();
    let encoded = base64::engine::general_purpose::STANDARD.encode(out.into_inner());
    json!({ "event": "frame", "data": encoded }).to_string()
}

fn telemetry_line(zones: serde_json::Value) -> String {
    json!({ "event": "response", "data": { "footfall_summary": { "zone_footfall": zones } } }).to_string()
}

fn replay(session: &mut ZoneSession, lines: &[String]) {
    for line in lines {
        let recorded: RecordedEvent = serde_json::from_str(line).unwrap();
        if let Some(event) = recorded.into_stream_event().unwrap() {
            session.handle_event(event);
        }
    }
}

#[test]
fn replayed_stream_builds_bounded_series() {
    let mut session = ZoneSession::with_clock(Box::new(FixedClock));
    let mut lines = vec![json!({ "event": "connect" }).to_string(), frame_line(320, 240)];
    for i in 0..60 {
        lines.push(telemetry_line(json!({ "zone-1": i, "zone-2": 60 - i })));
        if i % 10 == 0 {
            lines.push(json!({ "event": "response", "data": { "fps": 25 } }).to_string());
        }
    }
    replay(&mut session, &lines);

    assert_eq!(session.connection_state(), ConnectionState::Connected);
    let series = session.series();
    assert_eq!(series.len(), 2);
    assert_eq!(series["zone-1"].len(), SERIES_CAPACITY);
    assert_eq!(series["zone-1"].first().unwrap().footfall, 20);
    assert_eq!(series["zone-1"].last().unwrap().footfall, 59);
    assert_eq!(series["zone-2"].last().unwrap().footfall, 1);
}

#[test]
fn replay_is_deterministic() {
    let lines: Vec<String> = (0..45).map(|i| telemetry_line(json!({ "A": i % 7 }))).collect();

    let mut first = ZoneSession::with_clock(Box::new(FixedClock));
    let mut second = ZoneSession::with_clock(Box::new(FixedClock));
    replay(&mut first, &lines);
    replay(&mut second, &lines);

    assert_eq!(first.series(), second.series());
}

#[test]
fn zones_drawn_over_scaled_frame() {
    let mut session = ZoneSession::with_clock(Box::new(FixedClock));
    replay(&mut session, &[frame_line(1280, 960)]);

    let rect = ScreenRect::new(0.0, 0.0, 640.0, 480.0);
    let at = |kind: PointerKind, x: f64, y: f64| PointerInput { kind, point: ScreenPoint::new(x, y), rect };

    session.handle_pointer(at(PointerKind::Down, 100.0, 100.0));
    session.handle_pointer(at(PointerKind::Move, 150.0, 125.0));
    let outcome = session.handle_pointer(at(PointerKind::Up, 200.0, 150.0));

    let PointerOutcome::Committed(zone) = outcome else {
        panic!("expected committed zone, got {outcome:?}");
    };
    assert_eq!(zone.zone_id, "zone-1");
    assert_eq!(
        serde_json::to_value(&zone).unwrap(),
        json!({ "zone_id": "zone-1", "coordinates": { "x_min": 200, "y_min": 200, "x_max": 400, "y_max": 300 } })
    );
}
