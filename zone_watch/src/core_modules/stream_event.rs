use crate::core_modules::frame::FramePacket;
use crate::core_modules::telemetry::TelemetrySnapshot;
use crate::error::ZoneError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the stream event carrying an encoded frame.
pub const FRAME_EVENT: &str = "frame";
/// Name of the stream event carrying a telemetry snapshot.
pub const TELEMETRY_EVENT: &str = "response";

/// Observable lifecycle of the stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Disconnected,
}

/// Everything the analysis service can push at us, in arrival order.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Connected,
    Disconnected,
    Frame(FramePacket),
    Telemetry(TelemetrySnapshot),
}

impl StreamEvent {
    /// Builds a typed event from a named stream event and its payload.
    ///
    /// Returns `Ok(None)` for event names this module does not consume.
    pub fn from_named(name: &str, payload: Value) -> Result<Option<Self>, ZoneError> {
        match name {
            FRAME_EVENT => {
                let Value::String(encoded) = payload else {
                    return Err(ZoneError::MalformedFrame("frame payload is not a string".into()));
                };
                FramePacket::from_base64(&encoded).map(|f| Some(Self::Frame(f)))
            }
            TELEMETRY_EVENT => Ok(Some(Self::Telemetry(TelemetrySnapshot::new(payload)))),
            _ => Ok(None),
        }
    }
}

/// One line of a recorded stream: `{"event": "frame", "data": "..."}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordedEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl RecordedEvent {
    pub fn into_stream_event(self) -> Result<Option<StreamEvent>, ZoneError> {
        match self.event.as_str() {
            "connect" => Ok(Some(StreamEvent::Connected)),
            "disconnect" => Ok(Some(StreamEvent::Disconnected)),
            name => StreamEvent::from_named(name, self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame::tests::jpeg_base64;
    use serde_json::json;

    #[test]
    fn maps_named_events() {
        let frame = StreamEvent::from_named(FRAME_EVENT, json!(jpeg_base64(8, 8))).unwrap();
        assert!(matches!(frame, Some(StreamEvent::Frame(f)) if f.width == 8));

        let telemetry = StreamEvent::from_named(TELEMETRY_EVENT, json!({ "ok": true })).unwrap();
        assert!(matches!(telemetry, Some(StreamEvent::Telemetry(_))));

        assert!(StreamEvent::from_named("heartbeat", Value::Null).unwrap().is_none());
    }

    #[test]
    fn non_string_frame_is_malformed() {
        let err = StreamEvent::from_named(FRAME_EVENT, json!(42)).unwrap_err();
        assert!(matches!(err, ZoneError::MalformedFrame(_)));
    }

    #[test]
    fn parses_recorded_lines() {
        let line = r#"{"event":"response","data":{"footfall_summary":{"zone_footfall":{"A":1}}}}"#;
        let recorded: RecordedEvent = serde_json::from_str(line).unwrap();
        assert!(matches!(recorded.into_stream_event(), Ok(Some(StreamEvent::Telemetry(_)))));

        let recorded: RecordedEvent = serde_json::from_str(r#"{"event":"disconnect"}"#).unwrap();
        assert!(matches!(recorded.into_stream_event(), Ok(Some(StreamEvent::Disconnected))));
    }
}
