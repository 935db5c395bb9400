pub mod draw_state;
pub mod frame;
pub mod geometry;
pub mod stream_event;
pub mod telemetry;
pub mod zone;
