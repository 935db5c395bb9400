use std::collections::BTreeMap;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use zone_watch::{ConnectionState, FootfallSample, FramePacket, OverlayRect, ZoneDescriptor};

pub mod config;
pub mod error;
#[cfg(feature = "web")]
pub mod presentation;
pub mod runtime;
pub mod service;
pub mod stream;
pub mod submitter;
pub mod wire;

pub use config::{ClientConfig, StreamConfig};
pub use error::{ClientError, Result};
pub use runtime::{SessionRuntime, UiCommand};
pub use service::ServiceClient;
pub use stream::{StreamChannel, StreamEvents};
pub use submitter::{SubmitOutcome, ZoneSubmitter};

pub type SeriesView = BTreeMap<String, Vec<FootfallSample>>;

/// Ordered view changes pushed to whatever renders the session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewUpdate {
    /// In-progress rectangle, or `None` to clear it.
    Overlay { rect: Option<OverlayRect> },
    Series { series: SeriesView },
    /// Latest raw telemetry, pretty-printed for the response panel.
    Telemetry { pretty: String },
    Connection { state: ConnectionState },
    ZoneCommitted { zone: ZoneDescriptor },
    ZoneSubmitted { zone_id: String, accepted: bool, detail: String },
    Notice { message: String },
}

/// Fan-out from the session loop to renderers.
///
/// Frames go through a `watch` so a slow renderer only ever sees the newest
/// one; everything else is an ordered broadcast.
#[derive(Clone)]
pub struct ViewBus {
    pub frames_tx: watch::Sender<Option<FramePacket>>,
    pub updates_tx: broadcast::Sender<ViewUpdate>,
    pub series_tx: watch::Sender<SeriesView>,
}

impl ViewBus {
    pub fn new(capacity: usize) -> Self {
        let (frames_tx, _) = watch::channel(None);
        let (updates_tx, _) = broadcast::channel::<ViewUpdate>(capacity.max(1));
        let (series_tx, _) = watch::channel(SeriesView::new());
        Self { frames_tx, updates_tx, series_tx }
    }

    pub fn publish_frame(&self, frame: FramePacket) {
        self.frames_tx.send_replace(Some(frame));
    }

    pub fn publish(&self, update: ViewUpdate) {
        // No subscribers is fine: nobody is looking.
        let _ = self.updates_tx.send(update);
    }

    pub fn publish_series(&self, series: SeriesView) {
        self.series_tx.send_replace(series.clone());
        self.publish(ViewUpdate::Series { series });
    }

    pub fn latest_frame(&self) -> Option<FramePacket> {
        self.frames_tx.borrow().clone()
    }

    pub fn latest_series(&self) -> SeriesView {
        self.series_tx.borrow().clone()
    }
}
