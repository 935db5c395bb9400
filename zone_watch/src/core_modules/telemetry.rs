// THEORY:
// The `telemetry` module reconciles an unbounded, irregular stream of metric
// snapshots into something a chart can draw: one short, ordered history per zone.
//
// Key architectural principles:
// 1.  **Bounded memory**: every zone's history is a FIFO capped at
//     `SERIES_CAPACITY` samples. Appending is the only mutation; the oldest sample
//     falls off the front once the cap is exceeded.
// 2.  **Local time**: samples are stamped with the wall-clock label at the moment
//     of receipt. The service's own timestamps are not trusted for charting.
// 3.  **No decay**: a zone missing from a snapshot keeps its history untouched.
//     Zones are never forgotten for the rest of the session.
// 4.  **All or nothing**: a snapshot whose footfall summary has the wrong shape is
//     skipped entirely, so a bad payload can never leave half-updated series.

use crate::error::ZoneError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};

/// Maximum number of samples retained per zone.
pub const SERIES_CAPACITY: usize = 40;

const FOOTFALL_SUMMARY_KEY: &str = "footfall_summary";

/// A structured metrics snapshot from the stream. Kept opaque apart from the
/// footfall summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TelemetrySnapshot(Value);

#[derive(Debug, Clone, Deserialize)]
struct FootfallSummary {
    zone_footfall: BTreeMap<String, i64>,
}

impl TelemetrySnapshot {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Pretty-printed JSON for the response panel.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| self.0.to_string())
    }

    /// Per-zone counts, `Ok(None)` when the snapshot carries no summary.
    pub fn zone_footfall(&self) -> Result<Option<BTreeMap<String, i64>>, ZoneError> {
        let Some(summary) = self.0.get(FOOTFALL_SUMMARY_KEY) else {
            return Ok(None);
        };
        if summary.is_null() {
            return Ok(None);
        }
        let summary = FootfallSummary::deserialize(summary)
            .map_err(|e| ZoneError::MalformedTelemetry(e.to_string()))?;
        Ok(Some(summary.zone_footfall))
    }
}

/// One chart point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FootfallSample {
    pub time: String,
    pub footfall: i64,
}

/// Source of the time label stamped on each sample.
pub trait Clock: Send {
    fn time_label(&self) -> String;
}

/// Local wall-clock time, formatted like `3:07:42 PM`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn time_label(&self) -> String {
        chrono::Local::now().format("%-I:%M:%S %p").to_string()
    }
}

pub struct TelemetryAggregator {
    series: BTreeMap<String, VecDeque<FootfallSample>>,
    clock: Box<dyn Clock>,
}

impl TelemetryAggregator {
    pub fn new() -> Self {
        Self::with_clock(Box::new(LocalClock))
    }

    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self {
            series: BTreeMap::new(),
            clock,
        }
    }

    /// Folds one snapshot into the per-zone series.
    ///
    /// Returns how many zones received a sample. A snapshot without a summary,
    /// or with a malformed one, leaves the aggregator untouched.
    pub fn ingest(&mut self, snapshot: &TelemetrySnapshot) -> Result<usize, ZoneError> {
        let Some(zone_footfall) = snapshot.zone_footfall()? else {
            return Ok(0);
        };

        // One label per snapshot: every zone in it shares the same receipt time.
        let time = self.clock.time_label();
        for (zone, count) in &zone_footfall {
            let history = self
                .series
                .entry(zone.clone())
                .or_insert_with(|| VecDeque::with_capacity(SERIES_CAPACITY + 1));
            history.push_back(FootfallSample { time: time.clone(), footfall: *count });
            while history.len() > SERIES_CAPACITY {
                history.pop_front();
            }
        }
        Ok(zone_footfall.len())
    }

    pub fn series(&self, zone: &str) -> Option<&VecDeque<FootfallSample>> {
        self.series.get(zone)
    }

    pub fn zones(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Copies every series out in chart order, for handing to a renderer.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<FootfallSample>> {
        self.series
            .iter()
            .map(|(zone, history)| (zone.clone(), history.iter().cloned().collect()))
            .collect()
    }

    pub fn clear(&mut self) {
        self.series.clear();
    }
}

impl Default for TelemetryAggregator {
    fn default() -> Self {
        Self::new()
    }
}
