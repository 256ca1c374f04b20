//! Statistics and event records handed to the logging/export layer.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::constants::{FrameId, PageId, Pid, SegmentId};

/// Flat metric name -> value map.
///
/// Serializes as a plain JSON object so it can go straight to a sink.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Statistics(BTreeMap<String, f64>);

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a floating-point metric
    pub fn record(&mut self, name: &str, value: f64) {
        self.0.insert(name.to_string(), value);
    }

    /// Record a counter
    pub fn count(&mut self, name: &str, value: u64) {
        self.record(name, value as f64);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as `metric,value` lines with a header
    pub fn to_csv(&self) -> String {
        let mut out = String::from("metric,value\n");
        for (name, value) in self.iter() {
            let _ = writeln!(out, "{},{}", name, value);
        }
        out
    }
}

/// `num / den`, or 0 when nothing has been counted yet
pub fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// One record per engine step worth reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimEvent {
    Hit {
        tick: u64,
        pid: Pid,
        page: PageId,
        frame: FrameId,
    },
    Fault {
        tick: u64,
        pid: Pid,
        page: PageId,
        frame: FrameId,
    },
    Eviction {
        tick: u64,
        pid: Pid,
        page: PageId,
        frame: FrameId,
        /// Dirty victims are written back before the frame is reused
        written_back: bool,
    },
    SegmentationFault {
        pid: Pid,
        segment: SegmentId,
        offset: u64,
        size: u64,
    },
}
