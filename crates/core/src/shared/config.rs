use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::constants::{
    CAPTURE_INTERVAL, CLASSIFY_DEADLINE, FRAME_QUEUE_CAPACITY, PROCESSING_POLL_INTERVAL,
    STREAM_JPEG_QUALITY, STREAM_POLL_INTERVAL, TRACKING_THRESHOLD_PX, TRACK_MAX_MISSED,
    WORKER_JOIN_TIMEOUT,
};

/// Every tunable of a capture session.
///
/// Missing fields in a JSON config fall back to the defaults in
/// [`crate::shared::constants`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub tracking_threshold_px: f64,
    pub track_max_missed: u32,
    pub capture_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub stream_interval_ms: u64,
    pub join_timeout_ms: u64,
    /// `None` calls the classifier inline with no deadline.
    pub classify_deadline_ms: Option<u64>,
    pub jpeg_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: FRAME_QUEUE_CAPACITY,
            tracking_threshold_px: TRACKING_THRESHOLD_PX,
            track_max_missed: TRACK_MAX_MISSED,
            capture_interval_ms: CAPTURE_INTERVAL.as_millis() as u64,
            poll_interval_ms: PROCESSING_POLL_INTERVAL.as_millis() as u64,
            stream_interval_ms: STREAM_POLL_INTERVAL.as_millis() as u64,
            join_timeout_ms: WORKER_JOIN_TIMEOUT.as_millis() as u64,
            classify_deadline_ms: Some(CLASSIFY_DEADLINE.as_millis() as u64),
            jpeg_quality: STREAM_JPEG_QUALITY,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stream_interval(&self) -> Duration {
        Duration::from_millis(self.stream_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn classify_deadline(&self) -> Option<Duration> {
        self.classify_deadline_ms.map(Duration::from_millis)
    }
}
