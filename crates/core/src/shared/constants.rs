use std::time::Duration;

pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMOTION_MODEL_NAME: &str = "emotion-ferplus-8.onnx";
pub const EMOTION_MODEL_URL: &str =
    "https://github.com/onnx/models/raw/main/validated/vision/body_analysis/emotion_ferplus/model/emotion-ferplus-8.onnx";

/// Frames buffered between capture and processing before new ones are dropped.
pub const FRAME_QUEUE_CAPACITY: usize = 3;

/// Max centroid distance (pixels) for a detection to inherit a track id.
pub const TRACKING_THRESHOLD_PX: f64 = 75.0;

/// Cycles a track may go unmatched before eviction. Zero rebuilds the track
/// table from each frame's detections.
pub const TRACK_MAX_MISSED: u32 = 0;

/// Pause between capture reads; also bounds how long the capture loop takes
/// to notice cancellation.
pub const CAPTURE_INTERVAL: Duration = Duration::from_millis(10);

/// Longest the processing loop waits on an empty queue before re-checking
/// cancellation.
pub const PROCESSING_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Stream consumers poll for a new annotated frame at this cadence.
pub const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound on waiting for each worker during stop.
pub const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long `start` waits for a worker that missed its stop deadline.
pub const WORKER_RECLAIM_TIMEOUT: Duration = Duration::from_millis(100);

/// Per-call classifier deadline; an expired call counts as a failure.
pub const CLASSIFY_DEADLINE: Duration = Duration::from_millis(500);

pub const CAPTURE_WIDTH: u32 = 640;
pub const CAPTURE_HEIGHT: u32 = 480;
pub const CAPTURE_FPS: u32 = 24;

pub const STREAM_JPEG_QUALITY: u8 = 80;

/// Placeholder shown on the dashboard before any emotion has been logged.
pub const DASHBOARD_EMOTION_PLACEHOLDER: &str = "N/A";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
