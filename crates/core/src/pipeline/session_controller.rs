//! Session lifecycle: the single entry point for starting and stopping a
//! capture session and for reading its live output.
//!
//! ```text
//!            start() ok
//!   Idle ─────────────────▶ Running
//!    ▲                         │
//!    └──────── stop() ─────────┘
//! ```
//!
//! Transitions are serialized by one lock held only for the transition.
//! Live reads (`summary`, `snapshot`, `status`, `stream_frames`) never take
//! that lock.
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;

use crate::capture::domain::capture_device::CaptureDevice;
use crate::detection::domain::face_detector::FaceDetector;
use crate::emotion::domain::emotion_classifier::EmotionClassifier;
use crate::emotion::infrastructure::deadline_classifier::DeadlineClassifier;
use crate::persistence::domain::session_store::{SessionId, SessionStore, StoreError};
use crate::pipeline::capture_worker::spawn_capture_worker;
use crate::pipeline::emotion_summary::EmotionSummary;
use crate::pipeline::frame_queue::{frame_queue, QueueStats};
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::processing_worker::{spawn_processing_worker, FrameProcessor};
use crate::pipeline::session_aggregator::{SessionAggregator, SessionReport};
use crate::pipeline::snapshot::{PipelineSnapshot, SnapshotCell};
use crate::pipeline::worker::{WorkerHandle, WorkerHealth, WorkerState};
use crate::rendering::domain::frame_annotator::FrameAnnotator;
use crate::shared::cancellation::CancellationToken;
use crate::shared::config::PipelineConfig;
use crate::shared::constants::WORKER_RECLAIM_TIMEOUT;
use crate::streaming::frame_stream::FrameStream;
use crate::tracking::domain::face_tracker::FaceTracker;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("A session is already running")]
    AlreadyRunning,
    #[error("No active session")]
    NotRunning,
    #[error("Capture device unavailable: {0}")]
    CaptureUnavailable(String),
    #[error("Session store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
    #[error("Workers of the previous session are still stopping")]
    ComponentsUnavailable,
}

/// The capabilities a controller drives. Owned by the controller between
/// sessions and lent to the workers while one runs.
pub struct PipelineComponents {
    pub device: Box<dyn CaptureDevice>,
    pub detector: Box<dyn FaceDetector>,
    pub classifier: Box<dyn EmotionClassifier>,
    pub annotator: Box<dyn FrameAnnotator>,
    pub logger: Box<dyn PipelineLogger>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
}

/// Point-in-time view of the controller for health checks.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ControllerStatus {
    pub state: SessionState,
    pub session_id: Option<SessionId>,
    pub cycles: u64,
    pub frames_enqueued: u64,
    pub frames_dropped: u64,
    pub capture_worker: Option<WorkerState>,
    pub processing_worker: Option<WorkerState>,
}

enum ControllerState {
    Idle {
        device: Option<Slot<Box<dyn CaptureDevice>>>,
        processor: Option<Slot<FrameProcessor>>,
    },
    Running(RunningSession),
}

impl ControllerState {
    fn idle(device: Box<dyn CaptureDevice>, processor: FrameProcessor) -> Self {
        ControllerState::Idle {
            device: Some(Slot::Ready(device)),
            processor: Some(Slot::Ready(processor)),
        }
    }
}

/// A component at rest, or still held by a worker that missed its join
/// deadline at stop.
enum Slot<S> {
    Ready(S),
    Stopping(WorkerHandle<S>),
}

impl<S> Slot<S> {
    fn from_finished(finished: Result<S, WorkerHandle<S>>) -> Self {
        match finished {
            Ok(component) => Slot::Ready(component),
            Err(handle) => Slot::Stopping(handle),
        }
    }
}

/// Takes the component out of `slot`, waiting up to `timeout` for a worker
/// that still holds it. A worker that keeps holding it stays in the slot.
fn reclaim<S>(slot: &mut Option<Slot<S>>, timeout: Duration) -> Option<S> {
    match slot.take()? {
        Slot::Ready(component) => Some(component),
        Slot::Stopping(handle) => match handle.finish(timeout) {
            Ok(component) => Some(component),
            Err(handle) => {
                *slot = Some(Slot::Stopping(handle));
                None
            }
        },
    }
}

struct RunningSession {
    session_id: SessionId,
    token: CancellationToken,
    capture: WorkerHandle<Box<dyn CaptureDevice>>,
    processing: WorkerHandle<FrameProcessor>,
}

/// Handles readers need while a session runs; cheap to clone.
#[derive(Clone)]
struct LiveSession {
    session_id: SessionId,
    token: CancellationToken,
    capture: WorkerHealth,
    processing: WorkerHealth,
    queue: QueueStats,
}

pub struct SessionController {
    state: Mutex<ControllerState>,
    live: RwLock<Option<LiveSession>>,
    snapshots: Arc<SnapshotCell>,
    aggregator: SessionAggregator,
    config: PipelineConfig,
}

impl SessionController {
    /// Builds an idle controller. When the config sets a classification
    /// deadline, the classifier is wrapped in a [`DeadlineClassifier`].
    pub fn new(
        components: PipelineComponents,
        store: Arc<dyn SessionStore>,
        config: PipelineConfig,
    ) -> Self {
        let classifier: Box<dyn EmotionClassifier> = match config.classify_deadline() {
            Some(deadline) => Box::new(DeadlineClassifier::new(components.classifier, deadline)),
            None => components.classifier,
        };
        let processor = FrameProcessor::new(
            components.detector,
            classifier,
            components.annotator,
            FaceTracker::new(config.tracking_threshold_px, config.track_max_missed),
            components.logger,
        );

        Self {
            state: Mutex::new(ControllerState::idle(components.device, processor)),
            live: RwLock::new(None),
            snapshots: Arc::new(SnapshotCell::new()),
            aggregator: SessionAggregator::new(store),
            config,
        }
    }

    /// Opens the device, records a new session and starts both workers.
    ///
    /// Fails without side effects when a session is already running, a
    /// worker of the previous session has still not handed its component
    /// back, the device cannot be opened or the store cannot create the
    /// session.
    pub fn start(&self, user_id: Option<u32>) -> Result<SessionId, SessionError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let (mut device, mut processor) = match &mut *state {
            ControllerState::Running(_) => return Err(SessionError::AlreadyRunning),
            ControllerState::Idle { device, processor } => {
                let reclaimed = (
                    reclaim(device, WORKER_RECLAIM_TIMEOUT),
                    reclaim(processor, WORKER_RECLAIM_TIMEOUT),
                );
                match reclaimed {
                    (Some(d), Some(p)) => (d, p),
                    (d, p) => {
                        if let Some(d) = d {
                            *device = Some(Slot::Ready(d));
                        }
                        if let Some(p) = p {
                            *processor = Some(Slot::Ready(p));
                        }
                        return Err(SessionError::ComponentsUnavailable);
                    }
                }
            }
        };

        if let Err(e) = device.open() {
            log::error!("Could not open capture device: {e}");
            *state = ControllerState::idle(device, processor);
            return Err(SessionError::CaptureUnavailable(e.to_string()));
        }
        let session_id = match self.aggregator.begin(user_id) {
            Ok(id) => id,
            Err(e) => {
                log::error!("Could not create session record: {e}");
                device.release();
                *state = ControllerState::idle(device, processor);
                return Err(e.into());
            }
        };
        processor.reset();
        self.snapshots.reset();
        processor
            .logger_mut()
            .info(&format!("Session {session_id} running"));

        let (frames_tx, frames_rx) = frame_queue(self.config.queue_capacity);
        let queue = frames_tx.stats();
        let token = CancellationToken::new();
        let capture = spawn_capture_worker(
            device,
            frames_tx,
            token.clone(),
            self.config.capture_interval(),
        );
        let processing = spawn_processing_worker(
            processor,
            frames_rx,
            self.snapshots.clone(),
            token.clone(),
            self.config.poll_interval(),
        );

        *self.live.write().unwrap_or_else(PoisonError::into_inner) = Some(LiveSession {
            session_id,
            token: token.clone(),
            capture: capture.health(),
            processing: processing.health(),
            queue,
        });
        *state = ControllerState::Running(RunningSession {
            session_id,
            token,
            capture,
            processing,
        });
        Ok(session_id)
    }

    /// Stops the running session and persists its aggregates.
    ///
    /// Returns `None` without touching anything when no session is running.
    /// Store failures are logged and reflected in the report; the controller
    /// always ends up idle with its tracks and summary cleared. A worker that
    /// misses the join timeout keeps its component until a later `start`
    /// collects it.
    pub fn stop(&self) -> Option<SessionReport> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let running = match std::mem::replace(
            &mut *state,
            ControllerState::Idle {
                device: None,
                processor: None,
            },
        ) {
            ControllerState::Running(running) => running,
            idle => {
                *state = idle;
                return None;
            }
        };

        *self.live.write().unwrap_or_else(PoisonError::into_inner) = None;
        running.token.cancel();

        // The capture worker releases the device itself, even after a panic.
        let timeout = self.config.join_timeout();
        let device = running.capture.finish(timeout);
        let processor = running.processing.finish(timeout);

        let last = self.snapshots.load();
        let report = self.aggregator.finalize(running.session_id, &last);

        self.snapshots.reset();
        let processor = processor.map(|mut processor| {
            processor.reset();
            processor
        });
        *state = ControllerState::Idle {
            device: Some(Slot::from_finished(device)),
            processor: Some(Slot::from_finished(processor)),
        };
        Some(report)
    }

    pub fn is_running(&self) -> bool {
        self.live_session().is_some()
    }

    /// Live summary of the most recent cycle.
    pub fn summary(&self) -> Result<EmotionSummary, SessionError> {
        self.live_session().ok_or(SessionError::NotRunning)?;
        Ok(self.snapshots.load().summary.clone())
    }

    /// Latest published snapshot, or `None` when idle.
    pub fn snapshot(&self) -> Option<Arc<PipelineSnapshot>> {
        self.live_session().map(|_| self.snapshots.load())
    }

    pub fn status(&self) -> ControllerStatus {
        match self.live_session() {
            Some(live) => ControllerStatus {
                state: SessionState::Running,
                session_id: Some(live.session_id),
                cycles: self.snapshots.load().cycle,
                frames_enqueued: live.queue.enqueued(),
                frames_dropped: live.queue.dropped(),
                capture_worker: Some(live.capture.state()),
                processing_worker: Some(live.processing.state()),
            },
            None => ControllerStatus {
                state: SessionState::Idle,
                session_id: None,
                cycles: 0,
                frames_enqueued: 0,
                frames_dropped: 0,
                capture_worker: None,
                processing_worker: None,
            },
        }
    }

    /// Encoded frames of the running session, ending when it stops.
    pub fn stream_frames(&self) -> Result<FrameStream, SessionError> {
        let live = self.live_session().ok_or(SessionError::NotRunning)?;
        Ok(FrameStream::new(
            self.snapshots.clone(),
            live.token,
            vec![live.capture, live.processing],
            self.config.stream_interval(),
            self.config.jpeg_quality,
        ))
    }

    /// Read side of the store, for dashboards.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        self.aggregator.store()
    }

    fn live_session(&self) -> Option<LiveSession> {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if self.stop().is_some() {
            log::info!("Stopped running session on shutdown");
        }
    }
}
