use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::detection::domain::face_detector::FaceDetector;
use crate::emotion::domain::emotion::Emotion;
use crate::emotion::domain::emotion_classifier::{classify_or_fallback, EmotionClassifier};
use crate::pipeline::emotion_summary::EmotionSummary;
use crate::pipeline::frame_queue::{FrameReceiver, Poll};
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::snapshot::{PipelineSnapshot, SnapshotCell};
use crate::pipeline::worker::{spawn_worker, WorkerHandle};
use crate::rendering::domain::frame_annotator::FrameAnnotator;
use crate::shared::cancellation::CancellationToken;
use crate::shared::frame::Frame;
use crate::tracking::domain::face_observation::FaceObservation;
use crate::tracking::domain::face_tracker::FaceTracker;

/// One processing cycle: detect → classify → track → annotate → summarise.
///
/// Owns the session's track table, so it must only ever be driven by one
/// thread. Moves into the processing worker for the length of a session and
/// comes back when the worker stops.
pub struct FrameProcessor {
    detector: Box<dyn FaceDetector>,
    classifier: Box<dyn EmotionClassifier>,
    annotator: Box<dyn FrameAnnotator>,
    tracker: FaceTracker,
    logger: Box<dyn PipelineLogger>,
    cycle: u64,
}

impl FrameProcessor {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        classifier: Box<dyn EmotionClassifier>,
        annotator: Box<dyn FrameAnnotator>,
        tracker: FaceTracker,
        logger: Box<dyn PipelineLogger>,
    ) -> Self {
        Self {
            detector,
            classifier,
            annotator,
            tracker,
            logger,
            cycle: 0,
        }
    }

    /// Runs one cycle on `frame`. Returns `None` when detection failed and
    /// the frame was skipped.
    pub fn process(&mut self, mut frame: Frame) -> Option<PipelineSnapshot> {
        let t0 = Instant::now();
        let boxes = match self.detector.detect(&frame) {
            Ok(boxes) => boxes,
            Err(e) => {
                log::warn!("Face detection failed on frame {}: {e}", frame.index());
                return None;
            }
        };
        let t1 = Instant::now();

        // A box with no pixels inside the frame still counts as a face.
        let observations: Vec<FaceObservation> = boxes
            .into_iter()
            .map(|bbox| {
                let emotion = match frame.crop(&bbox) {
                    Some(crop) => classify_or_fallback(self.classifier.as_mut(), &crop),
                    None => Emotion::FALLBACK,
                };
                FaceObservation::new(bbox, emotion)
            })
            .collect();
        let t2 = Instant::now();

        let active = self.tracker.update(&observations);
        let summary = EmotionSummary::from_observations(&observations);
        let t3 = Instant::now();

        if let Err(e) = self.annotator.annotate(&mut frame, &active) {
            log::warn!("Annotating frame {} failed: {e}", frame.index());
        }
        let t4 = Instant::now();

        self.cycle += 1;
        self.logger.timing("detect", ms(t1 - t0));
        self.logger.timing("classify", ms(t2 - t1));
        self.logger.timing("track", ms(t3 - t2));
        self.logger.timing("annotate", ms(t4 - t3));
        self.logger.metric("faces", observations.len() as f64);
        self.logger.cycle_completed();

        Some(PipelineSnapshot {
            cycle: self.cycle,
            summary,
            tracks: self.tracker.tracks().to_vec(),
            frame: Some(frame),
        })
    }

    /// Clears session state: tracks, id counter, cycle count and logger.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.cycle = 0;
        self.logger.reset();
    }

    pub fn tracker(&self) -> &FaceTracker {
        &self.tracker
    }

    pub fn logger_mut(&mut self) -> &mut dyn PipelineLogger {
        self.logger.as_mut()
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Starts the processing loop.
///
/// Each iteration waits up to `poll_interval` for a frame, processes it and
/// publishes the result as one snapshot. The loop ends on cancellation,
/// once the capture side has gone and the queue is drained, or when the
/// snapshot cell has been reset since the worker started.
pub fn spawn_processing_worker(
    processor: FrameProcessor,
    frames: FrameReceiver,
    snapshots: Arc<SnapshotCell>,
    token: CancellationToken,
    poll_interval: Duration,
) -> WorkerHandle<FrameProcessor> {
    let epoch = snapshots.epoch();
    spawn_worker("processing", processor, move |processor| {
        while !token.is_cancelled() {
            let frame = match frames.poll(poll_interval) {
                Poll::Frame(frame) => frame,
                Poll::Empty => continue,
                Poll::Closed => {
                    processor.logger_mut().info("Frame queue closed; processing stops");
                    break;
                }
            };
            processor
                .logger_mut()
                .metric("queue_depth", frames.len() as f64);
            if let Some(snapshot) = processor.process(frame) {
                if !snapshots.publish(epoch, snapshot) {
                    processor
                        .logger_mut()
                        .info("Session state was reset; processing stops");
                    break;
                }
            }
        }
        processor
            .logger_mut()
            .metric("frames_dropped", frames.stats().dropped() as f64);
        processor.logger_mut().summary();
    })
}
