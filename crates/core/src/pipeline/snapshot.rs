use std::sync::{Arc, PoisonError, RwLock};

use crate::pipeline::emotion_summary::EmotionSummary;
use crate::shared::frame::Frame;
use crate::tracking::domain::face_tracker::Track;

/// Everything one processing cycle produced.
///
/// Published as a unit, so a reader never pairs the summary of one cycle
/// with the frame or tracks of another.
#[derive(Clone, Debug, Default)]
pub struct PipelineSnapshot {
    /// Completed cycles this session; `0` before the first one.
    pub cycle: u64,
    pub summary: EmotionSummary,
    /// Every resident track, including ones unmatched this cycle.
    pub tracks: Vec<Track>,
    /// Annotated frame of this cycle.
    pub frame: Option<Frame>,
}

impl PipelineSnapshot {
    pub fn active_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.is_active())
    }
}

/// Single-writer cell holding the latest [`PipelineSnapshot`].
///
/// The processing worker swaps in a fresh `Arc` per cycle; readers clone the
/// `Arc` and never hold the lock while working with it. Every [`reset`]
/// starts a new epoch, and a publish tagged with an older epoch is refused,
/// so a worker outliving its session cannot repopulate the cell.
///
/// [`reset`]: SnapshotCell::reset
#[derive(Default)]
pub struct SnapshotCell {
    current: RwLock<Published>,
}

#[derive(Default)]
struct Published {
    epoch: u64,
    snapshot: Arc<PipelineSnapshot>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Epoch a writer must present to [`publish`](Self::publish).
    pub fn epoch(&self) -> u64 {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .epoch
    }

    /// Stores `snapshot` unless the cell was reset after `epoch` was read.
    /// Returns whether it was stored.
    pub fn publish(&self, epoch: u64, snapshot: PipelineSnapshot) -> bool {
        let next = Arc::new(snapshot);
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if current.epoch != epoch {
            return false;
        }
        current.snapshot = next;
        true
    }

    pub fn load(&self) -> Arc<PipelineSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot
            .clone()
    }

    /// Replaces the current snapshot with an empty one and starts a new epoch.
    pub fn reset(&self) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        current.epoch += 1;
        current.snapshot = Arc::new(PipelineSnapshot::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::domain::emotion::Emotion;
    use crate::shared::bounding_box::BoundingBox;
    use crate::tracking::domain::face_observation::FaceObservation;
    use std::thread;

    fn snapshot(cycle: u64, faces: usize) -> PipelineSnapshot {
        let observations: Vec<FaceObservation> = (0..faces)
            .map(|i| FaceObservation::new(BoundingBox::new(i as i32 * 100, 0, 10, 10), Emotion::Happy))
            .collect();
        PipelineSnapshot {
            cycle,
            summary: EmotionSummary::from_observations(&observations),
            tracks: Vec::new(),
            frame: Some(Frame::new(vec![faces as u8; 3], 1, 1, 3, cycle as usize)),
        }
    }

    #[test]
    fn test_load_returns_latest_publish() {
        let cell = SnapshotCell::new();
        assert_eq!(cell.load().cycle, 0);
        assert!(cell.publish(cell.epoch(), snapshot(1, 2)));
        assert!(cell.publish(cell.epoch(), snapshot(2, 1)));
        assert_eq!(cell.load().cycle, 2);
        assert_eq!(cell.load().summary.total_faces, 1);
    }

    #[test]
    fn test_held_snapshot_is_unaffected_by_later_publish() {
        let cell = SnapshotCell::new();
        cell.publish(cell.epoch(), snapshot(1, 2));
        let held = cell.load();
        cell.publish(cell.epoch(), snapshot(2, 1));
        assert_eq!(held.cycle, 1);
        assert_eq!(held.summary.total_faces, 2);
    }

    #[test]
    fn test_reset_clears_everything() {
        let cell = SnapshotCell::new();
        cell.publish(cell.epoch(), snapshot(4, 3));
        cell.reset();
        let current = cell.load();
        assert_eq!(current.cycle, 0);
        assert_eq!(current.summary, EmotionSummary::default());
        assert!(current.tracks.is_empty());
        assert!(current.frame.is_none());
    }

    #[test]
    fn test_publish_from_before_reset_is_refused() {
        let cell = SnapshotCell::new();
        let stale = cell.epoch();
        cell.reset();

        assert!(!cell.publish(stale, snapshot(9, 2)));
        assert_eq!(cell.load().cycle, 0);
        assert!(cell.publish(cell.epoch(), snapshot(1, 1)));
        assert_eq!(cell.load().cycle, 1);
    }

    #[test]
    fn test_readers_never_see_torn_snapshots() {
        let cell = Arc::new(SnapshotCell::new());
        let writer = {
            let cell = cell.clone();
            thread::spawn(move || {
                let epoch = cell.epoch();
                for cycle in 1..=500u64 {
                    cell.publish(epoch, snapshot(cycle, (cycle % 4) as usize));
                }
            })
        };

        for _ in 0..500 {
            let snap = cell.load();
            if let Some(frame) = &snap.frame {
                // Frame, cycle and summary were all built by the same cycle.
                assert_eq!(frame.index() as u64, snap.cycle);
                assert_eq!(frame.data()[0] as usize, snap.summary.total_faces);
            }
        }
        writer.join().unwrap();
    }
}
