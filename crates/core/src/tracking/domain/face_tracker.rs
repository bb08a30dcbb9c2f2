/// Nearest-centroid face tracker.
///
/// Each observation inherits the id of the closest unclaimed track whose
/// last centroid lies strictly within `threshold_px`; otherwise it gets a
/// fresh id from a per-session counter. Association is a single greedy pass
/// in detection order, so near-ties resolve by whichever detection comes
/// first. Tracks that go unmatched for more than `max_missed` cycles are
/// evicted; with the default of zero the table is rebuilt from every frame.
use serde::Serialize;

use crate::emotion::domain::emotion::Emotion;
use crate::shared::bounding_box::{distance, BoundingBox};
use crate::tracking::domain::face_observation::FaceObservation;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Track {
    pub id: u32,
    pub centroid: (f64, f64),
    pub emotion: Emotion,
    pub bbox: BoundingBox,
    /// Consecutive cycles without a matching detection.
    pub missed: u32,
}

impl Track {
    /// Matched in the most recent cycle.
    pub fn is_active(&self) -> bool {
        self.missed == 0
    }
}

pub struct FaceTracker {
    tracks: Vec<Track>,
    next_id: u32,
    threshold_px: f64,
    max_missed: u32,
}

impl FaceTracker {
    pub fn new(threshold_px: f64, max_missed: u32) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            threshold_px,
            max_missed,
        }
    }

    /// Associates this cycle's observations with tracks and returns the
    /// tracks matched this cycle, in table order.
    pub fn update(&mut self, observations: &[FaceObservation]) -> Vec<Track> {
        let mut claimed = vec![false; self.tracks.len()];

        for obs in observations {
            match self.nearest_unclaimed(obs.centroid, &claimed) {
                Some(idx) => {
                    let track = &mut self.tracks[idx];
                    track.centroid = obs.centroid;
                    track.emotion = obs.emotion;
                    track.bbox = obs.bbox;
                    track.missed = 0;
                    claimed[idx] = true;
                }
                None => {
                    self.tracks.push(Track {
                        id: self.next_id,
                        centroid: obs.centroid,
                        emotion: obs.emotion,
                        bbox: obs.bbox,
                        missed: 0,
                    });
                    self.next_id += 1;
                    claimed.push(true);
                }
            }
        }

        for (track, was_claimed) in self.tracks.iter_mut().zip(&claimed) {
            if !was_claimed {
                track.missed += 1;
            }
        }
        let max_missed = self.max_missed;
        self.tracks.retain(|t| t.missed <= max_missed);

        self.active_tracks()
    }

    fn nearest_unclaimed(&self, centroid: (f64, f64), claimed: &[bool]) -> Option<usize> {
        self.tracks
            .iter()
            .enumerate()
            .filter(|(i, _)| !claimed[*i])
            .map(|(i, t)| (i, distance(t.centroid, centroid)))
            .filter(|(_, d)| *d < self.threshold_px)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Every track still held, including ones unmatched this cycle.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn active_tracks(&self) -> Vec<Track> {
        self.tracks.iter().filter(|t| t.is_active()).cloned().collect()
    }

    /// Clears the table and restarts ids at 1 for a new session.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
    }
}
