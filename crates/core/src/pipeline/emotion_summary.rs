use std::collections::BTreeMap;

use serde::Serialize;

use crate::emotion::domain::emotion::{most_common, Emotion};
use crate::tracking::domain::face_observation::FaceObservation;

/// Per-frame emotion histogram, replaced wholesale after every processed
/// frame. Counts cover the latest frame only, not the session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EmotionSummary {
    pub total_faces: usize,
    pub emotions: BTreeMap<Emotion, usize>,
}

impl EmotionSummary {
    /// Summarises one frame. A frame without faces reports `{neutral: 0}`.
    pub fn from_observations(observations: &[FaceObservation]) -> Self {
        let mut emotions = BTreeMap::new();
        for obs in observations {
            *emotions.entry(obs.emotion).or_insert(0) += 1;
        }
        if emotions.is_empty() {
            emotions.insert(Emotion::FALLBACK, 0);
        }
        Self {
            total_faces: observations.len(),
            emotions,
        }
    }

    /// Highest-count label, `neutral` when nothing was counted.
    pub fn most_common(&self) -> Emotion {
        most_common(&self.emotions).unwrap_or(Emotion::FALLBACK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::bounding_box::BoundingBox;

    fn obs(emotion: Emotion) -> FaceObservation {
        FaceObservation::new(BoundingBox::new(0, 0, 10, 10), emotion)
    }

    #[test]
    fn test_counts_labels_in_frame() {
        let summary =
            EmotionSummary::from_observations(&[obs(Emotion::Happy), obs(Emotion::Happy), obs(Emotion::Sad)]);
        assert_eq!(summary.total_faces, 3);
        assert_eq!(
            summary.emotions,
            BTreeMap::from([(Emotion::Happy, 2), (Emotion::Sad, 1)])
        );
        assert_eq!(summary.most_common(), Emotion::Happy);
    }

    #[test]
    fn test_empty_frame_reports_zero_neutral() {
        let summary = EmotionSummary::from_observations(&[]);
        assert_eq!(summary.total_faces, 0);
        assert_eq!(summary.emotions, BTreeMap::from([(Emotion::Neutral, 0)]));
        assert_eq!(summary.most_common(), Emotion::Neutral);
    }

    #[test]
    fn test_default_is_empty() {
        let summary = EmotionSummary::default();
        assert_eq!(summary.total_faces, 0);
        assert!(summary.emotions.is_empty());
        assert_eq!(summary.most_common(), Emotion::Neutral);
    }

    #[test]
    fn test_serializes_lowercase_keys() {
        let summary = EmotionSummary::from_observations(&[obs(Emotion::Happy)]);
        assert_eq!(
            serde_json::to_string(&summary).unwrap(),
            r#"{"total_faces":1,"emotions":{"happy":1}}"#
        );
    }
}
