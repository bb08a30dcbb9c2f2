use crate::emotion::domain::emotion::Emotion;
use crate::shared::bounding_box::BoundingBox;

/// A classified face in the frame currently being processed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceObservation {
    pub bbox: BoundingBox,
    pub centroid: (f64, f64),
    pub emotion: Emotion,
}

impl FaceObservation {
    pub fn new(bbox: BoundingBox, emotion: Emotion) -> Self {
        Self {
            bbox,
            centroid: bbox.centroid(),
            emotion,
        }
    }
}
