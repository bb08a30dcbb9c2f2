use crate::shared::frame::Frame;
use crate::tracking::domain::face_tracker::Track;

/// Domain interface for drawing tracked faces onto a frame.
///
/// Implementations modify the frame in-place before it is published to the
/// live stream.
pub trait FrameAnnotator: Send {
    fn annotate(&self, frame: &mut Frame, tracks: &[Track])
        -> Result<(), Box<dyn std::error::Error>>;
}

/// Text drawn next to a tracked face, e.g. `happy (ID: 3)`.
pub fn track_label(track: &Track) -> String {
    format!("{} (ID: {})", track.emotion, track.id)
}
