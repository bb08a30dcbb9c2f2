use std::path::{Path, PathBuf};

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing;
use imageproc::rect::Rect;

use crate::rendering::domain::frame_annotator::{track_label, FrameAnnotator};
use crate::shared::frame::Frame;
use crate::tracking::domain::face_tracker::Track;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_SCALE: f32 = 18.0;
/// Gap between the label baseline area and the top edge of the box.
const LABEL_MARGIN: i32 = 4;

/// Fonts tried by [`LabelAnnotator::with_system_font`], first hit wins.
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Draws a green box around every track and, when a font is available, an
/// `emotion (ID: n)` label above it.
///
/// `imageproc` has no built-in font, so without one only boxes are drawn.
pub struct LabelAnnotator {
    font: Option<FontArc>,
}

impl LabelAnnotator {
    /// Box-only annotator.
    pub fn new() -> Self {
        Self { font: None }
    }

    pub fn with_font(font_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let bytes = std::fs::read(font_path)?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| format!("Invalid font {}: {e}", font_path.display()))?;
        Ok(Self { font: Some(font) })
    }

    /// Uses the first common system font found, falling back to boxes only.
    pub fn with_system_font() -> Self {
        let found = SYSTEM_FONT_CANDIDATES
            .iter()
            .map(PathBuf::from)
            .filter(|p| p.is_file())
            .find_map(|p| Self::with_font(&p).ok());
        match found {
            Some(annotator) => annotator,
            None => {
                log::warn!("No system font found; frames will carry boxes without labels");
                Self::new()
            }
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }
}

impl Default for LabelAnnotator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAnnotator for LabelAnnotator {
    fn annotate(
        &self,
        frame: &mut Frame,
        tracks: &[Track],
    ) -> Result<(), Box<dyn std::error::Error>> {
        if tracks.is_empty() {
            return Ok(());
        }
        if frame.channels() != 3 {
            return Err(format!("Cannot annotate {}-channel frame", frame.channels()).into());
        }
        let (fw, fh) = (frame.width(), frame.height());
        let mut img = RgbImage::from_raw(fw, fh, frame.data().to_vec())
            .ok_or("Frame buffer does not match its dimensions")?;

        for track in tracks {
            let Some(bbox) = track.bbox.clamp_to(fw, fh) else {
                continue;
            };
            let rect = Rect::at(bbox.x, bbox.y).of_size(bbox.width as u32, bbox.height as u32);
            drawing::draw_hollow_rect_mut(&mut img, rect, BOX_COLOR);

            if let Some(font) = &self.font {
                let text_y = if bbox.y >= LABEL_SCALE as i32 + LABEL_MARGIN {
                    bbox.y - LABEL_SCALE as i32 - LABEL_MARGIN
                } else {
                    bbox.y + LABEL_MARGIN
                };
                drawing::draw_text_mut(
                    &mut img,
                    BOX_COLOR,
                    bbox.x,
                    text_y,
                    PxScale::from(LABEL_SCALE),
                    font,
                    &track_label(track),
                );
            }
        }

        frame.data_mut().copy_from_slice(img.as_raw());
        Ok(())
    }
}
