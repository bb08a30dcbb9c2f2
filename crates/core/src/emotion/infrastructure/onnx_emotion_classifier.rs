use std::path::Path;

use image::{DynamicImage, GrayImage, RgbImage};
use ndarray::Array4;

use crate::emotion::domain::emotion::Emotion;
use crate::emotion::domain::emotion_classifier::EmotionClassifier;
use crate::shared::frame::Frame;
use crate::shared::onnx_session::load_session;

/// FER+ input side length.
const INPUT_SIZE: u32 = 64;

/// Output order of the FER+ model's score vector.
const FERPLUS_LABELS: [Emotion; 8] = [
    Emotion::Neutral,
    Emotion::Happy,
    Emotion::Surprise,
    Emotion::Sad,
    Emotion::Angry,
    Emotion::Disgust,
    Emotion::Fear,
    Emotion::Contempt,
];

/// Emotion classifier running the FER+ ONNX model.
///
/// Faces are converted to grayscale, resized to 64x64 and fed as raw
/// `0..=255` intensities in NCHW layout; the highest score wins.
pub struct OnnxEmotionClassifier {
    session: ort::session::Session,
}

impl OnnxEmotionClassifier {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        // Small model; one intra-op thread leaves cores to the detector.
        let session = load_session(model_path, 1)?;
        Ok(Self { session })
    }
}

impl EmotionClassifier for OnnxEmotionClassifier {
    fn classify(&mut self, face: &Frame) -> Result<Option<Emotion>, Box<dyn std::error::Error>> {
        let Some(input) = preprocess(face)? else {
            return Ok(None);
        };
        let input_value = ort::value::Tensor::from_array(input)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("Emotion model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let scores = tensor.as_slice().ok_or("Cannot get tensor slice")?;
        Ok(best_label(scores))
    }
}

/// Converts a face crop into the model's `[1, 1, 64, 64]` input, or `None`
/// for an empty crop.
fn preprocess(face: &Frame) -> Result<Option<Array4<f32>>, Box<dyn std::error::Error>> {
    if face.width() == 0 || face.height() == 0 {
        return Ok(None);
    }
    let gray = to_gray(face)?;
    let resized = image::imageops::resize(
        &gray,
        INPUT_SIZE,
        INPUT_SIZE,
        image::imageops::FilterType::Triangle,
    );

    let side = INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 1, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        tensor[[0, 0, y as usize, x as usize]] = pixel.0[0] as f32;
    }
    Ok(Some(tensor))
}

fn to_gray(face: &Frame) -> Result<GrayImage, Box<dyn std::error::Error>> {
    let (w, h) = (face.width(), face.height());
    match face.channels() {
        1 => GrayImage::from_raw(w, h, face.data().to_vec()).ok_or_else(|| "Bad gray crop".into()),
        3 => {
            let rgb = RgbImage::from_raw(w, h, face.data().to_vec()).ok_or("Bad RGB crop")?;
            Ok(DynamicImage::ImageRgb8(rgb).into_luma8())
        }
        n => Err(format!("Unsupported channel count for emotion model: {n}").into()),
    }
}

fn best_label(scores: &[f32]) -> Option<Emotion> {
    scores
        .iter()
        .take(FERPLUS_LABELS.len())
        .enumerate()
        .filter(|(_, s)| s.is_finite())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| FERPLUS_LABELS[i])
}
