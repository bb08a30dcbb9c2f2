use std::panic::{self, AssertUnwindSafe};

use crate::emotion::domain::emotion::Emotion;
use crate::shared::frame::Frame;

/// Domain interface for facial expression classification.
///
/// Receives a face crop and returns its dominant emotion, `Ok(None)` when the
/// model has no opinion, or an error.
pub trait EmotionClassifier: Send {
    fn classify(&mut self, face: &Frame) -> Result<Option<Emotion>, Box<dyn std::error::Error>>;
}

/// Classifies `face`, collapsing every failure mode into [`Emotion::FALLBACK`].
///
/// Errors, empty results and panics inside the classifier all yield
/// `neutral`; nothing escapes to the caller.
pub fn classify_or_fallback(classifier: &mut dyn EmotionClassifier, face: &Frame) -> Emotion {
    match panic::catch_unwind(AssertUnwindSafe(|| classifier.classify(face))) {
        Ok(Ok(Some(emotion))) => emotion,
        Ok(Ok(None)) => Emotion::FALLBACK,
        Ok(Err(e)) => {
            log::debug!("Emotion classification failed: {e}");
            Emotion::FALLBACK
        }
        Err(_) => {
            log::warn!("Emotion classifier panicked; using {}", Emotion::FALLBACK);
            Emotion::FALLBACK
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClassifier(Option<Emotion>);

    impl EmotionClassifier for FixedClassifier {
        fn classify(&mut self, _: &Frame) -> Result<Option<Emotion>, Box<dyn std::error::Error>> {
            Ok(self.0)
        }
    }

    struct FailingClassifier;

    impl EmotionClassifier for FailingClassifier {
        fn classify(&mut self, _: &Frame) -> Result<Option<Emotion>, Box<dyn std::error::Error>> {
            Err("model exploded".into())
        }
    }

    struct PanickingClassifier;

    impl EmotionClassifier for PanickingClassifier {
        fn classify(&mut self, _: &Frame) -> Result<Option<Emotion>, Box<dyn std::error::Error>> {
            panic!("boom");
        }
    }

    fn face() -> Frame {
        Frame::new(vec![0u8; 12], 2, 2, 3, 0)
    }

    #[test]
    fn test_passes_through_label() {
        let mut classifier = FixedClassifier(Some(Emotion::Happy));
        assert_eq!(classify_or_fallback(&mut classifier, &face()), Emotion::Happy);
    }

    #[test]
    fn test_empty_result_is_neutral() {
        let mut classifier = FixedClassifier(None);
        assert_eq!(classify_or_fallback(&mut classifier, &face()), Emotion::Neutral);
    }

    #[test]
    fn test_error_is_neutral() {
        assert_eq!(
            classify_or_fallback(&mut FailingClassifier, &face()),
            Emotion::Neutral
        );
    }

    #[test]
    fn test_panic_is_neutral() {
        assert_eq!(
            classify_or_fallback(&mut PanickingClassifier, &face()),
            Emotion::Neutral
        );
    }
}
