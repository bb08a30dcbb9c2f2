use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Dominant facial expression assigned to a face.
///
/// Serialized in lowercase (`"happy"`, `"neutral"`, ...), which is also the
/// label drawn on frames and written to emotion logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Angry,
    Contempt,
    Disgust,
    Fear,
    Happy,
    Neutral,
    Sad,
    Surprise,
}

impl Emotion {
    pub const ALL: &[Emotion] = &[
        Emotion::Angry,
        Emotion::Contempt,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Neutral,
        Emotion::Sad,
        Emotion::Surprise,
    ];

    /// Label used whenever classification fails or yields nothing.
    pub const FALLBACK: Emotion = Emotion::Neutral;

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Angry => "angry",
            Emotion::Contempt => "contempt",
            Emotion::Disgust => "disgust",
            Emotion::Fear => "fear",
            Emotion::Happy => "happy",
            Emotion::Neutral => "neutral",
            Emotion::Sad => "sad",
            Emotion::Surprise => "surprise",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label with the highest non-zero count. Ties go to the label that sorts
/// first; `None` when nothing was counted.
pub fn most_common(counts: &BTreeMap<Emotion, usize>) -> Option<Emotion> {
    counts
        .iter()
        .filter(|(_, &n)| n > 0)
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(&emotion, _)| emotion)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown emotion label: {0:?}")]
pub struct UnknownEmotion(pub String);

impl FromStr for Emotion {
    type Err = UnknownEmotion;

    /// Accepts the lowercase labels plus the FER+ dataset spellings
    /// (`happiness`, `sadness`, `anger`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "angry" | "anger" => Ok(Emotion::Angry),
            "contempt" => Ok(Emotion::Contempt),
            "disgust" => Ok(Emotion::Disgust),
            "fear" => Ok(Emotion::Fear),
            "happy" | "happiness" => Ok(Emotion::Happy),
            "neutral" => Ok(Emotion::Neutral),
            "sad" | "sadness" => Ok(Emotion::Sad),
            "surprise" => Ok(Emotion::Surprise),
            _ => Err(UnknownEmotion(s.to_string())),
        }
    }
}
