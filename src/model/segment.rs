//! Transcript segments as delivered by the live transcription stream.

use serde::{Deserialize, Serialize};

/// One transcribed utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    /// Whether the wearer spoke this segment.
    #[serde(default)]
    pub is_user: bool,
    #[serde(default)]
    pub speaker: Option<String>,
    /// Offsets in seconds from the start of the recording.
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
}

impl TranscriptSegment {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: true,
            speaker: None,
            start: 0.0,
            end: 0.0,
        }
    }

    pub fn other(text: impl Into<String>) -> Self {
        Self {
            is_user: false,
            ..Self::user(text)
        }
    }
}
