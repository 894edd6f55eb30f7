//! Data types shared by the speech-to-lipsync pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Blendshape name → weight in `[0, 1]`.
///
/// Recomputed for every animation frame; never stored.
pub type ShapeWeights = BTreeMap<String, f64>;

/// Speaker of a history message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A timed mouth shape.
///
/// Cues for one sentence are ordered by non-decreasing `time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisemeCue {
    /// Start of the cue, in seconds from segment playback start.
    pub time: f64,
    /// Symbolic shape id (Rhubarb letter `A`..`H`, `X` for rest).
    pub shape: String,
    /// Intensity in `[0, 1]`.
    pub weight: f64,
    /// Length of the cue, in seconds.
    pub duration: f64,
}

impl VisemeCue {
    /// End of the cue, in seconds.
    pub fn end(&self) -> f64 {
        self.time + self.duration
    }

    /// Whether `elapsed` falls inside `[time, time + duration)`.
    pub fn contains(&self, elapsed: f64) -> bool {
        elapsed >= self.time && elapsed < self.end()
    }
}

/// One sentence worth of synthesized speech, the unit of streamed delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Position of the sentence in the turn, assigned at dispatch.
    pub index: usize,
    /// Sentence text the audio was synthesized from.
    pub text: String,
    /// Synthesized audio as returned by the backend.
    pub audio: Vec<u8>,
    /// Mouth cues extracted from the audio.
    pub visemes: Vec<VisemeCue>,
    /// True only for the last segment of a turn.
    pub is_final: bool,
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// No speech was detected in the input.
    Empty,
    /// A response was generated; the texts are kept for history.
    Completed {
        user_text: String,
        assistant_text: String,
    },
    /// A fatal error ended the turn before generation started.
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cue(time: f64, duration: f64) -> VisemeCue {
        VisemeCue {
            time,
            shape: "B".to_string(),
            weight: 1.0,
            duration,
        }
    }

    #[test]
    fn test_cue_interval_is_half_open() {
        let c = cue(0.5, 0.25);
        assert!(!c.contains(0.49));
        assert!(c.contains(0.5));
        assert!(c.contains(0.74));
        assert!(!c.contains(0.75));
    }

    #[test]
    fn test_cue_uses_wire_field_names() {
        let json = serde_json::to_value(cue(0.0, 0.5)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"time": 0.0, "shape": "B", "weight": 1.0, "duration": 0.5})
        );
    }

    #[test]
    fn test_message_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
