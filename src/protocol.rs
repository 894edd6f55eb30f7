//! JSON wire protocol spoken over the WebSocket.
//!
//! Binary frames carry audio in both directions: recorded speech from the
//! client, synthesized speech from the server. Every `assistant.audio`
//! message is followed by exactly one binary frame holding that segment's
//! audio.

use crate::error::MouthpieceError;
use crate::pipeline::types::{Segment, VisemeCue};
use serde::{Deserialize, Serialize};

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Speech was recognized; segments follow
    #[serde(rename = "assistant.start")]
    AssistantStart,
    /// Visemes for the binary audio frame that comes next
    #[serde(rename = "assistant.audio", rename_all = "camelCase")]
    AssistantAudio {
        visemes: Vec<VisemeCue>,
        sentence_index: usize,
        is_final: bool,
    },
    /// The turn finished
    #[serde(rename = "assistant.done")]
    AssistantDone,
    /// No speech in the recording
    #[serde(rename = "assistant.empty")]
    AssistantEmpty,
    /// Something failed
    #[serde(rename = "error")]
    Error { message: String, recoverable: bool },
}

impl ServerMessage {
    /// Header message for a segment. Its audio is sent separately.
    pub fn audio(segment: &Segment) -> Self {
        Self::AssistantAudio {
            visemes: segment.visemes.clone(),
            sentence_index: segment.index,
            is_final: segment.is_final,
        }
    }

    pub fn error(error: &MouthpieceError) -> Self {
        Self::Error {
            message: error.to_string(),
            recoverable: error.is_recoverable(),
        }
    }

    /// Serialize message to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize message from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Text messages a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Forget the conversation so far
    #[serde(rename = "session.reset")]
    Reset,
}

impl ClientMessage {
    /// Serialize message to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize message from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Decode a text frame, discarding anything malformed or unknown.
    pub fn decode(text: &str) -> Option<Self> {
        Self::from_json(text).ok()
    }
}
