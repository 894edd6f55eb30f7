//! mouthpiece - streaming speech-to-lipsync for talking avatars
//!
//! Recorded speech goes in over a WebSocket; synthesized reply audio comes
//! back sentence by sentence, each with timed mouth-shape cues.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod backend;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
#[cfg(feature = "cli")]
pub mod diagnostics;
pub mod error;
pub mod pipeline;
pub mod playback;
pub mod protocol;
pub mod server;
pub mod session;
pub mod viseme;

// Capabilities (backend → convert → extract)
pub use audio::{AudioConverter, PhonemeExtractor};
pub use backend::Backend;

// Pipeline
pub use pipeline::orchestrator::{Orchestrator, PipelineConfig, TurnEvents};
pub use pipeline::segmenter::split_into_sentences;
pub use pipeline::types::{Message, Segment, ShapeWeights, TurnOutcome, VisemeCue};
pub use viseme::interpolate;

// Error handling
pub use error::{MouthpieceError, Result};

// Config
pub use config::{Config, Provider};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
