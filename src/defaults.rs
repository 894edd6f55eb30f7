//! Default configuration constants for mouthpiece.
//!
//! Shared by the config layer, the pipeline and the wire protocol so that
//! the limits every component agrees on live in one place.

/// Canonical sample rate, in Hz, of audio handed to transcription and
/// phoneme extraction.
pub const SAMPLE_RATE: u32 = 16000;

/// Canonical channel count (mono).
pub const CHANNELS: u16 = 1;

/// Canonical bit depth (signed 16-bit little endian PCM).
pub const BITS_PER_SAMPLE: u16 = 16;

/// Maximum number of segments delivered for a single turn.
pub const MAX_SENTENCES_PER_TURN: usize = 20;

/// Maximum number of history messages kept per connection (20 turn pairs).
pub const MAX_HISTORY_MESSAGES: usize = 40;

/// Length of the crossfade window at the end of a viseme cue, in seconds.
pub const LERP_DURATION_SECS: f64 = 0.08;

/// Default bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default bind port.
pub const DEFAULT_PORT: u16 = 3100;

/// Default chat model for the OpenAI provider.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default synthesis voice for the OpenAI provider.
pub const DEFAULT_VOICE: &str = "nova";

/// Default OpenAI-compatible API base URL.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default system prompt prepended to every chat request.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Keep responses concise (1-3 sentences).";

/// Default base URL of a Seline agent service.
pub const DEFAULT_SELINE_URL: &str = "http://localhost:3000";

/// Default ffmpeg executable.
pub const DEFAULT_FFMPEG: &str = "ffmpeg";

/// Default rhubarb-lip-sync executable.
pub const DEFAULT_RHUBARB: &str = "rhubarb";

/// Upper bound on a single phoneme extraction run, in seconds.
pub const PHONEME_TIMEOUT_SECS: u64 = 30;
