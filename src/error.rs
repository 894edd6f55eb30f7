//! Error types for mouthpiece.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MouthpieceError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio pipeline errors
    #[error("Audio conversion failed: {message}")]
    AudioConversion { message: String },

    #[error("Phoneme extraction failed: {message}")]
    PhonemeExtraction { message: String },

    // Backend errors
    #[error("Transcription failed: {message}")]
    Transcription { message: String },

    #[error("Chat generation failed: {message}")]
    Chat { message: String },

    #[error("Speech synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("{provider} request to {endpoint} failed with status {status}")]
    ProviderStatus {
        provider: String,
        endpoint: String,
        status: u16,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Wire protocol errors
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl MouthpieceError {
    /// Whether the client may keep using the connection after this error.
    ///
    /// No error is currently fatal to a connection.
    pub fn is_recoverable(&self) -> bool {
        true
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, MouthpieceError>;
