//! Error types for voicegate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoicegateError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Device errors are retried a bounded number of times, then fatal
    #[error("Audio device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("Audio device failure: {message}")]
    Device { message: String },

    // Recognition-engine output malformed: logged, frame skipped
    #[error("Recognizer output malformed: {message}")]
    Decode { message: String },

    // User-supplied callback failed: caught at the call site, logged
    #[error("Command handler failed: {message}")]
    Handler { message: String },

    // Artifact persistence/delivery errors
    #[error("Recording artifact error: {message}")]
    Artifact { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoicegateError>;
