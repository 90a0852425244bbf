//! Error types for voxlink.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxlinkError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Connection-open failures. Credential rejection and unresolvable
    // endpoints are reported distinctly and never retried.
    #[error("Access key rejected by the deployment (HTTP {status})")]
    CredentialRejected { status: u16 },

    #[error("Could not resolve deployment endpoint {host}")]
    EndpointUnresolvable { host: String },

    #[error("Failed to open connection: {message}")]
    TransportOpen { message: String },

    // Any transport failure after the connection is up. Fatal for the session.
    #[error("Connection error: {message}")]
    TransportRuntime { message: String },

    // A single undecodable wire message. Dropped, never fatal on its own.
    #[error("Malformed wire message: {message}")]
    MalformedMessage { message: String },

    #[error("No message received for {elapsed_ms}ms, connection is stale")]
    StaleConnection { elapsed_ms: u64 },

    // Audio device errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    #[error("Audio playback failed: {message}")]
    AudioPlayback { message: String },

    // External codec transform errors
    #[error("Audio transform failed: {message}")]
    Transform { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl VoxlinkError {
    /// True for conditions that must end the session: open and runtime
    /// transport failures, stale connections. Malformed individual messages
    /// are dropped without teardown.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, VoxlinkError::MalformedMessage { .. })
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxlinkError>;
