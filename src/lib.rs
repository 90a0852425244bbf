//! voxlink - Live voice chat from the terminal
//!
//! Full-duplex streaming client: microphone audio goes up as compressed
//! Opus, model speech and text come back down and play as they arrive.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod app;
pub mod archive;
pub mod audio;
pub mod cli;
pub mod config;
pub mod defaults;
pub mod endpoint;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transform;
pub mod transport;

// Core seams (capture → encode → wire → decode → playback)
pub use audio::sink::AudioSink;
pub use audio::source::AudioSource;
pub use session::text::TextSink;
pub use transform::AudioTransform;
pub use transport::Transport;

// Session engine
pub use session::{Session, SessionConfig, SessionHandle, SessionParts, SessionState};

// Error handling
pub use error::{Result, VoxlinkError};

// Config
pub use config::Config;
pub use endpoint::{Endpoint, GenerationParams};

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
