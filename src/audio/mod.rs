//! Audio device I/O: microphone capture and speaker playback.

pub mod sink;
pub mod source;
