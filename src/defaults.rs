//! Default configuration constants for voxlink.
//!
//! This module provides shared constants used across the session engine and
//! configuration types to ensure consistency and eliminate duplication.

use std::time::Duration;

/// Audio sample rate in Hz.
///
/// 24kHz mono is the fixed format of the deployment's Opus streams; the
/// capture and playback devices both run at this rate so no resampling is
/// needed anywhere in the pipeline.
pub const SAMPLE_RATE: u32 = 24_000;

/// Number of audio channels. Mono only.
pub const CHANNELS: u16 = 1;

/// Number of 16-bit samples in one playback frame.
///
/// 1920 samples at 24kHz is 80ms, a multiple of every valid Opus frame
/// duration, so decoder output always packs cleanly into playback frames.
pub const FRAME_SAMPLES: usize = 1920;

/// Size of one playback frame in bytes (16-bit interleaved PCM).
pub const FRAME_SIZE: usize = FRAME_SAMPLES * 2;

/// Interval between microphone buffer polls.
pub const CAPTURE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Interval between liveness watchdog checks.
pub const WATCHDOG_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Inbound silence longer than this is treated as a dead connection.
pub const STALE_THRESHOLD: Duration = Duration::from_millis(10_000);

/// Maximum number of frames held in the playback queue (~5s of audio).
///
/// When the output device falls behind, the oldest frames are dropped so
/// playback stays close to live rather than drifting further into the past.
pub const PLAYBACK_QUEUE_CAPACITY: usize = 64;

/// Capacity of the bounded outbound message channel (encoder → transport).
pub const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// Default deployment region.
pub const DEFAULT_REGION: &str = "fr-par";

/// Default top-k for audio token sampling.
pub const AUDIO_TOPK: u32 = 250;

/// Default temperature for audio token sampling.
pub const AUDIO_TEMPERATURE: f32 = 0.8;

/// Default top-k for text token sampling.
pub const TEXT_TOPK: u32 = 25;

/// Default temperature for text token sampling.
pub const TEXT_TEMPERATURE: f32 = 0.7;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_is_whole_samples() {
        assert_eq!(FRAME_SIZE % 2, 0);
        assert_eq!(FRAME_SIZE / 2, FRAME_SAMPLES);
    }

    #[test]
    fn frame_duration_is_80ms() {
        let ms = FRAME_SAMPLES as u32 * 1000 / SAMPLE_RATE;
        assert_eq!(ms, 80);
    }

    #[test]
    fn stale_threshold_spans_many_poll_intervals() {
        assert!(STALE_THRESHOLD > WATCHDOG_POLL_INTERVAL * 10);
    }
}
