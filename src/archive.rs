//! Optional WAV archive of the received audio.
//!
//! Accumulates every byte of decoded PCM (whole frames and the final partial
//! tail alike) and writes a single WAV file when the session ends.

use crate::defaults::{CHANNELS, SAMPLE_RATE};
use crate::error::{Result, VoxlinkError};
use std::path::{Path, PathBuf};

/// In-memory PCM accumulator flushed to disk at teardown.
#[derive(Debug)]
pub struct PcmArchive {
    path: PathBuf,
    pcm: Vec<u8>,
}

impl PcmArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pcm: Vec::new(),
        }
    }

    /// Appends raw little-endian 16-bit PCM bytes.
    pub fn append(&mut self, bytes: &[u8]) {
        self.pcm.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.pcm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the accumulated audio as a 24kHz mono 16-bit WAV file.
    ///
    /// A trailing odd byte (half a sample) is discarded.
    pub fn finish(self) -> Result<()> {
        let spec = hound::WavSpec {
            channels: CHANNELS,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer =
            hound::WavWriter::create(&self.path, spec).map_err(|e| VoxlinkError::Other(format!(
                "failed to create {}: {}",
                self.path.display(),
                e
            )))?;

        for pair in self.pcm.chunks_exact(2) {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            writer
                .write_sample(sample)
                .map_err(|e| VoxlinkError::Other(format!("failed to write sample: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| VoxlinkError::Other(format!("failed to finalize WAV: {}", e)))?;
        Ok(())
    }
}
