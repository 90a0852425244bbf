//! Reassembly of decoder output into fixed-size playback frames.
//!
//! The decode transform emits PCM in whatever chunk sizes OS pipe buffering
//! produces. Playback wants exact [`FRAME_SIZE`] byte frames. This module
//! buffers the in-between.

use crate::defaults::{FRAME_SAMPLES, FRAME_SIZE};

/// One playback frame: exactly [`FRAME_SIZE`] bytes of 16-bit mono PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmFrame {
    bytes: Vec<u8>,
}

impl PcmFrame {
    /// Wraps a buffer as a frame. Returns `None` unless the buffer is exactly
    /// [`FRAME_SIZE`] bytes — partial frames never exist as values.
    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        if bytes.len() == FRAME_SIZE {
            Some(Self { bytes })
        } else {
            None
        }
    }

    /// A frame of silence.
    pub fn silence() -> Self {
        Self {
            bytes: vec![0u8; FRAME_SIZE],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decode the little-endian byte pairs into i16 samples.
    pub fn samples(&self) -> Vec<i16> {
        self.bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }
}

/// Accumulates arbitrarily sized PCM chunks and slices off whole frames.
///
/// Pure and synchronous; owned exclusively by the receive pipeline. The
/// internal buffer is always shorter than [`FRAME_SIZE`] after a `feed` call
/// returns.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    buffer: Vec<u8>,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every complete frame now available, in
    /// order. The remainder stays buffered for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<PcmFrame> {
        self.buffer.extend_from_slice(chunk);

        let whole = self.buffer.len() / FRAME_SIZE;
        let mut frames = Vec::with_capacity(whole);
        for _ in 0..whole {
            let rest = self.buffer.split_off(FRAME_SIZE);
            let bytes = std::mem::replace(&mut self.buffer, rest);
            frames.push(PcmFrame { bytes });
        }
        frames
    }

    /// Bytes currently buffered (always `< FRAME_SIZE` between calls).
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic non-repeating test bytes.
    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_pcm_frame_rejects_wrong_size() {
        assert!(PcmFrame::from_bytes(vec![0u8; FRAME_SIZE]).is_some());
        assert!(PcmFrame::from_bytes(vec![0u8; FRAME_SIZE - 1]).is_none());
        assert!(PcmFrame::from_bytes(vec![0u8; FRAME_SIZE + 1]).is_none());
        assert!(PcmFrame::from_bytes(vec![]).is_none());
    }

    #[test]
    fn test_pcm_frame_samples_little_endian() {
        let mut bytes = vec![0u8; FRAME_SIZE];
        bytes[0] = 0x01;
        bytes[1] = 0x02; // 0x0201 = 513
        let frame = PcmFrame::from_bytes(bytes).unwrap();
        let samples = frame.samples();
        assert_eq!(samples.len(), FRAME_SAMPLES);
        assert_eq!(samples[0], 513);
        assert_eq!(samples[1], 0);
    }

    #[test]
    fn test_silence_frame() {
        let frame = PcmFrame::silence();
        assert_eq!(frame.as_bytes().len(), FRAME_SIZE);
        assert!(frame.samples().iter().all(|&s| s == 0));
    }

    #[test]
    fn test_feed_smaller_than_frame_emits_nothing() {
        let mut r = FrameReassembler::new();
        let frames = r.feed(&pattern(FRAME_SIZE - 1));
        assert!(frames.is_empty());
        assert_eq!(r.pending(), FRAME_SIZE - 1);
    }

    #[test]
    fn test_feed_exact_frame() {
        let mut r = FrameReassembler::new();
        let data = pattern(FRAME_SIZE);
        let frames = r.feed(&data);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), &data[..]);
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn test_feed_frame_plus_tail() {
        let tail = 7;
        let mut r = FrameReassembler::new();
        let data = pattern(FRAME_SIZE + tail);
        let frames = r.feed(&data);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), &data[..FRAME_SIZE]);
        assert_eq!(r.pending(), tail);
    }

    #[test]
    fn test_feed_multiple_frames_in_one_chunk() {
        let mut r = FrameReassembler::new();
        let data = pattern(3 * FRAME_SIZE);
        let frames = r.feed(&data);
        assert_eq!(frames.len(), 3);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(
                frame.as_bytes(),
                &data[i * FRAME_SIZE..(i + 1) * FRAME_SIZE],
                "frame {} differs",
                i
            );
        }
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn test_reassembly_complete_regardless_of_split() {
        // k * FRAME_SIZE total bytes split unevenly must yield exactly k
        // frames equal to consecutive slices of the concatenation.
        let k = 4;
        let data = pattern(k * FRAME_SIZE);
        let splits = [1, 17, FRAME_SIZE - 1, FRAME_SIZE, FRAME_SIZE + 13, 4096];

        for &split in &splits {
            let mut r = FrameReassembler::new();
            let mut frames = Vec::new();
            for chunk in data.chunks(split) {
                frames.extend(r.feed(chunk));
            }
            assert_eq!(frames.len(), k, "split {} produced wrong count", split);
            for (i, frame) in frames.iter().enumerate() {
                assert_eq!(
                    frame.as_bytes(),
                    &data[i * FRAME_SIZE..(i + 1) * FRAME_SIZE],
                    "split {} frame {} differs",
                    split,
                    i
                );
            }
            assert_eq!(r.pending(), 0, "split {} left bytes buffered", split);
        }
    }

    #[test]
    fn test_pending_always_below_frame_size() {
        let mut r = FrameReassembler::new();
        // Feed awkward chunk sizes and check the invariant after each call
        for len in [100, 3000, FRAME_SIZE, 1, FRAME_SIZE * 2 + 5, 999] {
            r.feed(&pattern(len));
            assert!(r.pending() < FRAME_SIZE, "pending {} after feeding {}", r.pending(), len);
        }
    }

    #[test]
    fn test_empty_feed_is_noop() {
        let mut r = FrameReassembler::new();
        r.feed(&pattern(10));
        let frames = r.feed(&[]);
        assert!(frames.is_empty());
        assert_eq!(r.pending(), 10);
    }
}
