//! FIFO buffer between the decode pipeline and the output device.
//!
//! Arrival is bursty (network + decoder pacing), consumption is metronomic
//! (the audio callback). The queue absorbs the difference. Depth is bounded:
//! when the consumer falls behind by more than the capacity, the oldest
//! frames are dropped so playback stays near-live instead of drifting.

use crate::defaults::PLAYBACK_QUEUE_CAPACITY;
use crate::session::reassembly::PcmFrame;
use std::collections::VecDeque;

/// Bounded FIFO of ready-to-play frames.
///
/// Not internally synchronized; the session shares it behind a mutex because
/// the audio device callback runs on its own OS thread.
#[derive(Debug)]
pub struct PlaybackQueue {
    frames: VecDeque<PcmFrame>,
    capacity: usize,
    dropped: u64,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::with_capacity(PLAYBACK_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Appends a frame, evicting from the front if the queue is full.
    pub fn enqueue(&mut self, frame: PcmFrame) {
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
            self.dropped += 1;
            if self.dropped.is_power_of_two() {
                tracing::warn!(dropped = self.dropped, "playback queue full, dropping oldest frame");
            }
        }
        self.frames.push_back(frame);
    }

    /// Removes and returns the oldest frame.
    pub fn dequeue(&mut self) -> Option<PcmFrame> {
        self.frames.pop_front()
    }

    /// Dequeues every frame in order and hands each to `consume`.
    pub fn drain(&mut self, mut consume: impl FnMut(PcmFrame)) {
        while let Some(frame) = self.frames.pop_front() {
            consume(frame);
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total frames evicted because the consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for PlaybackQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::FRAME_SIZE;

    fn frame(fill: u8) -> PcmFrame {
        PcmFrame::from_bytes(vec![fill; FRAME_SIZE]).expect("frame-sized buffer")
    }

    #[test]
    fn test_fifo_order_preserved() {
        let mut q = PlaybackQueue::new();
        q.enqueue(frame(1));
        q.enqueue(frame(2));
        q.enqueue(frame(3));

        let mut out = Vec::new();
        q.drain(|f| out.push(f.as_bytes()[0]));

        assert_eq!(out, vec![1, 2, 3]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_dequeue_returns_oldest() {
        let mut q = PlaybackQueue::new();
        q.enqueue(frame(7));
        q.enqueue(frame(8));
        assert_eq!(q.dequeue().unwrap().as_bytes()[0], 7);
        assert_eq!(q.dequeue().unwrap().as_bytes()[0], 8);
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn test_no_frame_dequeued_twice() {
        let mut q = PlaybackQueue::new();
        for i in 0..10u8 {
            q.enqueue(frame(i));
        }
        let mut seen = Vec::new();
        while let Some(f) = q.dequeue() {
            seen.push(f.as_bytes()[0]);
        }
        assert_eq!(seen, (0..10u8).collect::<Vec<_>>());
        assert!(q.is_empty());
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut q = PlaybackQueue::with_capacity(3);
        for i in 0..5u8 {
            q.enqueue(frame(i));
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.dropped(), 2);

        let mut out = Vec::new();
        q.drain(|f| out.push(f.as_bytes()[0]));
        // Frames 0 and 1 were evicted; the newest three survive in order
        assert_eq!(out, vec![2, 3, 4]);
    }

    #[test]
    fn test_drain_on_empty_queue() {
        let mut q = PlaybackQueue::new();
        let mut called = false;
        q.drain(|_| called = true);
        assert!(!called);
    }

    #[test]
    fn test_len_tracks_enqueue_dequeue() {
        let mut q = PlaybackQueue::new();
        assert_eq!(q.len(), 0);
        q.enqueue(frame(0));
        q.enqueue(frame(1));
        assert_eq!(q.len(), 2);
        q.dequeue();
        assert_eq!(q.len(), 1);
    }
}
