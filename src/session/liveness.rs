//! Connection liveness tracking.
//!
//! The server streams continuously while a session is healthy, so inbound
//! silence is the one reliable sign of a dead connection. Every successfully
//! decoded message touches the tracker; a watchdog in the session polls it
//! and forces teardown past the stale threshold.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Shared record of when the last inbound message was decoded.
///
/// Cloneable handle; all clones observe the same instant. Cleared when the
/// session leaves `Open` so a late watchdog tick can never see stale data
/// from a finished session.
#[derive(Debug, Clone, Default)]
pub struct LivenessTracker {
    last_message: Arc<Mutex<Option<Instant>>>,
}

impl LivenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an inbound message at the current instant.
    pub fn touch(&self) {
        if let Ok(mut guard) = self.last_message.lock() {
            *guard = Some(Instant::now());
        }
    }

    /// Forgets the last message instant.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.last_message.lock() {
            *guard = None;
        }
    }

    /// Time since the last recorded message, if any.
    pub fn elapsed(&self) -> Option<Duration> {
        self.last_message
            .lock()
            .ok()
            .and_then(|guard| guard.map(|instant| instant.elapsed()))
    }

    /// Returns the elapsed silence if it exceeds `threshold`.
    ///
    /// Never stale before the first message: the open handshake is itself a
    /// message, so a session that reached `Open` has always been touched.
    pub fn staleness(&self, threshold: Duration) -> Option<Duration> {
        self.elapsed().filter(|elapsed| *elapsed > threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untouched_tracker_is_never_stale() {
        let tracker = LivenessTracker::new();
        assert!(tracker.elapsed().is_none());
        assert!(tracker.staleness(Duration::ZERO).is_none());
    }

    #[test]
    fn test_touch_resets_elapsed() {
        let tracker = LivenessTracker::new();
        tracker.touch();
        let elapsed = tracker.elapsed().expect("touched");
        assert!(elapsed < Duration::from_secs(1));
    }

    #[test]
    fn test_fresh_touch_is_not_stale() {
        let tracker = LivenessTracker::new();
        tracker.touch();
        assert!(tracker.staleness(Duration::from_secs(10)).is_none());
    }

    #[test]
    fn test_stale_after_threshold() {
        let tracker = LivenessTracker::new();
        tracker.touch();
        std::thread::sleep(Duration::from_millis(20));
        let staleness = tracker.staleness(Duration::from_millis(5));
        assert!(staleness.is_some());
        assert!(staleness.unwrap() >= Duration::from_millis(5));
    }

    #[test]
    fn test_clear_forgets_instant() {
        let tracker = LivenessTracker::new();
        tracker.touch();
        tracker.clear();
        assert!(tracker.elapsed().is_none());
        assert!(tracker.staleness(Duration::ZERO).is_none());
    }

    #[test]
    fn test_clones_share_state() {
        let tracker = LivenessTracker::new();
        let clone = tracker.clone();
        clone.touch();
        assert!(tracker.elapsed().is_some());
        tracker.clear();
        assert!(clone.elapsed().is_none());
    }
}
