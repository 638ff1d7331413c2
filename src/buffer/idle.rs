//! Idle gap bookkeeping for idle timeouts

use std::time::{Duration, Instant};

/// Tracks the gaps between reads within one call.
///
/// The idle timer starts at the first read, not at the start of the call, so
/// a silent process is governed by the absolute timeout only. Between calls
/// the gap history collapses to its maximum, which is kept as a baseline for
/// the next call.
#[derive(Debug, Clone)]
pub struct IdleTracker {
    last_read: Option<Instant>,
    gaps: Vec<Duration>,
    max_idle_gap: Duration,
}

impl Default for IdleTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl IdleTracker {
    pub fn new() -> Self {
        Self {
            last_read: None,
            gaps: vec![Duration::ZERO],
            max_idle_gap: Duration::ZERO,
        }
    }

    /// Forget the timer of the previous call; the gap history stays.
    pub fn start_call(&mut self) {
        self.last_read = None;
    }

    /// Start the timer without recording a gap (output seen before the wait).
    pub fn touch(&mut self, now: Instant) {
        self.last_read = Some(now);
    }

    /// Record a read at `now`.
    pub fn record(&mut self, now: Instant) {
        if let Some(previous) = self.last_read {
            self.gaps.push(now.saturating_duration_since(previous));
        }
        self.last_read = Some(now);
    }

    /// Time since the last read, if the timer has started.
    pub fn idle_for(&self, now: Instant) -> Option<Duration> {
        self.last_read
            .map(|last| now.saturating_duration_since(last))
    }

    /// Largest gap recorded during the current call.
    pub fn current_max_gap(&self) -> Duration {
        self.gaps.iter().skip(1).copied().max().unwrap_or(Duration::ZERO)
    }

    /// Collapse the history to its maximum at the end of a call.
    pub fn finish_call(&mut self) {
        self.max_idle_gap = self.gaps.iter().copied().max().unwrap_or(Duration::ZERO);
        self.gaps = vec![self.max_idle_gap];
    }

    /// Largest gap between reads seen so far.
    pub fn max_idle_gap(&self) -> Duration {
        self.max_idle_gap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_starts_at_first_read() {
        let mut tracker = IdleTracker::new();
        let now = Instant::now();
        assert_eq!(tracker.idle_for(now), None);

        tracker.record(now);
        assert_eq!(tracker.idle_for(now + Duration::from_millis(30)), Some(Duration::from_millis(30)));
    }

    #[test]
    fn test_gaps_collapse_to_max() {
        let mut tracker = IdleTracker::new();
        let t0 = Instant::now();
        tracker.record(t0);
        tracker.record(t0 + Duration::from_millis(100));
        tracker.record(t0 + Duration::from_millis(150));
        assert_eq!(tracker.current_max_gap(), Duration::from_millis(100));

        tracker.finish_call();
        assert_eq!(tracker.max_idle_gap(), Duration::from_millis(100));

        // The next call starts a fresh timer but keeps the baseline.
        tracker.start_call();
        assert_eq!(tracker.idle_for(t0 + Duration::from_secs(1)), None);
        tracker.record(t0 + Duration::from_secs(1));
        tracker.record(t0 + Duration::from_millis(1020));
        tracker.finish_call();
        assert_eq!(tracker.max_idle_gap(), Duration::from_millis(100));
    }

    #[test]
    fn test_touch_does_not_record_gap() {
        let mut tracker = IdleTracker::new();
        let t0 = Instant::now();
        tracker.touch(t0);
        tracker.touch(t0 + Duration::from_secs(5));
        tracker.finish_call();
        assert_eq!(tracker.max_idle_gap(), Duration::ZERO);
    }
}
