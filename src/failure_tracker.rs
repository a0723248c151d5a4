//! Failure tracker — `spec.md` §4.7 (C7).
//!
//! Process-wide per agent, but owned and mutated only by the supervisor
//! (`spec.md` §5: "mutated only by the supervisor (serial)"). Passed
//! explicitly rather than reached for as global state, per design note §9
//! ("Global mutable state... prefer passing it explicitly from the
//! supervisor").
//!
//! Design note §9 open questions, resolved: no secondary/failover variant
//! is implemented (#1), and the exponential backoff form supersedes the
//! historical linear one (#2) — `backoff_duration` only ever computes
//! `min(30_000, 1_000 * 2^(n-1))`.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);
const MAX_BACKOFF_MS: u64 = 30_000;
const SERVER_CLOSURE_CEILING: usize = 4;

/// OS-level error substrings classified as network errors
/// (`spec.md` §4.7).
const NETWORK_ERROR_MARKERS: &[&str] = &[
    "EHOSTUNREACH",
    "ENETUNREACH",
    "ECONNREFUSED",
    "ETIMEDOUT",
    "ENOTFOUND",
    "EAI_AGAIN",
];

/// Sliding-60s-window failure counters (`spec.md` §3 "Failure-tracker state").
#[derive(Debug, Default)]
pub struct FailureTracker {
    server_closures: VecDeque<Instant>,
    network_errors: VecDeque<Instant>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_server_closure(&mut self) {
        let now = Instant::now();
        self.server_closures.push_back(now);
        evict_stale(&mut self.server_closures, now);
    }

    pub fn record_network_error(&mut self) {
        let now = Instant::now();
        self.network_errors.push_back(now);
        evict_stale(&mut self.network_errors, now);
    }

    /// Classify an error message by OS-level code/text
    /// (`spec.md` §4.7 `network_error?`).
    pub fn is_network_error(err: &str) -> bool {
        NETWORK_ERROR_MARKERS.iter().any(|marker| err.contains(marker))
    }

    /// `min(30_000, 1_000 * 2^(N-1))` where N is the total failure count
    /// over the 60s window; `1_000` when N = 0.
    pub fn backoff_duration(&mut self) -> Duration {
        let now = Instant::now();
        evict_stale(&mut self.server_closures, now);
        evict_stale(&mut self.network_errors, now);
        let n = (self.server_closures.len() + self.network_errors.len()) as u32;

        let ms = if n == 0 {
            1_000
        } else {
            1_000u64.saturating_mul(1u64 << (n - 1).min(63))
        };
        Duration::from_millis(ms.min(MAX_BACKOFF_MS))
    }

    /// True when server-closure count >= 4 within the window. Informational
    /// only in agent mode (`spec.md` §4.9) — surfaced for operators, but
    /// the supervisor does not stop on it.
    pub fn should_stop_reconnecting(&mut self) -> bool {
        let now = Instant::now();
        evict_stale(&mut self.server_closures, now);
        self.server_closures.len() >= SERVER_CLOSURE_CEILING
    }

    /// Called on successful session establishment (`spec.md` §4.7 `reset()`).
    pub fn reset(&mut self) {
        self.server_closures.clear();
        self.network_errors.clear();
    }
}

fn evict_stale(deque: &mut VecDeque<Instant>, now: Instant) {
    while let Some(&front) = deque.front() {
        if now.duration_since(front) > WINDOW {
            deque.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_failures_backoff_is_one_second() {
        let mut tracker = FailureTracker::new();
        assert_eq!(tracker.backoff_duration(), Duration::from_millis(1_000));
    }

    #[test]
    fn backoff_doubles_per_failure_and_caps_at_30s() {
        // Matches the supervisor's record-then-backoff order
        // (`spec.md` §4.9): the Nth closure's backoff is read right after
        // it is recorded.
        let mut tracker = FailureTracker::new();
        let expected_ms = [1_000u64, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000, 30_000];
        for expected in expected_ms {
            tracker.record_server_closure();
            assert_eq!(tracker.backoff_duration(), Duration::from_millis(expected));
        }
    }

    #[test]
    fn backoff_never_exceeds_30_seconds_for_many_failures() {
        let mut tracker = FailureTracker::new();
        for _ in 0..50 {
            tracker.record_network_error();
        }
        assert_eq!(tracker.backoff_duration(), Duration::from_millis(MAX_BACKOFF_MS));
    }

    #[test]
    fn should_stop_reconnecting_at_ceiling() {
        let mut tracker = FailureTracker::new();
        for _ in 0..3 {
            tracker.record_server_closure();
        }
        assert!(!tracker.should_stop_reconnecting());
        tracker.record_server_closure();
        assert!(tracker.should_stop_reconnecting());
    }

    #[test]
    fn reset_clears_both_deques() {
        let mut tracker = FailureTracker::new();
        tracker.record_server_closure();
        tracker.record_network_error();
        tracker.reset();
        assert_eq!(tracker.backoff_duration(), Duration::from_millis(1_000));
        assert!(!tracker.should_stop_reconnecting());
    }

    #[test]
    fn classifies_known_os_error_codes() {
        assert!(FailureTracker::is_network_error("connect failed: ECONNREFUSED"));
        assert!(FailureTracker::is_network_error("lookup failed: ENOTFOUND"));
        assert!(!FailureTracker::is_network_error("Invalid Token"));
    }

    #[test]
    fn server_closure_storm_matches_scenario_3() {
        // spec.md §8 scenario 3: backoff sequence at the 1st..5th closure is
        // {1s, 2s, 4s, 8s, 16s}; on the 6th success the tracker resets.
        let mut tracker = FailureTracker::new();
        let expected = [1_000u64, 2_000, 4_000, 8_000, 16_000];
        for expected_ms in expected {
            tracker.record_server_closure();
            assert_eq!(tracker.backoff_duration(), Duration::from_millis(expected_ms));
        }
        tracker.reset();
        assert_eq!(tracker.backoff_duration(), Duration::from_millis(1_000));
        assert!(!tracker.should_stop_reconnecting());
    }
}
