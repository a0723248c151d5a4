//! Supervisor — `spec.md` §4.9 (C9).
//!
//! The infinite reconnect loop. Owns the process-wide [`FailureTracker`]
//! and the long-lived [`RelayHealth`] state (it must outlive any single
//! attempt, since C5's wait-for-recovery is a cross-reconnect notion).
//! Runs `session::run` to completion and dispatches on the resulting
//! [`TunnelErrorKind`] exactly per the table in `spec.md` §4.9.
//!
//! Grounded on the teacher's `relay/mod.rs` reconnect loop (`loop { connect;
//! match result { ... } }` shape) and `circuit_breaker.rs`'s pattern of a
//! small owned-state struct driving backoff decisions.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::TunnelErrorKind;
use crate::failure_tracker::FailureTracker;
use crate::relay_health::RelayHealth;
use crate::session;

/// What the process should do once the supervisor loop stops running.
/// `spec.md` §6.2: "Exit codes: 0 never... 1 on AuthError". The loop
/// itself is `loop {}` for every other outcome, so this only ever
/// surfaces the fatal case.
pub enum Outcome {
    /// `AuthError` — fatal, process should exit 1.
    Fatal(String),
}

/// Run the supervisor loop forever, or until a fatal (`AuthError`)
/// outcome is reached.
pub async fn run(config: SessionConfig) -> Outcome {
    let mut tracker = FailureTracker::new();
    let relay_health = RelayHealth::new();

    loop {
        let error = session::run(&config, relay_health.clone()).await;
        match dispatch(&mut tracker, &relay_health, error).await {
            ControlFlow::Continue => continue,
            ControlFlow::Fatal(outcome) => return outcome,
        }
    }
}

enum ControlFlow {
    Continue,
    Fatal(Outcome),
}

/// One iteration of the supervisor's error-classification table
/// (`spec.md` §4.9). Split out from [`run`] so it can be exercised
/// directly in tests without a real network round trip.
async fn dispatch(tracker: &mut FailureTracker, relay_health: &Arc<RelayHealth>, error: TunnelErrorKind) -> ControlFlow {
    match error {
        TunnelErrorKind::AuthError(reason) => {
            error!("supervisor: authentication rejected — terminating: {reason}");
            ControlFlow::Fatal(Outcome::Fatal(reason))
        }
        TunnelErrorKind::HealthMonitorTriggered => {
            info!("supervisor: waiting for relay recovery before reconnecting");
            relay_health.wait_for_recovery().await;
            ControlFlow::Continue
        }
        TunnelErrorKind::EstablishTimeout => {
            warn!("supervisor: establishment timed out — retrying without backoff");
            ControlFlow::Continue
        }
        TunnelErrorKind::TunnelHealthTriggered => {
            info!("supervisor: tunnel health triggered reconnect — resetting failure tracker");
            tracker.reset();
            ControlFlow::Continue
        }
        TunnelErrorKind::Closed { by_server: true } => {
            tracker.record_server_closure();
            sleep_backoff(tracker).await;
            ControlFlow::Continue
        }
        other => {
            // `spec.md` §4.9: a recognized OS-level network error and the
            // catch-all `else` arm both record a network error and back off
            // identically — only their log line differs.
            if !FailureTracker::is_network_error(&other.to_string()) {
                debug!(%other, "supervisor: unclassified failure, treating as network error");
            }
            tracker.record_network_error();
            sleep_backoff(tracker).await;
            ControlFlow::Continue
        }
    }
}

async fn sleep_backoff(tracker: &mut FailureTracker) {
    let backoff = tracker.backoff_duration();
    warn!(backoff_ms = backoff.as_millis() as u64, "supervisor: reconnecting after backoff");
    tokio::time::sleep(backoff).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn auth_error_is_fatal() {
        let mut tracker = FailureTracker::new();
        let relay_health = RelayHealth::new();
        let flow = dispatch(&mut tracker, &relay_health, TunnelErrorKind::AuthError("bad token".into())).await;
        assert!(matches!(flow, ControlFlow::Fatal(Outcome::Fatal(_))));
    }

    #[tokio::test]
    async fn establish_timeout_continues_without_recording_failure() {
        let mut tracker = FailureTracker::new();
        let relay_health = RelayHealth::new();
        let flow = dispatch(&mut tracker, &relay_health, TunnelErrorKind::EstablishTimeout).await;
        assert!(matches!(flow, ControlFlow::Continue));
        assert_eq!(tracker.backoff_duration(), std::time::Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn tunnel_health_triggered_resets_tracker() {
        let mut tracker = FailureTracker::new();
        tracker.record_server_closure();
        tracker.record_server_closure();
        let relay_health = RelayHealth::new();
        let flow = dispatch(&mut tracker, &relay_health, TunnelErrorKind::TunnelHealthTriggered).await;
        assert!(matches!(flow, ControlFlow::Continue));
        assert_eq!(tracker.backoff_duration(), std::time::Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn server_closure_storm_matches_scenario_3() {
        // spec.md §8 scenario 3: five server closures in 45s back off
        // {1s, 2s, 4s, 8s, 16s}; a sixth attempt that succeeds resets.
        // Backoff is actually slept inside `dispatch`, so time is paused
        // and auto-advanced rather than waited out in real wall time.
        let mut tracker = FailureTracker::new();
        let relay_health = RelayHealth::new();
        let expected = [1_000u64, 2_000, 4_000, 8_000, 16_000];
        for expected_ms in expected {
            dispatch(&mut tracker, &relay_health, TunnelErrorKind::Closed { by_server: true }).await;
            assert_eq!(tracker.backoff_duration(), std::time::Duration::from_millis(expected_ms));
        }
        tracker.reset();
        assert_eq!(tracker.backoff_duration(), std::time::Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn network_error_message_is_recorded_and_backoff_applied() {
        let mut tracker = FailureTracker::new();
        let relay_health = RelayHealth::new();
        dispatch(&mut tracker, &relay_health, TunnelErrorKind::NetworkError("ECONNREFUSED".into())).await;
        assert_eq!(tracker.backoff_duration(), std::time::Duration::from_millis(2_000));
    }
}
