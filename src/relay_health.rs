//! Relay-reachability probe — `spec.md` §4.5 (C5).
//!
//! Periodic HTTPS health check against a fixed vendor URL. Confined to its
//! own task; it signals the owning control session via a notify handle
//! rather than holding a reference to it (design note §9).
//!
//! Grounded on the teacher's `connectivity/monitor.rs` (periodic
//! `reqwest` polling loop with a rolling degraded/restored state machine)
//! and its client-builder-with-timeout convention.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::interval;
use tracing::{info, warn};

const PROBE_INTERVAL: Duration = Duration::from_secs(5);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const UNHEALTHY_THRESHOLD: Duration = Duration::from_secs(30);

/// Observable relay health, shared between the probe task and anything
/// that needs a synchronous "is the relay up" read (e.g. C6's fallback
/// check, or a blocking wait-for-recovery call).
pub struct RelayHealth {
    healthy: AtomicBool,
    notify_recovered: Notify,
}

impl RelayHealth {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(true),
            notify_recovered: Notify::new(),
        })
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// Block until the relay is observed healthy again. Used by the
    /// supervisor's `HealthMonitorTriggered` wait state (`spec.md` §4.9).
    pub async fn wait_for_recovery(&self) {
        if self.is_healthy() {
            return;
        }
        loop {
            let notified = self.notify_recovered.notified();
            if self.is_healthy() {
                return;
            }
            notified.await;
            if self.is_healthy() {
                return;
            }
        }
    }
}

async fn probe_once(client: &reqwest::Client, health_url: &str) -> bool {
    let resp = match client.get(health_url).send().await {
        Ok(r) => r,
        Err(_) => return false,
    };
    if resp.status().as_u16() != 200 {
        return false;
    }
    let body: serde_json::Value = match resp.json().await {
        Ok(b) => b,
        Err(_) => return false,
    };
    let code_ok = body.get("code").and_then(|c| c.as_u64()) == Some(200);
    let message_healthy = body
        .get("message")
        .and_then(|m| m.as_str())
        .map(|m| m.contains("healthy"))
        .unwrap_or(false);
    code_ok && message_healthy
}

/// Run the relay-reachability probe until `kill` fires. When the relay has
/// been continuously unreachable for 30s, `on_connection_lost` is called
/// exactly once and `kill` is triggered so the owning session tears down
/// (`spec.md` §4.5). Recovery calls `on_connection_restored` and wakes any
/// `wait_for_recovery` callers.
pub async fn run_probe(
    health_url: String,
    state: Arc<RelayHealth>,
    kill: Arc<Notify>,
    on_connection_lost: impl Fn() + Send + 'static,
    on_connection_restored: impl Fn() + Send + 'static,
) {
    let client = match reqwest::Client::builder().timeout(PROBE_TIMEOUT).build() {
        Ok(c) => c,
        Err(e) => {
            warn!("relay_health: failed to build HTTP client: {e} — probe disabled");
            return;
        }
    };

    let mut ticker = interval(PROBE_INTERVAL);
    let mut unhealthy_since: Option<tokio::time::Instant> = None;
    let mut lost_fired = false;

    loop {
        ticker.tick().await;
        let healthy = probe_once(&client, &health_url).await;

        if healthy {
            if !state.is_healthy() {
                info!("relay_health: relay reachable again");
                on_connection_restored();
            }
            state.healthy.store(true, Ordering::SeqCst);
            state.notify_recovered.notify_waiters();
            unhealthy_since = None;
            lost_fired = false;
        } else {
            let since = *unhealthy_since.get_or_insert_with(tokio::time::Instant::now);
            state.healthy.store(false, Ordering::SeqCst);

            if since.elapsed() >= UNHEALTHY_THRESHOLD && !lost_fired {
                warn!("relay_health: relay unreachable for >=30s — tearing down control session");
                lost_fired = true;
                on_connection_lost();
                kill.notify_waiters();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_healthy_by_default() {
        let health = RelayHealth::new();
        assert!(health.is_healthy());
    }

    #[tokio::test]
    async fn wait_for_recovery_returns_immediately_when_healthy() {
        let health = RelayHealth::new();
        tokio::time::timeout(Duration::from_millis(100), health.wait_for_recovery())
            .await
            .expect("should not block when already healthy");
    }

    #[tokio::test]
    async fn wait_for_recovery_unblocks_on_notify() {
        let health = RelayHealth::new();
        health.healthy.store(false, Ordering::SeqCst);

        let waiter_health = health.clone();
        let waiter = tokio::spawn(async move {
            waiter_health.wait_for_recovery().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        health.healthy.store(true, Ordering::SeqCst);
        health.notify_recovered.notify_waiters();

        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("waiter task timed out")
            .expect("waiter task panicked");
    }
}
