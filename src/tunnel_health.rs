//! Tunnel-reachability probe — `spec.md` §4.6 (C6).
//!
//! Two independent checks per cycle: local-port liveness and end-to-end
//! (public address) liveness. Neither check ever touches the control
//! session directly — it signals via callbacks/notify, matching C4/C5.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::Protocol;
use crate::relay_health::RelayHealth;

const LOCAL_TIMEOUT: Duration = Duration::from_secs(5);
const PUBLIC_TIMEOUT: Duration = Duration::from_secs(10);
const CONSECUTIVE_FAILURES_THRESHOLD: u32 = 3;
const HEADER_NAME: &str = "X-Relais-Health-Check";

/// Observable tunnel health state.
pub struct TunnelHealthState {
    local_up: AtomicBool,
}

impl TunnelHealthState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            local_up: AtomicBool::new(true),
        })
    }

    pub fn is_local_up(&self) -> bool {
        self.local_up.load(Ordering::SeqCst)
    }
}

async fn check_local(local_addr: &str) -> bool {
    tokio::time::timeout(LOCAL_TIMEOUT, TcpStream::connect(local_addr))
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false)
}

async fn check_end_to_end(client: &reqwest::Client, protocol: Protocol, public_addr: &str) -> bool {
    match protocol {
        Protocol::Tcp => tokio::time::timeout(PUBLIC_TIMEOUT, TcpStream::connect(public_addr))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false),
        Protocol::Http => {
            let url = format!("https://{public_addr}");
            client
                .get(&url)
                .header(HEADER_NAME, "true")
                .send()
                .await
                .is_ok() // any status code is success — the request returned through the tunnel
        }
    }
}

/// Run the tunnel-reachability probe on `interval` until `kill` fires.
///
/// `spec.md` §4.6: a local-port failure never tears down the session; an
/// end-to-end failure first checks the relay directly — if the relay is
/// reachable it fires `kill` (reconnect), otherwise it waits for the relay
/// to recover via `relay_health`.
pub async fn run_probe(
    interval_duration: Duration,
    local_addr: String,
    protocol: Protocol,
    public_addr: String,
    state: Arc<TunnelHealthState>,
    relay_health: Arc<RelayHealth>,
    kill: Arc<Notify>,
    on_local_port_down: impl Fn() + Send + 'static,
    on_local_port_restored: impl Fn() + Send + 'static,
) {
    let client = match reqwest::Client::builder().timeout(PUBLIC_TIMEOUT).build() {
        Ok(c) => c,
        Err(e) => {
            warn!("tunnel_health: failed to build HTTP client: {e} — probe disabled");
            return;
        }
    };

    let mut ticker = interval(interval_duration);
    let mut local_failures = 0u32;
    let mut e2e_failures = 0u32;

    loop {
        ticker.tick().await;

        let local_ok = check_local(&local_addr).await;
        if local_ok {
            if local_failures >= CONSECUTIVE_FAILURES_THRESHOLD {
                info!("tunnel_health: local port {local_addr} reachable again");
                on_local_port_restored();
            }
            local_failures = 0;
            state.local_up.store(true, Ordering::SeqCst);
        } else {
            local_failures += 1;
            if local_failures == CONSECUTIVE_FAILURES_THRESHOLD {
                warn!("tunnel_health: local port {local_addr} unreachable for 3 consecutive checks");
                state.local_up.store(false, Ordering::SeqCst);
                on_local_port_down();
            }
            // Tie-break (`spec.md` §4.6): end-to-end is skipped this cycle
            // when local just failed.
            if local_failures <= CONSECUTIVE_FAILURES_THRESHOLD {
                continue;
            }
        }

        let e2e_ok = check_end_to_end(&client, protocol, &public_addr).await;
        if e2e_ok {
            e2e_failures = 0;
            continue;
        }

        e2e_failures += 1;
        if e2e_failures < CONSECUTIVE_FAILURES_THRESHOLD {
            continue;
        }

        warn!("tunnel_health: tunnel unreachable for 3 consecutive checks");
        if relay_health.is_healthy() {
            warn!("tunnel_health: relay is reachable — requesting reconnect");
            kill.notify_waiters();
            return;
        } else {
            info!("tunnel_health: relay also unreachable — waiting for relay recovery");
            relay_health.wait_for_recovery().await;
            e2e_failures = 0;
        }
    }
}
