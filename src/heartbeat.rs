//! Heartbeat watchdog — `spec.md` §4.4 (C4).
//!
//! Ticks independently of the control loop (`spec.md` §5) and only
//! interacts with the session by signaling a notify handle when the stream
//! should be torn down — it never holds a strong reference to the session
//! itself (design note §9, "Cyclic graphs").

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::time::interval;
use tracing::{info, warn};

const DEAD_AFTER: Duration = Duration::from_secs(30);
const WARN_AFTER: Duration = Duration::from_secs(120);
const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Shared last-heartbeat clock, updated from the RUNNING loop on every
/// inbound `HEARTBEAT` and read by the watchdog tick.
pub struct HeartbeatClock {
    started_at: Instant,
    last_heartbeat_millis: AtomicI64,
}

impl HeartbeatClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            started_at: Instant::now(),
            last_heartbeat_millis: AtomicI64::new(0),
        })
    }

    /// Record that a `HEARTBEAT` just arrived.
    pub fn record(&self) {
        let elapsed = self.started_at.elapsed().as_millis() as i64;
        self.last_heartbeat_millis.store(elapsed, Ordering::SeqCst);
    }

    fn elapsed_since_last(&self) -> Duration {
        let last = self.last_heartbeat_millis.load(Ordering::SeqCst);
        let now = self.started_at.elapsed().as_millis() as i64;
        Duration::from_millis((now - last).max(0) as u64)
    }
}

/// Watch `clock` and signal `kill` when the gap since the last heartbeat
/// exceeds 30s (`spec.md` §4.4). Runs until `kill` is triggered or the
/// task is aborted by its owner at teardown.
pub async fn run_watchdog(clock: Arc<HeartbeatClock>, kill: Arc<Notify>) {
    let mut ticker = interval(TICK_INTERVAL);
    let mut warned = false;

    loop {
        ticker.tick().await;
        let gap = clock.elapsed_since_last();

        if gap > DEAD_AFTER {
            warn!(gap_secs = gap.as_secs(), "heartbeat: no HEARTBEAT for >30s — declaring stream dead");
            kill.notify_waiters();
            return;
        }

        if gap > WARN_AFTER && !warned {
            warn!(
                gap_secs = gap.as_secs(),
                "heartbeat: no HEARTBEAT for >120s — last one arrived {}s ago",
                gap.as_secs()
            );
            warned = true;
        } else if gap <= WARN_AFTER && warned {
            info!("heartbeat: recovered after prior warning");
            warned = false;
        }
    }
}
