//! Bidirectional splicer — `spec.md` §4.3 (C3).
//!
//! Stitches a remote data channel to the local service. Each pair is its
//! own `tokio::spawn`ed task so it never blocks the control loop
//! (`spec.md` §5: "NEWCONN dispatch does not block the decode loop").
//!
//! Grounded on the two-independent-copier shape in
//! `other_examples/.../spectre-network/src/tunnel.rs` (`encrypted_pipe`,
//! `tokio::select!` over two `tokio::io::copy` halves), adapted to use real
//! half-close (`AsyncWriteExt::shutdown`) instead of that example's
//! always-both-directions-at-once teardown, per design note §9.3.

use tokio::io::{self, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Duration;
use tracing::{debug, warn};

const KEEPALIVE_IDLE: Duration = Duration::from_secs(30);
const RECV_BUF_BYTES: u32 = 256 * 1024;
const SEND_BUF_BYTES: u32 = 256 * 1024;

/// Apply the TCP tunables `spec.md` §4.3 step 3 requires to a freshly
/// opened stream: `TCP_NODELAY` on, keepalive with a >=30s idle, and
/// send/receive buffers >= 256 KiB.
pub fn apply_tcp_tunables(stream: &TcpStream) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!("splicer: failed to set TCP_NODELAY: {e}");
    }

    let keepalive = socket2::TcpKeepalive::new().with_time(KEEPALIVE_IDLE);
    let sock_ref = socket2::SockRef::from(stream);
    if let Err(e) = sock_ref.set_tcp_keepalive(&keepalive) {
        warn!("splicer: failed to configure keepalive: {e}");
    }
    if let Err(e) = sock_ref.set_recv_buffer_size(RECV_BUF_BYTES as usize) {
        warn!("splicer: failed to set receive buffer size: {e}");
    }
    if let Err(e) = sock_ref.set_send_buffer_size(SEND_BUF_BYTES as usize) {
        warn!("splicer: failed to set send buffer size: {e}");
    }
}

/// Run one data/local pair end to end: open both streams, splice them, and
/// wait for both directions to drain. Errors are confined to the pair —
/// the caller logs and moves on; nothing here propagates to the control
/// session (`spec.md` §4.3 "Failure policy").
///
/// The two copiers race via `select!` rather than running to completion
/// independently: a clean EOF on one direction lets the other keep
/// draining (true half-close), but an I/O error on either side ends the
/// race immediately and the still-running copier is dropped mid-flight,
/// which drops its borrowed stream half. Both underlying streams are then
/// dropped explicitly so the pair is destroyed together — a half-closed
/// pair never outlives its partner (`spec.md` §3).
pub async fn run_pair(conn_id: &str, data_addr: &str, local_addr: &str) {
    let data_stream = match TcpStream::connect(data_addr).await {
        Ok(s) => s,
        Err(e) => {
            warn!(conn_id, data_addr, "splicer: failed to connect to data channel: {e}");
            return;
        }
    };

    let local_stream = match TcpStream::connect(local_addr).await {
        Ok(s) => s,
        Err(e) => {
            warn!(conn_id, local_addr, "splicer: failed to connect to local service: {e}");
            drop(data_stream);
            return;
        }
    };

    apply_tcp_tunables(&data_stream);
    apply_tcp_tunables(&local_stream);

    let (mut data_rd, mut data_wr) = data_stream.into_split();
    let (mut local_rd, mut local_wr) = local_stream.into_split();

    {
        // `tokio::io::copy` already pauses the source on write backpressure
        // and resumes on drain; on EOF we perform a write-side shutdown
        // (real TCP FIN on one direction only), not a hard close of the
        // whole stream.
        let local_to_data = async {
            let result = io::copy(&mut local_rd, &mut data_wr).await;
            let _ = data_wr.shutdown().await;
            result
        };
        let data_to_local = async {
            let result = io::copy(&mut data_rd, &mut local_wr).await;
            let _ = local_wr.shutdown().await;
            result
        };
        tokio::pin!(local_to_data, data_to_local);

        let mut a_done: Option<io::Result<u64>> = None;
        let mut b_done: Option<io::Result<u64>> = None;

        while a_done.is_none() || b_done.is_none() {
            tokio::select! {
                res = &mut local_to_data, if a_done.is_none() => {
                    if let Err(e) = &res {
                        warn!(conn_id, "splicer: local->data copy ended with error: {e}");
                        a_done = Some(res);
                        break;
                    }
                    a_done = Some(res);
                }
                res = &mut data_to_local, if b_done.is_none() => {
                    if let Err(e) = &res {
                        warn!(conn_id, "splicer: data->local copy ended with error: {e}");
                        b_done = Some(res);
                        break;
                    }
                    b_done = Some(res);
                }
            }
        }
        // Falling out of this block drops whichever copier never finished,
        // cancelling it mid-poll instead of waiting on it.
    }

    drop(data_rd);
    drop(data_wr);
    drop(local_rd);
    drop(local_wr);
    debug!(conn_id, "splicer: pair torn down");
}
