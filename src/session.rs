//! Control session — `spec.md` §4.8 (C8).
//!
//! One run of `ControlSession::run` is one attempt: dial, handshake,
//! request, then the RUNNING message loop until something tears the
//! session down. It never returns success — the loop only ends by
//! producing a [`TunnelErrorKind`] for the supervisor to classify
//! (`spec.md` §4.9: "on success (never, in practice)").
//!
//! Grounded on the teacher's `relay/mod.rs` (connect → handshake →
//! message loop shape) generalized to this protocol's five-state machine
//! and closed command enum (design note §9 "Dynamic dispatch").

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use std::io;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::crypto::{PendingHandshake, SecureChannel};
use crate::error::TunnelErrorKind;
use crate::framing::{FrameDecoder, FrameEncoder};
use crate::heartbeat::{self, HeartbeatClock};
use crate::relay_health::{self, RelayHealth};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::splicer;
use crate::tunnel_health::{self, TunnelHealthState};
use crate::wire::{ControlMessage, SecureAck, SecureInit, TunnelRequest, TunnelResponse};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const RELAY_HEALTH_URL: &str = "https://relais.dev/api/health";

fn protocol_err(msg: impl Into<String>) -> TunnelErrorKind {
    TunnelErrorKind::ProtocolError(msg.into())
}

struct Established {
    decoder: FrameDecoder<OwnedReadHalf>,
    secure: Option<SecureChannel>,
    public_addr: String,
}

/// Open a TCP connection to the relay. `spec.md` §4.8: on `ENOTFOUND`
/// retry up to 3 times (2s, 4s, 8s); any other error surfaces immediately.
async fn dial(relay_addr: &str) -> Result<TcpStream, TunnelErrorKind> {
    let retry_cfg = RetryConfig::dialing_enotfound();
    retry_with_backoff(
        &retry_cfg,
        |e: &io::Error| e.to_string().contains("ENOTFOUND"),
        || async {
            match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(relay_addr)).await {
                Ok(Ok(stream)) => Ok(stream),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "ETIMEDOUT: connect timed out")),
            }
        },
    )
    .await
    .map_err(|e| TunnelErrorKind::NetworkError(e.to_string()))
}

async fn send_json(
    encoder: &mut FrameEncoder<OwnedWriteHalf>,
    secure: &Option<SecureChannel>,
    value: &Value,
) -> Result<(), TunnelErrorKind> {
    match secure {
        Some(channel) => {
            let plaintext = serde_json::to_vec(value)
                .map_err(|e| protocol_err(format!("failed to serialize message: {e}")))?;
            let record = channel.encrypt(&plaintext)?;
            encoder.encode_encrypted_record(&record).await
        }
        None => encoder.encode_line_json(value).await,
    }
}

async fn recv_json(
    decoder: &mut FrameDecoder<OwnedReadHalf>,
    secure: &Option<SecureChannel>,
) -> Result<Value, TunnelErrorKind> {
    match secure {
        Some(channel) => {
            let record = decoder.decode_encrypted_record().await?;
            let plaintext = channel.decrypt(&record)?;
            serde_json::from_slice(&plaintext).map_err(|e| protocol_err(format!("invalid JSON: {e}")))
        }
        None => decoder.decode_line_json().await,
    }
}

/// DIALING → HANDSHAKING → REQUESTING, producing a session ready for
/// RUNNING. Bounded by the caller's establishment timeout.
async fn establish(stream: TcpStream, config: &SessionConfig) -> Result<Established, TunnelErrorKind> {
    splicer::apply_tcp_tunables(&stream);
    let (read_half, write_half) = stream.into_split();
    let mut decoder = FrameDecoder::new(read_half);
    let mut encoder = FrameEncoder::new(write_half);

    let secure = if config.encryption_enabled {
        let pending = PendingHandshake::generate();
        let init = SecureInit::new(pending.client_public_key_b64().to_string());
        let init_value = serde_json::to_value(&init)
            .map_err(|e| protocol_err(format!("failed to serialize SECURE_INIT: {e}")))?;
        encoder.encode_handshake_json(&init_value).await?;

        let ack_value = decoder.decode_handshake_json().await?;
        let ack: SecureAck = serde_json::from_value(ack_value)
            .map_err(|e| protocol_err(format!("invalid SECURE_ACK: {e}")))?;
        if !ack.is_ok() {
            return Err(TunnelErrorKind::ServerError(
                ack.error.unwrap_or_else(|| "handshake rejected".to_string()),
            ));
        }
        let server_public_key = ack
            .server_public_key
            .ok_or_else(|| protocol_err("SECURE_ACK missing server_public_key"))?;
        Some(pending.complete(&server_public_key)?)
    } else {
        None
    };

    let request = TunnelRequest::new(
        config.local_port,
        config.domain.as_deref(),
        config.remote_port,
        config.token.as_deref(),
        &config.protocol.to_string(),
    );
    let request_value =
        serde_json::to_value(&request).map_err(|e| protocol_err(format!("failed to serialize TUNNEL: {e}")))?;
    send_json(&mut encoder, &secure, &request_value).await?;

    let response_value = recv_json(&mut decoder, &secure).await?;
    let response: TunnelResponse = serde_json::from_value(response_value)
        .map_err(|e| protocol_err(format!("invalid TUNNEL response: {e}")))?;

    if !response.is_ok() {
        let message = response.error.unwrap_or_default();
        return Err(if response.is_auth_error() {
            TunnelErrorKind::AuthError(message)
        } else {
            TunnelErrorKind::ServerError(message)
        });
    }

    let public_addr = response
        .public_addr
        .ok_or_else(|| protocol_err("TUNNEL OK reply missing public_addr"))?;

    Ok(Established {
        decoder,
        secure,
        public_addr,
    })
}

/// RUNNING loop: the control decoder is the session's exclusive reader
/// (`spec.md` §5); NEWCONN spawns C3 without waiting for it, HEARTBEAT
/// updates the watchdog clock, anything else is logged and ignored.
async fn decode_loop(
    mut decoder: FrameDecoder<OwnedReadHalf>,
    secure: Option<SecureChannel>,
    heartbeat_clock: Arc<HeartbeatClock>,
    local_addr: String,
) -> TunnelErrorKind {
    loop {
        let value = match recv_json(&mut decoder, &secure).await {
            Ok(v) => v,
            Err(e) => return e,
        };

        match ControlMessage::from_json(&value) {
            ControlMessage::NewConn(nc) => {
                let local_addr = local_addr.clone();
                tokio::spawn(async move {
                    splicer::run_pair(&nc.conn_id, &nc.data_addr, &local_addr).await;
                });
            }
            ControlMessage::Heartbeat => heartbeat_clock.record(),
            ControlMessage::Other(command) => {
                debug!(command = %command, "session: ignoring unrecognized control message");
            }
        }
    }
}

fn log_banner(message: &str) {
    info!(at = %chrono::Utc::now().to_rfc3339(), "{message}");
}

/// Drive one attempt of the control-session state machine to completion.
/// `relay_health` is supplied by the supervisor and outlives every
/// individual attempt, since C5's wait-for-recovery state must be
/// observable across reconnects.
pub async fn run(config: &SessionConfig, relay_health: Arc<RelayHealth>) -> TunnelErrorKind {
    let attempt = async {
        let stream = dial(&config.relay_addr).await?;
        establish(stream, config).await
    };

    let established = match tokio::time::timeout(config.establish_timeout, attempt).await {
        Ok(Ok(established)) => established,
        Ok(Err(e)) => return e,
        Err(_) => return TunnelErrorKind::EstablishTimeout,
    };

    let scheme = match config.protocol {
        crate::config::Protocol::Http => "https",
        crate::config::Protocol::Tcp => "tcp",
    };
    log_banner(&format!("🚀 Tunnel active! {scheme}://{}", established.public_addr));

    let heartbeat_clock = HeartbeatClock::new();
    heartbeat_clock.record();
    let heartbeat_kill = Arc::new(Notify::new());
    let heartbeat_task = tokio::spawn(heartbeat::run_watchdog(heartbeat_clock.clone(), heartbeat_kill.clone()));

    let relay_kill = Arc::new(Notify::new());
    let relay_task = {
        let relay_health = relay_health.clone();
        let relay_kill = relay_kill.clone();
        tokio::spawn(relay_health::run_probe(
            RELAY_HEALTH_URL.to_string(),
            relay_health,
            relay_kill,
            || log_banner("🚨 Serveur inaccessible"),
            || log_banner("✅ relay reachable again"),
        ))
    };

    let tunnel_kill = Arc::new(Notify::new());
    let tunnel_task = if config.health_check_enabled {
        let tunnel_state = TunnelHealthState::new();
        let local_addr = config.local_addr();
        let public_addr = established.public_addr.clone();
        let protocol = config.protocol;
        let interval = config.health_check_interval;
        let relay_health = relay_health.clone();
        let tunnel_kill = tunnel_kill.clone();
        let local_addr_for_logs = local_addr.clone();
        Some(tokio::spawn(tunnel_health::run_probe(
            interval,
            local_addr,
            protocol,
            public_addr,
            tunnel_state,
            relay_health,
            tunnel_kill,
            move || log_banner(&format!("⚠️ Port local {local_addr_for_logs} inaccessible")),
            move || log_banner("✅ local port reachable again"),
        )))
    } else {
        None
    };

    let heartbeat_notified = heartbeat_kill.notified();
    let relay_notified = relay_kill.notified();
    let tunnel_notified = tunnel_kill.notified();
    tokio::pin!(heartbeat_notified, relay_notified, tunnel_notified);

    let result = tokio::select! {
        _ = &mut heartbeat_notified => TunnelErrorKind::Closed { by_server: false },
        _ = &mut relay_notified => TunnelErrorKind::HealthMonitorTriggered,
        _ = &mut tunnel_notified, if tunnel_task.is_some() => TunnelErrorKind::TunnelHealthTriggered,
        e = decode_loop(established.decoder, established.secure, heartbeat_clock, config.local_addr()) => e,
    };

    heartbeat_task.abort();
    relay_task.abort();
    if let Some(task) = tunnel_task {
        task.abort();
    }
    warn!(error = %result, "session: tearing down control stream");
    result
}
