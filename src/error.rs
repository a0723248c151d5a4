//! Closed error-kind taxonomy for the control session and supervisor.
//!
//! `spec.md` §7 describes these as "kinds, not types" and design note §9
//! asks that string-based dispatch be replaced with a statically checked
//! enum. `TunnelErrorKind` is that enum; `ControlSession::run` always
//! resolves to one of its variants, never a bare `anyhow::Error`.

use thiserror::Error;

/// Classification of every way a control session attempt can end.
///
/// Variants map 1:1 onto `spec.md` §7. The supervisor (`src/supervisor.rs`)
/// matches exhaustively on this enum; there is no catch-all "unknown error"
/// variant by design — anything not otherwise classified at the point it is
/// raised is treated by the supervisor as a network error (see
/// `FailureTracker::is_network_error`).
#[derive(Debug, Error)]
pub enum TunnelErrorKind {
    /// `TUNNEL` reply carried an auth-related `error` field. Fatal — the
    /// process exits, no reconnect is attempted.
    #[error("authentication rejected by relay: {0}")]
    AuthError(String),

    /// `TUNNEL` reply was non-OK for a non-auth reason.
    #[error("relay rejected tunnel request: {0}")]
    ServerError(String),

    /// Malformed framing: bad magic, oversize length, incomplete-after-EOF,
    /// invalid base64/JSON.
    #[error("protocol violation: {0}")]
    ProtocolError(String),

    /// AEAD tag mismatch, truncated payload, or encryption attempted before
    /// key derivation.
    #[error("crypto failure: {0}")]
    CryptoError(String),

    /// EOF or an explicit socket destroy. `by_server` distinguishes a
    /// server-initiated closure (counted by the failure tracker) from a
    /// local teardown.
    #[error("connection closed by server")]
    Closed { by_server: bool },

    /// An OS-level network error (see `FailureTracker::is_network_error`).
    #[error("network error: {0}")]
    NetworkError(String),

    /// The DIALING→RUNNING segment exceeded the establishment timeout.
    #[error("establishment timeout exceeded")]
    EstablishTimeout,

    /// The relay-reachability probe (C5) demanded a tear-down.
    #[error("relay health monitor triggered reconnect")]
    HealthMonitorTriggered,

    /// The tunnel-reachability probe (C6) demanded a tear-down.
    #[error("tunnel health monitor triggered reconnect")]
    TunnelHealthTriggered,
}

impl TunnelErrorKind {
    /// True if this error kind should be fatal to the whole process
    /// (§7: only `AuthError`).
    pub fn is_fatal(&self) -> bool {
        matches!(self, TunnelErrorKind::AuthError(_))
    }
}
