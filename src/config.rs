//! Session configuration — `spec.md` §3 "Session configuration".
//!
//! Immutable per attempt. Built once from CLI flags (`src/cli.rs`) and
//! handed by value to every supervisor iteration (`src/supervisor.rs`).

use std::time::Duration;
use tracing::warn;

const MIN_TIMEOUT_SECS: u64 = 1;
const MAX_TIMEOUT_SECS: u64 = 300;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 30;
const MIN_HEALTH_CHECK_INTERVAL_SECS: u64 = 1;

/// Protocol kind requested for the tunnel (`spec.md` §3, §6.1 `protocol`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Tcp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Tcp => write!(f, "tcp"),
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "tcp" => Ok(Protocol::Tcp),
            other => Err(format!("unknown protocol: {other} (expected http or tcp)")),
        }
    }
}

/// Immutable configuration for one tunnel session, shared by every
/// reconnect attempt (`spec.md` §3).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub local_host: String,
    pub local_port: u16,
    pub relay_addr: String,
    pub protocol: Protocol,
    pub domain: Option<String>,
    pub remote_port: Option<u16>,
    pub token: Option<String>,
    pub establish_timeout: Duration,
    pub health_check_enabled: bool,
    pub health_check_interval: Duration,
    pub encryption_enabled: bool,
    pub verbose: bool,
}

/// Raw, pre-validation inputs — one field per CLI flag in `spec.md` §6.2.
pub struct SessionConfigArgs {
    pub local_host: String,
    pub local_port: u16,
    pub relay_addr: String,
    pub protocol: Protocol,
    pub domain: Option<String>,
    pub remote_port: Option<u16>,
    pub token: Option<String>,
    /// Raw `--timeout <s>`; clamped to [1, 300], default 30.
    pub timeout_secs: Option<u64>,
    pub health_check_enabled: bool,
    /// Raw `--health-check-interval <s>`; floored to 1.
    pub health_check_interval_secs: Option<u64>,
    pub insecure: bool,
    pub verbose: bool,
}

impl SessionConfig {
    /// Validate and clamp raw CLI input into an immutable `SessionConfig`.
    ///
    /// `spec.md` §8 boundary behaviors:
    /// - Timeout < 1s or > 300s → validation warning; default of 30s used.
    /// - Health-check interval < 1s → treated as 1s.
    pub fn from_args(args: SessionConfigArgs) -> Self {
        let establish_timeout = match args.timeout_secs {
            Some(s) if (MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&s) => Duration::from_secs(s),
            Some(s) => {
                warn!(
                    requested_secs = s,
                    default_secs = DEFAULT_TIMEOUT_SECS,
                    "establishment timeout out of range [1, 300] — using default"
                );
                Duration::from_secs(DEFAULT_TIMEOUT_SECS)
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let health_check_interval = match args.health_check_interval_secs {
            Some(s) if s < MIN_HEALTH_CHECK_INTERVAL_SECS => {
                warn!(
                    requested_secs = s,
                    floor_secs = MIN_HEALTH_CHECK_INTERVAL_SECS,
                    "health-check interval below minimum — flooring to 1s"
                );
                Duration::from_secs(MIN_HEALTH_CHECK_INTERVAL_SECS)
            }
            Some(s) => Duration::from_secs(s),
            None => Duration::from_secs(DEFAULT_HEALTH_CHECK_INTERVAL_SECS),
        };

        SessionConfig {
            local_host: args.local_host,
            local_port: args.local_port,
            relay_addr: args.relay_addr,
            protocol: args.protocol,
            domain: args.domain,
            remote_port: args.remote_port,
            token: args.token,
            establish_timeout,
            health_check_enabled: args.health_check_enabled,
            health_check_interval,
            encryption_enabled: !args.insecure,
            verbose: args.verbose,
        }
    }

    pub fn local_addr(&self) -> String {
        format!("{}:{}", self.local_host, self.local_port)
    }
}
