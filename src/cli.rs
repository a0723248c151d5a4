//! CLI surface — `spec.md` §6.2 (external collaborator).
//!
//! Grounded on the teacher's `main.rs` top-level `Args`/`Command` derive
//! pattern, including its convention of stubbing out-of-scope subcommands
//! with a short explanatory message rather than omitting them.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Protocol;

#[derive(Debug, Parser)]
#[command(name = "relais-agent", about = "Reverse-tunnel client agent")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Override the token/data directory (primarily for tests).
    #[arg(long, global = true, env = "RELAIS_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write the auth token file with owner-only permissions.
    SetToken {
        token: String,
    },

    /// Start the supervisor and keep a local service tunneled through the relay.
    Tunnel {
        /// Local port to expose.
        #[arg(short = 'p', long)]
        port: u16,

        /// Local host to forward to.
        #[arg(short = 'h', long, default_value = "localhost")]
        host: String,

        /// Relay address, `host:port`.
        #[arg(short = 's', long, env = "RELAIS_RELAY_ADDR", default_value = "relay.relais.dev:443")]
        relay_addr: String,

        /// Tunnel protocol.
        #[arg(short = 't', long, value_enum, default_value_t = Protocol::Http)]
        protocol: Protocol,

        /// Requested custom domain.
        #[arg(short = 'd', long)]
        domain: Option<String>,

        /// Requested remote port.
        #[arg(short = 'r', long)]
        remote_port: Option<u16>,

        /// Auth token; overrides the persisted token file when set.
        #[arg(short = 'k', long, env = "RELAIS_TOKEN")]
        token: Option<String>,

        /// Establishment timeout, seconds (1-300, default 30).
        #[arg(long)]
        timeout: Option<u64>,

        /// Explicitly enable the tunnel-reachability probe (default: on).
        #[arg(long = "health-check")]
        health_check: bool,

        /// Disable the tunnel-reachability probe.
        #[arg(long = "no-health-check")]
        no_health_check: bool,

        /// Tunnel-reachability probe cadence, seconds (default 30, floored to 1).
        #[arg(long = "health-check-interval")]
        health_check_interval: Option<u64>,

        /// Disable the secure channel (plaintext line-JSON framing).
        #[arg(long)]
        insecure: bool,

        /// Verbose (debug-level) logging.
        #[arg(short = 'v', long)]
        verbose: bool,
    },

    /// Out of core scope — kept as a named stub so the CLI surface matches
    /// what operators expect from the full product.
    Doctor,

    /// Out of core scope — kept as a named stub for the same reason.
    Diagnose,
}

impl Command {
    /// `spec.md` §1: diagnostic subcommands are external collaborators.
    /// Mirrors the teacher's stubbed `Command::Project` response.
    pub fn unsupported_message(name: &str) -> String {
        format!("`{name}` is not part of the core agent")
    }
}
