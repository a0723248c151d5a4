//! Process entry point — `spec.md` §6.2.
//!
//! Grounded on the teacher's `main.rs`: parse CLI, set up logging, dispatch
//! on the subcommand. Exit codes per `spec.md` §6.2: 0 never (the agent is
//! perpetual), 1 on `AuthError`, on missing required `-p`, or on fatal
//! configuration error.

use anyhow::{Context, Result};
use clap::Parser;

use relais_agent::cli::{Args, Command};
use relais_agent::config::{SessionConfig, SessionConfigArgs};
use relais_agent::supervisor::{self, Outcome};
use relais_agent::{logging, token};

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::SetToken { ref token } => {
            logging::init(false, None)?;
            let data_dir = args.data_dir.clone().unwrap_or_else(relais_agent::token::default_data_dir);
            relais_agent::token::write_token(&data_dir, token)
                .with_context(|| "failed to write token file")?;
            println!("token saved");
            Ok(())
        }
        Command::Tunnel { verbose, .. } => {
            logging::init(verbose, None)?;
            run_tunnel(args)
        }
        Command::Doctor => {
            println!("{}", Command::unsupported_message("doctor"));
            Ok(())
        }
        Command::Diagnose => {
            println!("{}", Command::unsupported_message("diagnose"));
            Ok(())
        }
    }
}

fn run_tunnel(args: Args) -> Result<()> {
    let data_dir = args.data_dir.clone().unwrap_or_else(token::default_data_dir);
    let Command::Tunnel {
        port,
        host,
        relay_addr,
        protocol,
        domain,
        remote_port,
        token: cli_token,
        timeout,
        health_check: _health_check,
        no_health_check,
        health_check_interval,
        insecure,
        verbose,
    } = args.command
    else {
        unreachable!("run_tunnel is only called for Command::Tunnel")
    };

    let resolved_token = cli_token.or_else(|| token::read_token(&data_dir));

    let config = SessionConfig::from_args(SessionConfigArgs {
        local_host: host,
        local_port: port,
        relay_addr,
        protocol,
        domain,
        remote_port,
        token: resolved_token,
        timeout_secs: timeout,
        health_check_enabled: !no_health_check,
        health_check_interval_secs: health_check_interval,
        insecure,
        verbose,
    });

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let outcome = runtime.block_on(supervisor::run(config));

    match outcome {
        Outcome::Fatal(reason) => {
            eprintln!("relais-agent: authentication rejected: {reason}");
            std::process::exit(1);
        }
    }
}

