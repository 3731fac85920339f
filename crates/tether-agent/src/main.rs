//! tether
//!
//! Dials out to a remote endpoint and serves it an interactive shell on a
//! pseudo-terminal. The wire carries the raw terminal byte stream.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::builder::NonEmptyStringValueParser;
use clap::error::ErrorKind;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tether_agent::session;
use tether_agent::RelayOutcome;
use tether_core::config::SessionConfig;
use tether_core::{RemoteEndpoint, TerminalSize};

#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(about = "tether - serve an interactive shell to a remote endpoint over raw TCP")]
#[command(version)]
struct Args {
    /// IPv4 address of the remote endpoint
    address: String,

    /// Port of the remote endpoint
    port: String,

    /// Log level written to stderr
    #[arg(
        long,
        default_value = "off",
        value_parser = ["off", "error", "warn", "info", "debug", "trace"]
    )]
    log_level: String,

    /// Terminal rows
    #[arg(long, default_value_t = 24, value_parser = clap::value_parser!(u16).range(1..))]
    rows: u16,

    /// Terminal columns
    #[arg(long, default_value_t = 80, value_parser = clap::value_parser!(u16).range(1..))]
    cols: u16,

    /// Shell to run instead of the default
    #[arg(long)]
    shell: Option<PathBuf>,

    /// TERM value for the shell
    #[arg(long, value_parser = NonEmptyStringValueParser::new())]
    term: Option<String>,
}

impl Args {
    /// Session configuration: defaults overridden by the command line
    fn session_config(&self) -> SessionConfig {
        let defaults = SessionConfig::default();
        SessionConfig {
            size: TerminalSize::new(self.rows, self.cols),
            shell: self.shell.clone(),
            term: self.term.clone().unwrap_or_else(|| defaults.term.clone()),
            ..defaults
        }
    }
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            err.print().ok();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log_level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(&args) {
        Ok(outcome) => {
            tracing::info!(
                "tether exiting after {} bytes in, {} bytes out",
                outcome.stats.inbound.bytes,
                outcome.stats.outbound.bytes
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run(args: &Args) -> Result<RelayOutcome> {
    let config = args.session_config();
    let endpoint =
        RemoteEndpoint::parse(&args.address, &args.port).context("Invalid remote endpoint")?;

    tracing::info!("tether starting, remote endpoint {}", endpoint);

    let outcome = session::run(endpoint, &config)
        .with_context(|| format!("Session with {} failed", endpoint))?;
    Ok(outcome)
}
