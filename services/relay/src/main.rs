//! TCP relay.
//!
//! Listens on a local port and relays every accepted connection to a fixed
//! destination:
//! - Optional TLS termination with an ephemeral self-signed certificate
//! - Optional TLS to the destination (certificate not verified)
//! - Optional PROXY protocol v1 header carrying the client address
//!
//! Runs until killed; any startup or accept failure exits with status 1.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use tracing::{debug, info};

use tcp_relay::{console, serve, Cli, ListenerConfig};

mod logging;

const USAGE: &str = "usage: proxy <from-port> <to-address> <protocol> [proxy] [secure]";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            console::error(clap_message(&e));
            eprintln!("{USAGE}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = logging::init(&cli.log_level) {
        console::error(format!("{e:#}"));
        return ExitCode::from(1);
    }

    match run(&cli).await {
        Ok(never) => match never {},
        Err(e) => {
            let message = format!("{e:#}");
            debug!(error = %message, "Relay failed");
            console::error(&message);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: &Cli) -> Result<std::convert::Infallible> {
    let config = ListenerConfig::try_from(cli).context("invalid arguments")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_addr = %config.bind_addr,
        destination = %config.destination,
        "Starting relay"
    );

    Ok(serve(config).await?)
}

/// First line of a clap error without its `error: ` prefix.
fn clap_message(e: &clap::Error) -> String {
    let rendered = e.render().to_string();
    let first = rendered.lines().next().unwrap_or_default();
    first.strip_prefix("error: ").unwrap_or(first).to_string()
}
