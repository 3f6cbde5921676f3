//! Geodata API gateway.
//!
//! A reverse proxy for geodata services (WMS, WFS, REST) that rewrites
//! response bodies on the way back to the client.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request           ┌────────────────────────────────────────────────┐
//!     ─────────────────────────┼─▶ http server ─▶ routing ─▶ filter chain (pre) │
//!                              │                                   │            │
//!                              │                                   ▼            │
//!     Client Response          │                             hyper-util client ─┼──▶ Upstream
//!     ◀────────────────────────┼── write filter ◀── rewrite decorators ◀────────┼───
//!                              │    (gate → assemble → transform → re-encode)   │
//!                              │                                                │
//!                              │  config · observability · lifecycle            │
//!                              └────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use geodata_gateway::config::load_config;
use geodata_gateway::lifecycle::startup;
use geodata_gateway::observability::logging;

#[derive(Parser)]
#[command(name = "geodata-gateway")]
#[command(about = "Reverse proxy that rewrites geodata responses", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    if cli.check {
        println!(
            "{}: OK ({} routes)",
            cli.config.display(),
            config.routes.len()
        );
        return ExitCode::SUCCESS;
    }

    if let Err(e) = logging::init_tracing(
        &config.observability.log_level,
        config.observability.log_format,
    ) {
        eprintln!("failed to initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "geodata-gateway starting"
    );

    match startup::run(config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Gateway failed");
            ExitCode::FAILURE
        }
    }
}
