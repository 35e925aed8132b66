//! pixelport — OPC server entry point.
//!
//! ```text
//! pixelport <config.json>           Run the bridge
//! pixelport <config.json> --debug   Also print periodic statistics
//! ```
//!
//! Exit codes: 0 on clean shutdown, 2 on configuration errors, 1 on a
//! fatal bind error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pixelport_core::{BridgeError, BridgeServer, Config};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "pixelport",
    about = "Receives OPC frames over TCP and drives USB serial LED controllers"
)]
struct Cli {
    /// Path to configuration file (JSON).
    config: PathBuf,

    /// Print periodic per-output statistics.
    #[arg(long)]
    debug: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("pixelport v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration error");
            return ExitCode::from(2);
        }
    };

    let server = match BridgeServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "failed to start");
            return ExitCode::from(2);
        }
    };

    if cli.debug {
        server.spawn_stats_ticker();
    }

    // Ctrl-C handler.
    let token = server.shutdown_token();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received — shutting down");
        token.cancel();
    });

    let result = server.run().await;
    // Shut down either way so outputs get their blackout frame.
    server.shutdown().await;

    match result {
        Ok(()) => {
            info!("clean shutdown");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "fatal server error");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: &Path) -> Result<Config, BridgeError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| BridgeError::Config(format!("cannot read {}: {e}", path.display())))?;
    Config::from_json(&text)
}
