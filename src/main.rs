//! Smartweb server binary.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net::listener ──▶ net::dispatch ──┬─ plaintext ─┐
//!                (bounded accept)  (sniff prefix)  └─ TLS ───────┤
//!                                                                ▼
//!                                        http::server (hyper auto, axum)
//!                                                                │
//!                                        auth::middleware (digest + ACL)
//!                                                                │
//!                                        http::handlers ──▶ store (files)
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use smartweb::config::{read_config, validate_config, ServerConfig};
use smartweb::lifecycle;
use smartweb::observability::logging;

#[derive(Parser)]
#[command(name = "smartweb")]
#[command(about = "Single-port HTTP/HTTPS server over a hierarchical entry store", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the config file.
    #[arg(short, long)]
    listen: Option<String>,

    /// Store root directory, overriding the config file.
    #[arg(short, long)]
    root: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match read_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        },
        None => ServerConfig::default(),
    };
    if let Some(listen) = cli.listen {
        config.listener.bind_address = listen;
    }
    if let Some(root) = cli.root {
        config.storage.root = root;
    }

    if let Err(errors) = validate_config(&config) {
        for e in &errors {
            eprintln!("invalid configuration: {e}");
        }
        return ExitCode::FAILURE;
    }

    if let Err(e) = logging::init(&config.observability.log_level) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        root = %config.storage.root,
        max_connections = config.listener.max_connections,
        "smartweb starting"
    );

    match lifecycle::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}
