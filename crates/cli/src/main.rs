//! sipfront: SIP call-setup signaling front-end
//!
//! Reads its configuration from the environment (optionally seeded from an
//! env file), answers INVITEs on UDP and runs until Ctrl-C or SIGTERM.

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sipfront_call_engine::{CallServices, SignalingConfig, SignalingServer};
use sipfront_infra_common::logging::{LogFormat, LoggingConfig, log_welcome, parse_log_level, setup_logging};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "SIP call-setup signaling front-end", long_about = None)]
struct Args {
    /// Env file to load before reading the environment
    #[arg(short, long, env = "SIPFRONT_ENV_FILE")]
    env_file: Option<PathBuf>,

    /// Override SIP_LISTEN_ADDRESS
    #[arg(long)]
    listen_address: Option<IpAddr>,

    /// Override SIP_PORT
    #[arg(short, long)]
    port: Option<u16>,

    /// Override LOG_LEVEL (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines regardless of LOG_FORMAT
    #[arg(long)]
    json_logs: bool,

    /// Load and print the configuration, then exit
    #[arg(long)]
    check_config: bool,
}

fn load_config(args: &Args) -> Result<SignalingConfig> {
    let mut config = match &args.env_file {
        Some(path) => SignalingConfig::from_env_file(path),
        None => SignalingConfig::from_env(),
    }
    .context("failed to load configuration")?;

    if let Some(ip) = args.listen_address {
        config.listen_addr.set_ip(ip);
    }
    if let Some(port) = args.port {
        config.listen_addr.set_port(port);
    }
    if let Some(level) = &args.log_level {
        config.log_level = parse_log_level(level)?;
    }
    if args.json_logs {
        config.log_format = LogFormat::Json;
    }
    Ok(config)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    setup_logging(LoggingConfig::new(config.log_level).with_format(config.log_format))
        .context("failed to initialize logging")?;
    log_welcome("sipfront", env!("CARGO_PKG_VERSION"));
    info!(config = ?config, "Configuration loaded");

    if args.check_config {
        return Ok(());
    }

    let services = CallServices::http(&config).context("failed to build service clients")?;
    let mut server = SignalingServer::new(config, services);
    server
        .start()
        .await
        .context("failed to start signaling server")?;

    shutdown_signal().await;
    server.shutdown().await.context("shutdown failed")?;
    Ok(())
}
