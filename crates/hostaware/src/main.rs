//! Hostaware Daemon
//!
//! Loads plugins, keeps their instances running and serves control requests
//! on a Unix domain socket.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use hostaware::config::{Config, DEFAULT_CONFIG_PATH};
use hostaware::logging::LogControl;
use hostaware::server::{self, ServerState};
use hostaware::startup;
use hostaware_runtime::{DylibLoader, PluginManager};

/// Hostaware plugin orchestrator daemon
#[derive(Parser, Debug)]
#[command(name = "hostaware")]
#[command(about = "Hostaware plugin orchestrator daemon", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Control socket path (overrides the config file)
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Plugin directory (overrides the config file)
    #[arg(long)]
    plugin_dir: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    if let Some(socket) = args.socket {
        config.server.socket = socket;
    }
    if let Some(dir) = args.plugin_dir {
        config.plugins.dir = dir;
    }

    if args.print_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let log = LogControl::init(&config.log)?;
    info!("Starting hostaware v{}", env!("CARGO_PKG_VERSION"));

    let manager = PluginManager::spawn(DylibLoader, tokio::runtime::Handle::current())
        .context("failed to start plugin manager")?;

    startup::run(&manager, &config).await;

    let socket = config.server.socket.clone();
    let listener = server::bind(&socket)
        .with_context(|| format!("failed to bind {}", socket.display()))?;
    info!(socket = %socket.display(), "Listening for control requests");

    let state = ServerState::new(manager.clone(), config, args.config, log);
    server::serve(listener, state, shutdown_signal()).await?;

    info!("Disabling instances...");
    if let Err(e) = manager.shutdown().await {
        warn!("Plugin manager did not shut down cleanly: {}", e);
    }
    if let Err(e) = std::fs::remove_file(&socket) {
        warn!(socket = %socket.display(), error = %e, "Failed to remove socket");
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        },
    }
}
