// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod listener;
mod tuner;

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use dab_app::init_logging;
use dab_core::{
    spawn_engine, ChannelId, DynResult, EngineSettings, HistorySink, SwitchEngine, Tuner,
};
use dab_history::{HistoryLedger, HistoryStore};

use config::ServerConfig;
use listener::ControlContext;
use tuner::SimulatedTuner;

const PKG_DESCRIPTION: &str = concat!(
    env!("CARGO_PKG_NAME"),
    " - DAB announcement switching daemon"
);
const ENGINE_QUEUE_CAPACITY: usize = 64;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Service selected at startup
    #[arg(short = 's', long = "service")]
    service: Option<String>,
    /// IP address for the JSON TCP listener
    #[arg(short = 'l', long = "listen")]
    listen: Option<IpAddr>,
    /// Port for the JSON TCP listener
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,
}

fn open_ledger(cfg: &ServerConfig) -> Arc<HistoryLedger> {
    let capacity = cfg.announcements.history_capacity();
    if !cfg.history.persist {
        return Arc::new(HistoryLedger::new(capacity));
    }

    let path = cfg.history.resolved_path();
    let opened =
        HistoryStore::open(&path).and_then(|store| HistoryLedger::with_store(store, capacity));
    match opened {
        Ok(ledger) => Arc::new(ledger),
        Err(e) => {
            warn!(
                "History persistence unavailable ({}), keeping history in memory",
                e
            );
            Arc::new(HistoryLedger::new(capacity))
        }
    }
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ServerConfig::example_combined_toml());
        return Ok(());
    }

    let (cfg, config_path) = if let Some(ref path) = cli.config {
        let cfg = ServerConfig::load_from_file(path)?;
        (cfg, Some(path.clone()))
    } else {
        ServerConfig::load_from_default_paths()?
    };
    cfg.validate()
        .map_err(|e| format!("Invalid server configuration: {}", e))?;

    init_logging(cfg.general.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let service = cli
        .service
        .clone()
        .or_else(|| cfg.tuner.initial_service.clone())
        .map(ChannelId::new);
    info!(
        "Starting dab-server (service: {})",
        service.as_ref().map(ChannelId::as_str).unwrap_or("none")
    );

    let ledger = open_ledger(&cfg);
    let simulated = Arc::new(SimulatedTuner::from_config(&cfg.tuner));
    let tuner: Arc<dyn Tuner> = simulated.clone();
    let sink: Arc<dyn HistorySink> = ledger.clone();
    let settings = EngineSettings {
        config: cfg.announcements.clone(),
        service,
        retune_timeout: cfg.tuner.retune_timeout(),
        queue_capacity: ENGINE_QUEUE_CAPACITY,
    };
    let engine = SwitchEngine::new(settings, tuner, sink)?;
    let (handle, engine_task) = spawn_engine(engine);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut listener_task = None;
    if cfg.listen.enabled {
        let listen_ip = cli.listen.unwrap_or(cfg.listen.listen);
        let listen_port = cli.port.unwrap_or(cfg.listen.port);
        let addr = SocketAddr::from((listen_ip, listen_port));
        let tokens: HashSet<String> = cfg.listen.auth.tokens.iter().cloned().collect();
        let ctx = ControlContext {
            engine: handle.clone(),
            ledger: ledger.clone(),
        };
        listener_task = Some(tokio::spawn(async move {
            if let Err(e) = listener::run_listener(addr, ctx, tokens, shutdown_rx).await {
                error!("Listener error: {:?}", e);
            }
        }));
    }

    signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down");
    let _ = shutdown_tx.send(true);

    // Anything still on air is recorded before the engine goes away.
    let auto_clear = handle.status().config.auto_clear_on_exit;
    if let Err(e) = handle.clear_all().await {
        warn!("Could not abandon active announcement: {}", e);
    }
    drop(handle);

    if let Some(task) = listener_task {
        let _ = task.await;
    }
    if tokio::time::timeout(SHUTDOWN_GRACE, engine_task).await.is_err() {
        warn!("Switching engine did not stop in time");
    }
    if let Some(channel) = simulated.current() {
        info!("Receiver left on {}", channel);
    }

    let result = if auto_clear {
        info!("Clearing announcement history on exit");
        ledger.clear()
    } else {
        ledger.persist()
    };
    if let Err(e) = result {
        error!("History shutdown failed: {}", e);
    }
    Ok(())
}
