//! Sinkhole DNS proxy - Entry point.
//!
//! Loads the configuration and lists, binds the query port and relays
//! allowed queries upstream until Ctrl-C.

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use sinkhole::config::{Config, RelayMode};
use sinkhole::dns::{PendingRelay, Relay, UdpRelay};
use sinkhole::lists::ListStore;
use sinkhole::lists::manager::ListManager;
use sinkhole::network;
use sinkhole::server::{Dispatcher, run_server};
use sinkhole::status::spawn_status_task;

/// Spawn the periodic list reload task.
fn spawn_reload_task(
    manager: Arc<ListManager>,
    running: Arc<AtomicBool>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; lists were loaded at startup.
        ticker.tick().await;
        while running.load(Ordering::SeqCst) {
            ticker.tick().await;
            let sizes = manager.reload().await;
            debug!(
                blocklist = sizes.blocklist,
                whitelist = sizes.whitelist,
                keywords = sizes.keywords,
                "lists reloaded"
            );
        }
    })
}

/// Run the dispatcher over `relay` until shutdown.
async fn serve<R: Relay>(
    config: &Config,
    socket: Arc<UdpSocket>,
    store: ListStore,
    relay: R,
    running: Arc<AtomicBool>,
) {
    let dispatcher = Dispatcher::new(store, relay, &config.stats);

    let interface = config.interface.clone();
    let (mut status_rx, status_handle) = spawn_status_task(
        dispatcher.clone(),
        move || network::device_address(interface.as_deref()),
        config.status_interval(),
    );
    let status_logger = tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let line = status_rx.borrow_and_update().clone();
            debug!(status = %line.status, info = %line.info, "status");
        }
    });

    let server_running = Arc::clone(&running);
    let mut server_handle = tokio::spawn(run_server(
        socket,
        dispatcher.clone(),
        config.relay_mode,
        server_running,
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down...");
        }
        result = &mut server_handle => {
            match result {
                Ok(Err(err)) => error!("Server error: {err:?}"),
                Err(err) => error!("Server task failed: {err}"),
                Ok(Ok(())) => {}
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    server_handle.abort();
    status_handle.abort();
    status_logger.abort();

    match dispatcher.telemetry().to_json() {
        Ok(json) => info!(telemetry = %json, "final statistics"),
        Err(err) => error!("Failed to serialize telemetry: {err}"),
    }
}

async fn run() -> Result<()> {
    let config_path = std::env::var("CONFIG_PATH")
        .map(Cow::Owned)
        .unwrap_or(Cow::Borrowed("config.toml"));
    let config = Config::load(&*config_path).context("Failed to load configuration")?;

    // Initialize metrics (must be done early, before any metrics are recorded)
    sinkhole::metrics::init(&config.metrics).context("Failed to initialize metrics")?;
    if config.metrics.enabled {
        info!("Metrics enabled on {}", config.metrics.listen);
    }

    info!("Starting sinkhole DNS proxy...");
    info!("Upstream resolver: {}", config.upstream_resolver);
    info!("Relay mode: {:?}", config.relay_mode);

    let store = ListStore::default();
    let manager = Arc::new(ListManager::new(&config.lists, store.clone()));
    let sizes = manager.reload().await;
    info!(
        blocklist = sizes.blocklist,
        whitelist = sizes.whitelist,
        keywords = sizes.keywords,
        "Lists loaded"
    );

    let socket = UdpSocket::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    info!("Listening on {}", config.listen);

    let running = Arc::new(AtomicBool::new(true));
    let reload_handle = config
        .lists
        .reload_interval()
        .map(|interval| spawn_reload_task(Arc::clone(&manager), Arc::clone(&running), interval));

    let socket = Arc::new(socket);
    match config.relay_mode {
        RelayMode::Serial => {
            let relay = UdpRelay::new(config.upstream_resolver, config.upstream_timeout());
            serve(&config, socket, store, relay, running).await;
        }
        RelayMode::Concurrent => {
            let relay = PendingRelay::bind(config.upstream_resolver, config.upstream_timeout())
                .await
                .context("Failed to open upstream socket")?;
            serve(&config, socket, store, relay, running).await;
        }
    }

    if let Some(handle) = reload_handle {
        handle.abort();
    }

    info!("Shutdown complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    run().await
}
