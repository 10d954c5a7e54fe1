//! Ramadan Lessons Player (rdl-player) - Main entry point
//!
//! Loads configuration, fetches the lesson list once, and serves the lesson
//! page and playback API until interrupted.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rdl_common::config::{load_config, TomlConfig};
use rdl_player::api::{self, AppContext};
use rdl_player::loader::{spawn_initial_load, LessonLoader};
use rdl_player::playback::{spawn_event_pump, MediaBackend, NullBackend, PlaybackManager};
use rdl_player::SharedState;
use tokio::signal;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for rdl-player
#[derive(Parser, Debug)]
#[command(name = "rdl-player")]
#[command(about = "Ramadan lessons player")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides config)
    #[arg(short, long, env = "RDL_PORT")]
    port: Option<u16>,

    /// Lessons API endpoint (overrides config)
    #[arg(short, long, env = "RDL_ENDPOINT")]
    endpoint: Option<String>,

    /// Config file path
    #[arg(short, long, env = "RDL_CONFIG")]
    config: Option<PathBuf>,

    /// Run without an audio device
    #[arg(long)]
    no_audio: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(endpoint) = args.endpoint.clone() {
        config.endpoint = endpoint;
    }
    let config = config.validate().context("Invalid configuration")?;

    init_tracing(&config);

    info!(
        "Starting rdl-player v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let state = Arc::new(SharedState::default());

    let backend = select_backend(&config, args.no_audio)?;
    let backend_name = backend.name();
    let (manager, media_events) = PlaybackManager::new(backend, state.event_bus());
    let manager = Arc::new(Mutex::new(manager));
    let pump = spawn_event_pump(Arc::clone(&manager), media_events);

    let cancel = CancellationToken::new();
    let loader = LessonLoader::from_config(&config).context("Failed to create lesson loader")?;
    info!("Lessons endpoint: {}", loader.endpoint());
    let load = spawn_initial_load(
        loader,
        Arc::clone(&state),
        Arc::clone(&manager),
        cancel.clone(),
    );

    let ip: IpAddr = config
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", config.bind_address))?;
    let addr = SocketAddr::new(ip, config.port);

    let ctx = AppContext {
        state,
        manager: Arc::clone(&manager),
        backend: backend_name,
    };
    let served = api::server::run(addr, ctx, shutdown_signal()).await;

    // Drop a still-pending fetch, then silence and release every handle
    cancel.cancel();
    load.abort();
    let mut released = Arc::clone(&manager).lock_owned().await;
    if let Err(e) = tokio::task::spawn_blocking(move || released.teardown()).await {
        warn!("Teardown failed: {}", e);
    }
    pump.abort();

    served.context("Server error")?;
    info!("Shutdown complete");
    Ok(())
}

/// `RUST_LOG` wins; otherwise the configured level applies to RDL crates
fn init_tracing(config: &TomlConfig) {
    let default_filter = format!(
        "rdl_player={level},rdl_common={level},tower_http=info",
        level = config.logging.level
    );

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(feature = "device")]
fn select_backend(config: &TomlConfig, no_audio: bool) -> Result<Arc<dyn MediaBackend>> {
    use rdl_player::audio::{DeviceBackend, DeviceSettings};

    if no_audio {
        info!("Audio disabled (--no-audio)");
        return Ok(Arc::new(NullBackend));
    }

    let backend = DeviceBackend::new(
        tokio::runtime::Handle::current(),
        DeviceSettings::from_config(config),
        config.request_timeout(),
    )
    .context("Failed to create audio backend")?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "device"))]
fn select_backend(_config: &TomlConfig, no_audio: bool) -> Result<Arc<dyn MediaBackend>> {
    if !no_audio {
        warn!("Built without the device feature; audio is disabled");
    }
    Ok(Arc::new(NullBackend))
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
