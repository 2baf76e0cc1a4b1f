//! framecast: stream camera frames to a WebSocket endpoint

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use color_eyre::Result;
use framecast::capture::DeviceSources;
use framecast::pipeline::{Shutdown, Supervisor};
use framecast::transport::WebSocketConnector;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter};

const DEFAULT_CONFIG_PATH: &str = "framecast.toml";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = framecast::load_config(&config_path)?;

    // RUST_LOG pins the filter; otherwise it follows `debug` across reloads.
    let env_filter = EnvFilter::try_from_default_env().ok();
    let follows_config = env_filter.is_none();
    let (filter, log_handle) = reload::Layer::new(
        env_filter.unwrap_or_else(|| EnvFilter::new(config.log_directive())),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_timer(fmt::time::uptime()))
        .init();

    info!("framecast launching, config {}", config_path.display());

    let shared = Arc::new(ArcSwap::from_pointee(config));
    let shutdown = Shutdown::new();

    let supervisor = Supervisor::new(
        Arc::clone(&shared),
        DeviceSources,
        Arc::new(WebSocketConnector),
        shutdown.clone(),
    );
    let mut pipeline = tokio::task::spawn_blocking(move || supervisor.run());

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                break;
            }
            _ = terminate.recv() => {
                info!("SIGTERM received, shutting down");
                break;
            }
            _ = hangup.recv() => {
                match framecast::load_config(&config_path) {
                    Ok(config) => {
                        if follows_config {
                            if let Err(e) = log_handle.reload(EnvFilter::new(config.log_directive())) {
                                warn!("Log filter reload failed: {}", e);
                            }
                        }
                        info!("Configuration reloaded; applies from the next generation");
                        shared.store(Arc::new(config));
                    }
                    Err(e) => warn!("Configuration reload failed, keeping current: {}", e),
                }
            }
            res = &mut pipeline => {
                // Only returns after shutdown; anything else is a panic.
                if let Err(e) = res {
                    error!("Supervisor terminated: {}", e);
                    return Err(e.into());
                }
                return Ok(());
            }
        }
    }

    shutdown.trigger();
    // The current capture blocks on the source only until the next frame.
    let generations = pipeline.await?;
    info!(generations, "framecast shutting down");
    Ok(())
}
