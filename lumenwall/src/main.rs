//! Process entry point: loads configuration, wires the bus coordinator,
//! vault, and download scheduler, spins up the dedicated render thread, and
//! waits for a shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use lumenwall_config::AppConfig;
use lumenwall_core::{BusCoordinator, PlaybackSink, Scheduler, SchedulerConfig, Vault};
use lumenwall_model::{ChannelId, StorageKey};
use lumenwall_render::{BorderColor, DisplayEngine};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Bridges scheduler events into playback. The GUI toolkit and the real
/// panel driver are external collaborators out of scope for this crate;
/// this logs the handoff points a full playback coordinator would act on.
struct LoggingPlaybackSink;

#[async_trait]
impl PlaybackSink for LoggingPlaybackSink {
    async fn on_download_complete(&self, channel: &ChannelId, key: &StorageKey) {
        info!(%channel, %key, "new asset available for playback");
    }

    async fn trigger_initial_playback(&self) {
        info!("triggering initial playback");
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let (config, source) = AppConfig::load_from_env().context("loading configuration")?;
    info!(?source, catalog_host = %config.catalog_host, "configuration loaded");

    let channels = config
        .channel_ids()
        .context("validating configured channels")?;

    tokio::fs::create_dir_all(&config.vault_root)
        .await
        .with_context(|| format!("creating vault root {:?}", config.vault_root))?;

    let vault = Vault::new(config.vault_root.clone());
    let bus = Arc::new(BusCoordinator::new());
    let scheduler_config = SchedulerConfig {
        catalog_host: config.catalog_host.clone(),
        bus_acquire_ceiling: Duration::from_secs(config.bus_acquire_ceiling_secs),
        cache_limit: config.cache_limit,
    };
    let scheduler = Arc::new(
        Scheduler::new(vault, bus, scheduler_config, Arc::new(LoggingPlaybackSink))
            .context("building scheduler")?,
    );
    scheduler.set_channels(channels).await;
    scheduler.set_network_ready(true);
    scheduler.set_storage_mounted(true);

    let scheduler_handle = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            scheduler.run().await;
        })
    };

    let render_rotation = lumenwall_model::Rotation::from_degrees(config.rotation_degrees)
        .unwrap_or_default();
    let render_background = BorderColor::from_rgb(
        config.background_color.r,
        config.background_color.g,
        config.background_color.b,
    );
    let render_handle = std::thread::Builder::new()
        .name("lumenwall-render".to_string())
        .spawn(move || run_render_thread(render_rotation, render_background))
        .context("spawning render thread")?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");

    scheduler_handle.abort();
    if let Err(err) = render_handle.join() {
        warn!(?err, "render thread panicked during shutdown");
    }

    Ok(())
}

/// The dedicated OS thread for decode/upscale/display, kept off the Tokio
/// runtime so CPU-bound render work never competes with the download
/// worker's executor threads. The real frame loop lives in
/// `lumenwall-render`; this wiring owns only the display engine's
/// lifecycle, rotation, and border background, which every
/// `compose_scaled_frame` call the frame producer makes reads back from
/// here.
fn run_render_thread(rotation: lumenwall_model::Rotation, background: BorderColor) {
    let engine = match DisplayEngine::new(3) {
        Ok(engine) => engine,
        Err(err) => {
            warn!(%err, "failed to initialize display engine");
            return;
        }
    };
    engine.set_rotation(rotation);
    engine.set_background(background);
    info!(buffers = engine.buffer_count(), ?rotation, "render thread ready");
}
