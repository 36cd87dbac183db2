//! camserve - camera control over HTTP.
//!
//! Serves a live MJPEG view of one camera, takes stills and short clips on
//! request or on a cron schedule, and manages the captured files.

pub mod camera;
pub mod capture;
pub mod config;
pub mod encoder;
pub mod media;
pub mod recorder;
pub mod routes;
pub mod schedule;
pub mod stream;
pub mod utils;

use anyhow::Context;
use camera::{CameraDevice, CameraSettingsManager};
use capture::FrameSource;
use config::AppConfig;
use encoder::VideoEncoder;
use media::MediaStore;
use recorder::{RecordingCoordinator, RecordingTracker};
use routes::AppState;
use schedule::{CronTable, FileCrontab, ScheduleStore, UserCrontab};
use std::sync::Arc;
use std::time::Instant;
use stream::StreamBroadcaster;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utils::error::AppResult;

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(log_level: Option<&str>) {
    let default = log_level.unwrap_or("camserve=debug,camserve_lib=debug,tower_http=info");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wire the services around a frame source and an encoder chain.
///
/// Nothing is started: the caller spawns the stream producer.
pub fn build_state(
    config: &AppConfig,
    source: Box<dyn FrameSource>,
    encoder: VideoEncoder,
) -> AppResult<AppState> {
    let initial = config.default_settings()?;
    let device = CameraDevice::new(source, initial);
    let tracker = RecordingTracker::default();

    let settings = CameraSettingsManager::new(
        config.presets(),
        device.clone(),
        tracker.clone(),
        initial,
    );

    let media = Arc::new(MediaStore::open(&config.media.root)?);

    let recorder = RecordingCoordinator::new(device.clone(), Arc::new(encoder), media.clone(), tracker)
        .with_picture_quality(config.capture.picture_quality)
        .with_max_video_secs(config.max_video_secs())
        .with_recording_settings(config.recording_settings()?);

    let stream = StreamBroadcaster::new(device, config.stream.jpeg_quality, config.stream.queue_depth);

    let schedules = if config.schedule.enabled {
        let table: Box<dyn CronTable> = match &config.schedule.crontab_file {
            Some(path) => Box::new(FileCrontab::new(path)),
            None => Box::new(UserCrontab::new()),
        };
        Some(Arc::new(ScheduleStore::new(table, config.trigger_base_url())))
    } else {
        tracing::info!("Scheduling disabled");
        None
    };

    Ok(AppState {
        settings,
        recorder: Arc::new(recorder),
        stream: Arc::new(stream),
        media,
        schedules,
        default_video_secs: config.capture.default_video_secs,
        debug_mode: config.debug_mode,
        started_at: Instant::now(),
    })
}

/// Run the service until SIGINT or SIGTERM
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("Starting camserve v{}", env!("CARGO_PKG_VERSION"));

    let source = capture::create_source(
        config.debug_mode,
        config.camera.device_index,
        config.camera.simulated_realtime,
    )?;
    let encoder = VideoEncoder::default_chain(&config.capture.ffmpeg_path, config.stream.jpeg_quality);
    tracing::info!("Video backends: {}", encoder.backend_names().join(", "));

    let state = build_state(&config, source, encoder).context("Failed to initialize services")?;
    state.settings.initialize().await;

    let broadcaster = state.stream.clone();
    let producer = broadcaster.spawn();

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on http://{}", addr);

    let app = routes::router(state);
    let stopping = broadcaster.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Live views never finish on their own
            stopping.shutdown();
        })
        .await
        .context("Server error")?;

    broadcaster.shutdown();
    if let Err(e) = producer.await {
        tracing::warn!("Stream producer ended abnormally: {}", e);
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT, shutting down...");
        }
        _ = terminate() => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
