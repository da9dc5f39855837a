use std::{net::SocketAddr, sync::Arc};

use guildbeat::{
    audio::{FfmpegSource, FrameFormat},
    common::{
        AnyResult,
        banner::{BuildInfo, print_banner},
        logger,
    },
    configs::Config,
    gateway::UdpTransport,
    player::SessionDeps,
    server::{AppState, SessionRegistry},
    transport,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Capacity of the engine event fan-out; slow subscribers skip ahead.
const EVENT_BUFFER: usize = 1024;

#[tokio::main]
async fn main() -> AnyResult<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    logger::init(config.logging.as_ref());
    print_banner(&BuildInfo::default(), &config);

    match &config.loaded_from {
        Some(path) => info!("Loaded configuration from {}", path),
        None => warn!("No config.toml found, using built-in defaults"),
    }

    let format = FrameFormat::new(config.player.frame_duration_ms);
    let (events, _) = tokio::sync::broadcast::channel(EVENT_BUFFER);
    let deps = SessionDeps {
        config: Arc::new(config.player.clone()),
        source: Arc::new(FfmpegSource::new(config.source.clone())),
        transport: Arc::new(UdpTransport::new(&config.transport, format)),
        events,
    };
    info!(
        "Frames of {} ms ({} bytes) to voice relay {}",
        format.duration_ms(),
        format.byte_len(),
        config.transport.endpoint
    );

    let registry = Arc::new(SessionRegistry::new(deps));
    let reaper_cancel = CancellationToken::new();
    let reaper = registry.spawn_reaper(reaper_cancel.clone());

    let address: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = Arc::new(AppState::new(registry.clone(), config));
    let app = transport::http_server::router(state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("Guildbeat listening on {}", address);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("HTTP server error: {}", e);
    }

    reaper_cancel.cancel();
    if let Err(e) = reaper.await {
        warn!("Reaper task ended abnormally: {}", e);
    }
    registry.shutdown_all().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
    }
}
