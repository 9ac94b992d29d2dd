use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
#[cfg(test)]
mod testing;
mod ui;

use crate::audio::{
    engine::{FallbackPolicy, PlaybackEngine},
    player::AudioPlayer,
    session::SessionManager,
    stream::{EnrichedStreams, YtDlpStreams},
};
use crate::bot::{events::ChannelNotifier, EncoreBot};
use crate::config::Config;
use crate::error::{looks_like_block, BlockFlag};
use crate::sources::{lyrics::LyricsClient, SourceManager, SourceResolver};
use crate::ui::notifications::NotificationGate;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("encore=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Encore v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    let block = Arc::new(BlockFlag::new(Duration::from_secs(config.block_cooldown_secs)));
    install_panic_hook(block.clone());

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .user_agent(concat!("encore/", env!("CARGO_PKG_VERSION")))
        .build()?;

    // Fuentes
    let sources = SourceManager::new(&config.ytdlp_path, http_client.clone());
    if let Err(e) = sources.verify_dependencies().await {
        warn!("⚠️ yt-dlp no disponible: {:#}", e);
    }
    let resolver = Arc::new(SourceResolver::new(Arc::new(sources), config.fallback_candidates));

    // Voz
    let manager = Songbird::serenity_from_config(
        songbird::Config::default()
            .gateway_timeout(Some(Duration::from_secs(config.connection_timeout_secs))),
    );
    // El programa vive lo mismo que el proceso
    let ytdlp_program: &'static str = Box::leak(config.ytdlp_path.clone().into_boxed_str());
    let streams = EnrichedStreams::new(YtDlpStreams::new(http_client.clone(), ytdlp_program));

    let (events_tx, events_rx) = flume::unbounded();
    let player = Arc::new(AudioPlayer::new(
        manager.clone(),
        Arc::new(streams),
        events_tx,
        config.default_volume,
        config.max_queue_size,
    ));

    // Motor de reproducción
    let http = Arc::new(Http::new(&config.discord_token));
    let notices = Arc::new(NotificationGate::new(Arc::new(ChannelNotifier::new(http))));
    let engine = Arc::new(PlaybackEngine::new(
        Arc::new(SessionManager::new()),
        resolver,
        player.clone(),
        notices,
        block,
        FallbackPolicy::from_config(&config),
    ));

    // Bucle de eventos del reproductor
    let event_engine = engine.clone();
    tokio::spawn(async move {
        while let Ok(event) = events_rx.recv_async().await {
            event_engine.dispatch(event).await;
        }
        info!("📭 Canal de eventos del reproductor cerrado");
    });

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = EncoreBot::new(
        config.clone(),
        engine,
        player,
        LyricsClient::new(http_client),
    );

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(manager)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

/// Los pánicos se registran; una firma de bloqueo activa el flag global
fn install_panic_hook(block: Arc<BlockFlag>) {
    std::panic::set_hook(Box::new(move |panic| {
        let message = panic
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.payload().downcast_ref::<String>().cloned())
            .unwrap_or_default();

        error!("💥 Pánico en {:?}: {}", panic.location(), message);
        if looks_like_block(&message) {
            block.trip(&message);
        }
    }));
}
