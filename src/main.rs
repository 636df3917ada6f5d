use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod storage;
mod ui;

use crate::audio::{
    player::PlaybackDriver, queue::GuildQueue, registry::SessionRegistry,
    voice::SongbirdTransport,
};
use crate::bot::{MusicBot, ShardManagerContainer};
use crate::config::Config;
use crate::sources::YouTubeClient;
use crate::storage::{JsonStorage, QueueWriter};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_player=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Guild Player v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    // Colas persistidas; lo que sonaba al caer el proceso vuelve al frente
    let storage = Arc::new(JsonStorage::new(config.data_dir.clone()).await?);
    let writer = QueueWriter::spawn(Arc::clone(&storage));
    let queue = Arc::new(GuildQueue::new(writer.clone(), config.max_queue_size));
    let saved = storage.load_all_queues().await;
    info!("💾 {} colas restauradas", saved.len());
    queue.restore(saved);

    let songbird = Songbird::serenity();
    let transport = Arc::new(SongbirdTransport::new(
        Arc::clone(&songbird),
        reqwest::Client::new(),
        config.default_volume,
    ));
    let resolver = Arc::new(YouTubeClient::new(
        config.ytdlp_path.clone(),
        config.search_timeout(),
    ));
    let driver = Arc::new(PlaybackDriver::new(
        queue,
        Arc::new(SessionRegistry::new()),
        transport,
        resolver,
    ));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = MusicBot::new(config.clone(), driver, Arc::clone(&songbird));

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    client
        .data
        .write()
        .await
        .insert::<ShardManagerContainer>(Arc::clone(&client.shard_manager));

    // Manejar shutdown graceful: vaciar escrituras pendientes antes de salir
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Error al registrar Ctrl+C");
        info!("⚠️ Señal de shutdown recibida, guardando colas...");
        writer.flush().await;
        std::process::exit(0);
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
