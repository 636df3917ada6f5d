use anyhow::Result;
use chrono::Utc;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::time::Duration;
use tracing::{info, warn};

use crate::{
    audio::player::{PauseOutcome, PlayerState},
    bot::{MusicBot, ShardManagerContainer},
    error::PlaybackError,
    ui::{buttons, embeds},
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, guild_id, bot).await?,
        "skip" => handle_skip(ctx, &command, guild_id, bot).await?,
        "pause" => handle_pause(ctx, &command, guild_id, bot).await?,
        "queue" => handle_queue(ctx, &command, guild_id, bot).await?,
        "np" => handle_nowplaying(ctx, &command, guild_id, bot).await?,
        "stop" | "disconnect" => handle_disconnect(ctx, &command, guild_id, bot).await?,
        "clearqueue" => handle_clearqueue(ctx, &command, guild_id, bot).await?,
        "queueshift" => handle_queueshift(ctx, &command, guild_id, bot).await?,
        "ping" => handle_ping(ctx, &command, bot).await?,
        _ => reply_ephemeral(ctx, &command, "❌ Comando no reconocido").await?,
    }

    Ok(())
}

/// Maneja interacciones con componentes (botones)
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    buttons::handle_music_component(ctx, &component, guild_id, bot).await
}

/// Mensaje para el usuario de un error del núcleo
pub fn user_message(error: &PlaybackError) -> String {
    match error {
        PlaybackError::ResolutionFailure { .. } => "❌ No se encontró esa canción.".to_string(),
        PlaybackError::QueueFull { max } => {
            format!("❌ La cola está llena (máximo {} canciones).", max)
        }
        PlaybackError::OutOfRange { .. } => "❌ Posiciones inválidas.".to_string(),
        PlaybackError::NothingPlaying => "❌ No hay nada sonando.".to_string(),
        PlaybackError::NotConnected => "❌ No estoy conectado a un canal de voz.".to_string(),
        PlaybackError::AlreadyActive => "⚠️ Ya hay una sesión activa en este servidor.".to_string(),
        PlaybackError::StreamOpenFailure { .. }
        | PlaybackError::Transport(_)
        | PlaybackError::Empty => "⚠️ Ocurrió un error.".to_string(),
    }
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &MusicBot,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
        .to_string();

    // Verificar que el usuario esté en un canal de voz
    let voice_channel_id = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel_id) => channel_id,
        Err(_) => {
            return reply_ephemeral(ctx, command, "❌ Debes estar en un canal de voz.").await;
        }
    };

    // yt-dlp puede tardar más que el límite de respuesta de Discord
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    // entrar al canal solo cuando ya hay canción
    let connect = || async move {
        if bot.songbird.get(guild_id).is_some() {
            return Ok(());
        }
        bot.join_voice_channel(guild_id, voice_channel_id)
            .await
            .map_err(|e| {
                warn!("❌ No se pudo entrar al canal de voz: {:?}", e);
                PlaybackError::NotConnected
            })
    };

    let content = match bot
        .driver
        .enqueue(guild_id, &query, &command.user.name, connect)
        .await
    {
        Ok(track) => format!("✅ En cola: **{}**", track.title()),
        Err(PlaybackError::NotConnected) => "❌ No pude entrar a tu canal de voz.".to_string(),
        Err(e) => user_message(&e),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;

    Ok(())
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &MusicBot,
) -> Result<()> {
    let content = match bot.driver.skip(guild_id).await {
        Ok(()) => "⏭️ Saltado.".to_string(),
        Err(e) => user_message(&e),
    };

    reply(ctx, command, &content).await
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &MusicBot,
) -> Result<()> {
    let content = match bot.driver.pause_toggle(guild_id).await {
        Ok(PauseOutcome::Paused) => "⏸️ Pausado.".to_string(),
        Ok(PauseOutcome::Resumed) => "▶️ Reanudado.".to_string(),
        Err(e) => user_message(&e),
    };

    reply(ctx, command, &content).await
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &MusicBot,
) -> Result<()> {
    let snapshot = bot.driver.snapshot(guild_id);
    let embed = embeds::create_queue_embed(&snapshot, Utc::now());

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;

    Ok(())
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &MusicBot,
) -> Result<()> {
    let snapshot = bot.driver.snapshot(guild_id);
    let Some(now_playing) = snapshot.now_playing() else {
        let content = if bot.driver.state(guild_id).await == PlayerState::Loading {
            "⏳ Cargando la siguiente canción...".to_string()
        } else {
            user_message(&PlaybackError::NothingPlaying)
        };
        return reply(ctx, command, &content).await;
    };

    let embed = embeds::create_now_playing_embed(now_playing, Utc::now());
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .components(buttons::create_player_buttons(bot.driver.is_paused(guild_id))),
            ),
        )
        .await?;

    Ok(())
}

async fn handle_disconnect(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &MusicBot,
) -> Result<()> {
    let was_connected = bot.songbird.get(guild_id).is_some();
    bot.driver.stop(guild_id).await;

    let content = if was_connected {
        "👋 Desconectado.".to_string()
    } else {
        user_message(&PlaybackError::NotConnected)
    };

    reply(ctx, command, &content).await
}

async fn handle_clearqueue(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &MusicBot,
) -> Result<()> {
    let cleared = bot.driver.clear(guild_id);
    reply(ctx, command, &format!("🧹 Cola limpiada ({} canciones).", cleared)).await
}

async fn handle_queueshift(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &MusicBot,
) -> Result<()> {
    let position = |name: &str| {
        command
            .data
            .options
            .iter()
            .find(|opt| opt.name == name)
            .and_then(|opt| opt.value.as_i64())
            .map_or(0, |value| usize::try_from(value).unwrap_or(0))
    };
    let (from, to) = (position("from"), position("to"));

    let content = match bot.driver.move_track(guild_id, from, to) {
        Ok(track) => format!("↕️ Movida **{}** a la posición {}.", track.title(), to),
        Err(e) => user_message(&e),
    };

    reply(ctx, command, &content).await
}

async fn handle_ping(ctx: &Context, command: &CommandInteraction, bot: &MusicBot) -> Result<()> {
    let latency = gateway_latency(ctx).await;
    let content = ping_message(latency, bot.driver.active_sessions());
    reply_ephemeral(ctx, command, &content).await
}

/// Latencia del heartbeat del shard que recibió la interacción
async fn gateway_latency(ctx: &Context) -> Option<Duration> {
    let data = ctx.data.read().await;
    let shard_manager = data.get::<ShardManagerContainer>()?;
    let runners = shard_manager.runners.lock().await;
    runners.get(&ctx.shard_id).and_then(|runner| runner.latency)
}

fn ping_message(latency: Option<Duration>, sessions: usize) -> String {
    match latency {
        Some(latency) => format!(
            "🏓 Pong! {}ms • {} sesiones activas",
            latency.as_millis(),
            sessions
        ),
        // el primer heartbeat todavía no volvió
        None => format!("🏓 Pong! (latencia aún no medida) • {} sesiones activas", sessions),
    }
}

// Funciones auxiliares

async fn reply(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content(content),
            ),
        )
        .await?;

    Ok(())
}

async fn reply_ephemeral(
    ctx: &Context,
    command: &CommandInteraction,
    content: &str,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;

    Ok(())
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}
