//! # Bot Module
//!
//! Discord front-end for Guild Player.
//!
//! [`MusicBot`] implements Serenity's [`EventHandler`] trait and translates
//! interactions into calls on the [`PlaybackDriver`]. It holds no playback
//! state of its own:
//!
//! - Slash commands and buttons go to [`handlers`]
//! - Voice connections are owned by the shared [`Songbird`] manager
//! - A bot-side voice disconnect is treated as `/stop`

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
    gateway::ShardManager,
    prelude::TypeMapKey,
};
use songbird::Songbird;
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{player::PlaybackDriver, voice::SongbirdTransport},
    config::Config,
};

/// `ShardManager` del cliente en `ctx.data`, para la latencia de `/ping`
pub struct ShardManagerContainer;

impl TypeMapKey for ShardManagerContainer {
    type Value = Arc<ShardManager>;
}

pub struct MusicBot {
    config: Arc<Config>,
    pub driver: Arc<PlaybackDriver<SongbirdTransport>>,
    pub songbird: Arc<Songbird>,
}

impl MusicBot {
    pub fn new(
        config: Config,
        driver: Arc<PlaybackDriver<SongbirdTransport>>,
        songbird: Arc<Songbird>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            driver,
            songbird,
        }
    }

    /// Registra los comandos slash.
    ///
    /// Con `GUILD_ID` se registran solo en esa guild (propagación inmediata),
    /// si no, globalmente.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Conecta el bot a un canal de voz
    pub async fn join_voice_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        match self.songbird.join(guild_id, channel_id).await {
            Ok(_call) => {
                info!("🔊 Conectado al canal de voz en guild {}", guild_id);
                Ok(())
            }
            Err(e) => {
                error!("Error al obtener handler de voz: {:?}", e);
                Err(anyhow::anyhow!("Error al conectar al canal de voz"))
            }
        }
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Si el bot sale del canal de voz (expulsado o desconectado) la sesión termina
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            self.driver.stop(guild_id).await;
        }
    }
}
