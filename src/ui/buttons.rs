use anyhow::Result;
use chrono::Utc;
use serenity::{
    all::{ButtonStyle, ComponentInteraction, Context},
    builder::{
        CreateActionRow, CreateButton, CreateInteractionResponse,
        CreateInteractionResponseMessage,
    },
};
use serenity::model::id::GuildId;
use tracing::debug;

use crate::{
    audio::player::PauseOutcome,
    bot::{handlers::user_message, MusicBot},
    ui::embeds,
};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PLAY_PAUSE: &str = "music_play_pause";
    pub const SKIP: &str = "music_skip";
    pub const STOP: &str = "music_stop";
    pub const QUEUE: &str = "music_queue";
}

/// Controles que acompañan al embed de `/np`
pub fn create_player_buttons(is_paused: bool) -> Vec<CreateActionRow> {
    let play_pause_emoji = if is_paused { '▶' } else { '⏸' };

    let play_pause_btn = CreateButton::new(button_ids::PLAY_PAUSE)
        .emoji(play_pause_emoji)
        .style(ButtonStyle::Primary);

    let skip_btn = CreateButton::new(button_ids::SKIP)
        .emoji('⏭')
        .style(ButtonStyle::Secondary);

    let stop_btn = CreateButton::new(button_ids::STOP)
        .emoji('⏹')
        .style(ButtonStyle::Danger);

    let queue_btn = CreateButton::new(button_ids::QUEUE)
        .label("Cola")
        .emoji('📋')
        .style(ButtonStyle::Secondary);

    vec![CreateActionRow::Buttons(vec![
        play_pause_btn,
        skip_btn,
        stop_btn,
        queue_btn,
    ])]
}

/// Manejador de interacciones con los controles del reproductor
pub async fn handle_music_component(
    ctx: &Context,
    interaction: &ComponentInteraction,
    guild_id: GuildId,
    bot: &MusicBot,
) -> Result<()> {
    let driver = &bot.driver;

    match interaction.data.custom_id.as_str() {
        button_ids::PLAY_PAUSE => match driver.pause_toggle(guild_id).await {
            Ok(outcome) => {
                let message = match outcome {
                    PauseOutcome::Paused => "⏸️ Música pausada",
                    PauseOutcome::Resumed => "▶️ Música reanudada",
                };
                respond_with_updated_now_playing(ctx, interaction, guild_id, bot, message).await?;
            }
            Err(e) => respond_ephemeral(ctx, interaction, &user_message(&e)).await?,
        },
        button_ids::SKIP => {
            let message = match driver.skip(guild_id).await {
                Ok(()) => "⏭️ Saltando a la siguiente canción".to_string(),
                Err(e) => user_message(&e),
            };
            respond_ephemeral(ctx, interaction, &message).await?;
        }
        button_ids::STOP => {
            driver.stop(guild_id).await;
            respond_ephemeral(ctx, interaction, "⏹️ Reproducción detenida").await?;
        }
        button_ids::QUEUE => {
            let embed = embeds::create_queue_embed(&driver.snapshot(guild_id), Utc::now());
            interaction
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .embed(embed)
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
        _ => {
            debug!("Componente no manejado: {}", interaction.data.custom_id);
            respond_ephemeral(ctx, interaction, "⚠️ Función no implementada").await?;
        }
    }

    Ok(())
}

async fn respond_ephemeral(
    ctx: &Context,
    interaction: &ComponentInteraction,
    content: &str,
) -> Result<()> {
    interaction
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

/// Actualiza el mensaje de `/np` y confirma la acción en privado
async fn respond_with_updated_now_playing(
    ctx: &Context,
    interaction: &ComponentInteraction,
    guild_id: GuildId,
    bot: &MusicBot,
    ephemeral_message: &str,
) -> Result<()> {
    let snapshot = bot.driver.snapshot(guild_id);
    let Some(now_playing) = snapshot.now_playing() else {
        return respond_ephemeral(ctx, interaction, ephemeral_message).await;
    };

    let embed = embeds::create_now_playing_embed(now_playing, Utc::now());
    interaction
        .create_response(
            &ctx.http,
            CreateInteractionResponse::UpdateMessage(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .components(create_player_buttons(now_playing.is_paused())),
            ),
        )
        .await?;

    interaction
        .create_followup(
            &ctx.http,
            serenity::builder::CreateInteractionResponseFollowup::new()
                .content(ephemeral_message)
                .ephemeral(true),
        )
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom_ids(rows: &[CreateActionRow]) -> Vec<String> {
        let json = serde_json::to_value(rows).unwrap();
        json[0]["components"]
            .as_array()
            .unwrap()
            .iter()
            .map(|button| button["custom_id"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn player_row_has_all_controls() {
        let rows = create_player_buttons(false);
        assert_eq!(
            custom_ids(&rows),
            vec![
                button_ids::PLAY_PAUSE,
                button_ids::SKIP,
                button_ids::STOP,
                button_ids::QUEUE
            ]
        );
    }

    #[test]
    fn play_pause_emoji_follows_state() {
        let paused = serde_json::to_value(create_player_buttons(true)).unwrap();
        let playing = serde_json::to_value(create_player_buttons(false)).unwrap();

        assert_eq!(paused[0]["components"][0]["emoji"]["name"], "▶");
        assert_eq!(playing[0]["components"][0]["emoji"]["name"], "⏸");
    }
}
