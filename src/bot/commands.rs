use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        skip_command(),
        pause_command(),
        queue_command(),
        nowplaying_command(),
        stop_command(),
        disconnect_command(),
        clearqueue_command(),
        queueshift_command(),
        ping_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción de YouTube")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta la canción actual")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa o reanuda la reproducción")
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("np").description("Muestra la canción actual con su progreso")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la música y sale del canal")
}

fn disconnect_command() -> CreateCommand {
    CreateCommand::new("disconnect").description("Desconecta el bot del canal de voz")
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Muestra la cola de reproducción")
}

fn clearqueue_command() -> CreateCommand {
    CreateCommand::new("clearqueue").description("Limpia la cola sin cortar lo que suena")
}

fn queueshift_command() -> CreateCommand {
    CreateCommand::new("queueshift")
        .description("Mueve una canción a otra posición de la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "from", "Posición actual")
                .required(true)
                .min_int_value(1),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "to", "Nueva posición")
                .required(true)
                .min_int_value(1),
        )
}

// Utilidad

fn ping_command() -> CreateCommand {
    CreateCommand::new("ping").description("Comprueba que el bot responde")
}
