use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        join_command(),
        leave_command(),
        skip_command(),
        pause_command(),
        resume_command(),
        queue_command(),
        nowplaying_command(),
        shuffle_command(),
        loop_command(),
        remove_command(),
        clear_command(),
        help_command(),
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

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción, playlist o búsqueda")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL (YouTube/Spotify) o término de búsqueda",
            )
            .required(true),
        )
}

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Me uno a tu canal de voz")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Me voy del canal de voz")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta la canción actual")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Muestra la cola de reproducción")
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra qué está sonando")
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle")
        .description("Activa o desactiva el modo aleatorio")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "modo", "on u off")
                .required(true)
                .add_string_choice("on", "on")
                .add_string_choice("off", "off"),
        )
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Cambia el modo de repetición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "modo", "off, track o queue")
                .required(true)
                .add_string_choice("off", "off")
                .add_string_choice("track", "track")
                .add_string_choice("queue", "queue"),
        )
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Saca una canción de la cola")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "posicion",
                "Número de la canción en la cola (desde 1)",
            )
            .required(true)
            .min_int_value(1),
        )
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Vacía la cola de reproducción")
}

fn help_command() -> CreateCommand {
    CreateCommand::new("help").description("Muestra los comandos disponibles")
}
