use anyhow::Result;
use serenity::{
    all::{CommandInteraction, ComponentInteraction, Context},
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::id::{ChannelId, GuildId, UserId},
};
use tracing::info;

use crate::audio::queue::LoopMode;
use crate::bot::OrpheusBot;
use crate::sources::{ResolvedBatch, Resolution};
use crate::ui::{buttons, buttons::button_ids, embeds};

/// Dispatch de comandos slash.
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &OrpheusBot,
) -> Result<()> {
    let Some(_) = command.guild_id else {
        return respond(ctx, &command, embeds::notice("Esto solo funciona en servidores")).await;
    };

    match command.data.name.as_str() {
        "play" => handle_play(ctx, command, bot).await,
        "join" => handle_join(ctx, command, bot).await,
        "leave" => handle_leave(ctx, command, bot).await,
        "skip" => handle_skip(ctx, command, bot).await,
        "pause" => handle_pause(ctx, command, bot).await,
        "resume" => handle_resume(ctx, command, bot).await,
        "queue" => handle_queue(ctx, command, bot).await,
        "nowplaying" => handle_nowplaying(ctx, command, bot).await,
        "shuffle" => handle_shuffle(ctx, command, bot).await,
        "loop" => handle_loop(ctx, command, bot).await,
        "remove" => handle_remove(ctx, command, bot).await,
        "clear" => handle_clear(ctx, command, bot).await,
        "help" => respond(ctx, &command, embeds::help()).await,
        _ => respond(ctx, &command, embeds::notice("❌ Comando no reconocido")).await,
    }
}

/// Dispatch de botones (oferta de continuar una cola guardada).
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &OrpheusBot,
) -> Result<()> {
    let Some(guild_id) = component.guild_id else {
        return Ok(());
    };

    match component.data.custom_id.as_str() {
        button_ids::RESUME_ACCEPT => {
            let Some(player) = bot.registry.player(guild_id) else {
                return update_message(ctx, &component, embeds::notice("La sesión ya no existe"))
                    .await;
            };

            match player.take_pending_resume() {
                Some(tracks) => {
                    info!("▶️ Continuando cola guardada en guild {}", guild_id);
                    let confirmation = player
                        .enqueue_batch(ResolvedBatch {
                            tracks,
                            failed_count: 0,
                            name: "Cola guardada".to_string(),
                        })
                        .await;
                    update_message(ctx, &component, confirmation).await
                }
                None => {
                    update_message(ctx, &component, embeds::notice("Ya no hay cola guardada"))
                        .await
                }
            }
        }
        button_ids::RESUME_DECLINE => {
            if let Some(player) = bot.registry.player(guild_id) {
                player.take_pending_resume();
            }
            update_message(ctx, &component, embeds::success("Ok, empezamos de cero 🗑️")).await
        }
        _ => {
            update_message(ctx, &component, embeds::notice("❌ Acción no reconocida")).await
        }
    }
}

// Handlers específicos para cada comando

async fn handle_play(ctx: &Context, command: CommandInteraction, bot: &OrpheusBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
        .to_string();

    // Defer: resolver y conectar pueden tardar.
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let voice_channel = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel) => channel,
        Err(_) => {
            return edit_response(
                ctx,
                &command,
                embeds::notice("Debes estar en un canal de voz 🔊"),
            )
            .await;
        }
    };

    let (player, created) = match bot
        .ensure_player(ctx, guild_id, voice_channel, command.channel_id)
        .await
    {
        Ok(result) => result,
        Err(e) => {
            return edit_response(ctx, &command, embeds::notice(&format!("❌ {}", e))).await;
        }
    };

    // La respuesta de la interacción la ocupa la confirmación del track,
    // así que el aviso de entrada y la oferta de cola guardada van como
    // mensajes aparte.
    if created {
        announce_join(ctx, command.channel_id, voice_channel).await;
        offer_saved_queue(ctx, command.channel_id, &player).await;
    }

    let confirmation = match bot.resolver.resolve(&query, command.user.id).await {
        Ok(Resolution::Single(track)) => player.enqueue(track).await,
        Ok(Resolution::Batch(batch)) => player.enqueue_batch(batch).await,
        Err(e) => embeds::notice(&e.to_string()),
    };

    edit_response(ctx, &command, confirmation).await
}

async fn handle_join(ctx: &Context, command: CommandInteraction, bot: &OrpheusBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    let voice_channel = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel) => channel,
        Err(_) => {
            return respond(ctx, &command, embeds::notice("Debes estar en un canal de voz 🔊"))
                .await;
        }
    };

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let player = match bot
        .ensure_player(ctx, guild_id, voice_channel, command.channel_id)
        .await
    {
        Ok((player, _)) => player,
        Err(e) => {
            return edit_response(ctx, &command, embeds::notice(&format!("❌ {}", e))).await;
        }
    };

    // La oferta de continuar la cola guardada viaja en la respuesta.
    if let Some((count, duration)) = player.pending_resume_summary() {
        command
            .edit_response(
                &ctx.http,
                EditInteractionResponse::new()
                    .embed(embeds::resume_prompt(count, duration))
                    .components(buttons::resume_controls()),
            )
            .await?;
        return Ok(());
    }

    edit_response(ctx, &command, embeds::connected(voice_channel)).await
}

async fn handle_leave(ctx: &Context, command: CommandInteraction, bot: &OrpheusBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    let Some(player) = bot.registry.player(guild_id) else {
        return respond(ctx, &command, embeds::notice("No estoy en ningún canal de voz")).await;
    };

    player.leave().await;
    respond(ctx, &command, embeds::farewell()).await
}

async fn handle_skip(ctx: &Context, command: CommandInteraction, bot: &OrpheusBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    let Some(player) = bot.registry.player(guild_id) else {
        return respond(ctx, &command, embeds::notice("No estoy en ningún canal de voz")).await;
    };

    match player.skip().await {
        Ok(()) => respond(ctx, &command, embeds::success("⏭️ Canción saltada")).await,
        Err(e) => respond(ctx, &command, embeds::notice(&e.to_string())).await,
    }
}

async fn handle_pause(ctx: &Context, command: CommandInteraction, bot: &OrpheusBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    let Some(player) = bot.registry.player(guild_id) else {
        return respond(ctx, &command, embeds::notice("No estoy en ningún canal de voz")).await;
    };

    match player.pause() {
        Ok(()) => respond(ctx, &command, embeds::success("⏸️ Reproducción pausada")).await,
        Err(e) => respond(ctx, &command, embeds::notice(&e.to_string())).await,
    }
}

async fn handle_resume(ctx: &Context, command: CommandInteraction, bot: &OrpheusBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    let Some(player) = bot.registry.player(guild_id) else {
        return respond(ctx, &command, embeds::notice("No estoy en ningún canal de voz")).await;
    };

    match player.resume() {
        Ok(()) => respond(ctx, &command, embeds::success("▶️ Reproducción reanudada")).await,
        Err(e) => respond(ctx, &command, embeds::notice(&e.to_string())).await,
    }
}

async fn handle_queue(ctx: &Context, command: CommandInteraction, bot: &OrpheusBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    let Some(player) = bot.registry.player(guild_id) else {
        // Sin sesión activa puede haber una cola guardada esperando.
        if let Some(saved) = bot.registry.saved_queue(guild_id) {
            return respond(
                ctx,
                &command,
                embeds::notice(&format!(
                    "No estoy conectado, pero quedó una cola guardada de {} canciones. Usa `/join` para continuarla.",
                    saved.tracks.len()
                )),
            )
            .await;
        }
        return respond(ctx, &command, embeds::notice("No estoy en ningún canal de voz")).await;
    };

    let current = player.current_track();
    let (tracks, total_duration, loop_mode, shuffle) = player.queue_view();

    respond(
        ctx,
        &command,
        embeds::queue_view(current.as_deref(), &tracks, total_duration, loop_mode, shuffle),
    )
    .await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: CommandInteraction,
    bot: &OrpheusBot,
) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    let current = bot
        .registry
        .player(guild_id)
        .and_then(|player| player.current_track());

    match current {
        Some(track) => respond(ctx, &command, embeds::now_playing(&track)).await,
        None => respond(ctx, &command, embeds::notice("No hay nada sonando")).await,
    }
}

async fn handle_shuffle(
    ctx: &Context,
    command: CommandInteraction,
    bot: &OrpheusBot,
) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let on = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "modo")
        .and_then(|opt| opt.value.as_str())
        .map(|mode| mode == "on")
        .unwrap_or(true);

    let Some(player) = bot.registry.player(guild_id) else {
        return respond(ctx, &command, embeds::notice("No estoy en ningún canal de voz")).await;
    };

    match player.set_shuffle(on) {
        Ok(()) => {
            let message = if on {
                "🔀 Modo aleatorio activado"
            } else {
                "➡️ Modo aleatorio desactivado"
            };
            respond(ctx, &command, embeds::success(message)).await
        }
        Err(e) => respond(ctx, &command, embeds::notice(&e.to_string())).await,
    }
}

async fn handle_loop(ctx: &Context, command: CommandInteraction, bot: &OrpheusBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let mode = match command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "modo")
        .and_then(|opt| opt.value.as_str())
    {
        Some("track") => LoopMode::Track,
        Some("queue") => LoopMode::Queue,
        _ => LoopMode::Off,
    };

    let Some(player) = bot.registry.player(guild_id) else {
        return respond(ctx, &command, embeds::notice("No estoy en ningún canal de voz")).await;
    };

    match player.set_loop(mode) {
        Ok(()) => {
            let message = match mode {
                LoopMode::Off => "➡️ Repetición desactivada",
                LoopMode::Track => "🔂 Repitiendo la canción actual",
                LoopMode::Queue => "🔁 Repitiendo toda la cola",
            };
            respond(ctx, &command, embeds::success(message)).await
        }
        Err(e) => respond(ctx, &command, embeds::notice(&e.to_string())).await,
    }
}

async fn handle_remove(ctx: &Context, command: CommandInteraction, bot: &OrpheusBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let position = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "posicion")
        .and_then(|opt| opt.value.as_i64())
        .unwrap_or(0)
        .max(0) as usize;

    let Some(player) = bot.registry.player(guild_id) else {
        return respond(ctx, &command, embeds::notice("No estoy en ningún canal de voz")).await;
    };

    match player.remove_at(position) {
        Ok(track) => {
            respond(
                ctx,
                &command,
                embeds::success(&format!("🗑️ **{}** fuera de la cola", track.title)),
            )
            .await
        }
        Err(e) => respond(ctx, &command, embeds::notice(&e.to_string())).await,
    }
}

async fn handle_clear(ctx: &Context, command: CommandInteraction, bot: &OrpheusBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    let Some(player) = bot.registry.player(guild_id) else {
        return respond(ctx, &command, embeds::notice("No estoy en ningún canal de voz")).await;
    };

    match player.clear_queue().await {
        Ok(removed) => {
            respond(
                ctx,
                &command,
                embeds::success(&format!("🗑️ {} canciones fuera de la cola", removed)),
            )
            .await
        }
        Err(e) => respond(ctx, &command, embeds::notice(&e.to_string())).await,
    }
}

// Funciones auxiliares

/// Aviso de entrada al canal cuando `/play` conecta de paso.
async fn announce_join(ctx: &Context, channel_id: ChannelId, voice_channel: ChannelId) {
    let _ = channel_id
        .send_message(
            &ctx.http,
            serenity::builder::CreateMessage::new().embed(embeds::connected(voice_channel)),
        )
        .await;
}

/// Publica la oferta de continuar la cola guardada como mensaje aparte
/// (el flujo de /play tiene su propia respuesta).
async fn offer_saved_queue(
    ctx: &Context,
    channel_id: ChannelId,
    player: &crate::audio::player::GuildMusicPlayer,
) {
    let Some((count, duration)) = player.pending_resume_summary() else {
        return;
    };

    let _ = channel_id
        .send_message(
            &ctx.http,
            serenity::builder::CreateMessage::new()
                .embed(embeds::resume_prompt(count, duration))
                .components(buttons::resume_controls()),
        )
        .await;
}

fn get_user_voice_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
) -> Result<ChannelId> {
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

async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embed),
            ),
        )
        .await?;

    Ok(())
}

async fn edit_response(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn update_message(
    ctx: &Context,
    component: &ComponentInteraction,
    embed: CreateEmbed,
) -> Result<()> {
    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::UpdateMessage(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .components(Vec::new()),
            ),
        )
        .await?;

    Ok(())
}
