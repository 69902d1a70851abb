//! Capa de Discord: registro de comandos, dispatch de interacciones y
//! seguimiento de estados de voz.
//!
//! Toda la lógica de reproducción vive en [`crate::audio`]; acá solo se
//! traducen interacciones a operaciones del player y se vigila el canal
//! de voz para la salida por abandono.

use anyhow::{Context as _, Result};
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info};

pub mod commands;
pub mod handlers;

use crate::{
    audio::player::GuildMusicPlayer, config::Config, error::MusicError,
    registry::MusicSessionRegistry, sources::TrackResolver,
};

/// Handler principal del bot.
pub struct OrpheusBot {
    config: Arc<Config>,
    pub registry: Arc<MusicSessionRegistry>,
    pub resolver: Arc<TrackResolver>,
}

impl OrpheusBot {
    pub fn new(config: Arc<Config>) -> Self {
        let resolver = Arc::new(TrackResolver::new(&config));
        Self {
            config,
            registry: Arc::new(MusicSessionRegistry::new()),
            resolver,
        }
    }

    /// Registra los comandos: en una guild de desarrollo si está
    /// configurada, globales si no.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        match self.config.guild_id {
            Some(guild_id) => {
                info!("📝 Registrando comandos en guild de desarrollo {}", guild_id);
                commands::register_guild_commands(ctx, GuildId::new(guild_id)).await
            }
            None => {
                info!("📝 Registrando comandos globales");
                commands::register_global_commands(ctx).await
            }
        }
    }

    /// Player del guild, conectando uno nuevo si no hay. Devuelve además
    /// si el player se creó en esta llamada (para ofrecer la cola
    /// guardada una sola vez).
    ///
    /// La guarda por guild evita que dos comandos concurrentes conecten
    /// dos veces.
    pub async fn ensure_player(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
    ) -> Result<(Arc<GuildMusicPlayer>, bool)> {
        if let Some(player) = self.registry.player(guild_id) {
            return Ok((player, false));
        }

        let guard = self.registry.connect_guard(guild_id);
        let _guard = guard.lock().await;

        // Otro comando pudo habernos ganado la guarda.
        if let Some(player) = self.registry.player(guild_id) {
            return Ok((player, false));
        }

        let saved = self.registry.take_saved_queue(guild_id);

        let manager = songbird::get(ctx)
            .await
            .context("Songbird no inicializado")?;

        let player = GuildMusicPlayer::connect(
            manager,
            ctx.http.clone(),
            self.registry.clone(),
            &self.config,
            guild_id,
            voice_channel,
            text_channel,
        )
        .await
        .map_err(|e: MusicError| anyhow::anyhow!(e))?;

        if let Some(saved) = saved {
            player.stash_resume(saved.tracks);
        }

        Ok((player, true))
    }

    /// Cuenta cuánta gente (sin contar al bot) queda en el canal de voz
    /// del player y programa o cancela la salida por abandono.
    fn check_alone(&self, ctx: &Context, guild_id: GuildId) {
        let Some(player) = self.registry.player(guild_id) else {
            return;
        };
        let voice_channel = player.voice_channel();
        let bot_id = ctx.cache.current_user().id;

        let others = {
            let Some(guild) = ctx.cache.guild(guild_id) else {
                return;
            };
            guild
                .voice_states
                .values()
                .filter(|vs| vs.channel_id == Some(voice_channel) && vs.user_id != bot_id)
                .count()
        };

        if others == 0 {
            player.schedule_alone_departure();
        } else {
            player.cancel_alone_departure();
        }
    }
}

#[async_trait]
impl EventHandler for OrpheusBot {
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

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id.or_else(|| old.as_ref().and_then(|o| o.guild_id))
        else {
            return;
        };

        // Las desconexiones del propio bot las maneja el watcher del
        // driver; acá solo interesa quién queda en el canal.
        if new.user_id == ctx.cache.current_user().id {
            debug!("🔌 Cambio de estado de voz del bot en guild {}", guild_id);
            return;
        }

        self.check_alone(&ctx, guild_id);
    }
}
