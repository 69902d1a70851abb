use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
    model::id::ChannelId,
};
use std::time::Duration;

use crate::audio::queue::LoopMode;
use crate::audio::track::Track;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Orpheus";

/// Embed de "reproduciendo ahora".
pub fn now_playing(track: &Track) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Canal", track.uploader.clone(), true)
        .field("⏱️ Duración", format_track_duration(track), true)
        .field(
            "👤 Solicitado por",
            format!("<@{}>", track.requested_by),
            true,
        )
        .url(&track.url);

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Confirmación de canción agregada a la cola.
pub fn track_added(track: &Track, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("➕ Agregada a la Cola")
        .description(format!("**{}**", track.title))
        .color(colors::INFO_BLUE)
        .field("⏱️ Duración", format_track_duration(track), true)
        .field("📍 Posición", format!("#{}", position), true)
        .url(&track.url);

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Confirmación de playlist/album agregado, con cuenta de fallos.
pub fn batch_added(
    name: &str,
    added: usize,
    requested: usize,
    failed: usize,
    total_duration: Duration,
) -> CreateEmbed {
    let mut description = format!(
        "**{}**\n{} de {} canciones agregadas",
        name, added, requested
    );
    if failed > 0 {
        description.push_str(&format!("\n⚠️ {} no se pudieron resolver", failed));
    }

    CreateEmbed::default()
        .title("📋 Playlist Agregada")
        .description(description)
        .color(if failed > 0 {
            colors::WARNING_ORANGE
        } else {
            colors::INFO_BLUE
        })
        .field("⏱️ Duración total", format_duration(total_duration), true)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Aviso de entrada a un canal de voz.
pub fn connected(channel: ChannelId) -> CreateEmbed {
    CreateEmbed::default()
        .title("🔊 Conectado")
        .description(format!("Me uní a <#{}>", channel))
        .color(colors::SUCCESS_GREEN)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// La cola se terminó y no hay modo de repetición activo.
pub fn queue_exhausted() -> CreateEmbed {
    CreateEmbed::default()
        .title("🏁 Cola Terminada")
        .description("No quedan más canciones. ¡Agrega algo nuevo!")
        .color(colors::NEUTRAL_GRAY)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Despedida por leave explícito.
pub fn farewell() -> CreateEmbed {
    CreateEmbed::default()
        .title("👋 ¡Hasta luego!")
        .description("Me fui del canal de voz.")
        .color(colors::NEUTRAL_GRAY)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Despedida por quedarse solo. La cola quedó guardada.
pub fn farewell_alone() -> CreateEmbed {
    CreateEmbed::default()
        .title("👋 Me quedé solo")
        .description("Me fui del canal, pero guardé la cola por si quieren seguir después.")
        .color(colors::NEUTRAL_GRAY)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Un track falló al materializarse o a mitad de reproducción.
pub fn playback_failed(title: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error de Reproducción")
        .description(format!("No pude reproducir **{}**, sigo con la siguiente.", title))
        .color(colors::ERROR_RED)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Aviso genérico (rechazos, condiciones "nada que hacer").
pub fn notice(text: &str) -> CreateEmbed {
    CreateEmbed::default()
        .description(text.to_string())
        .color(colors::WARNING_ORANGE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Confirmación genérica.
pub fn success(text: &str) -> CreateEmbed {
    CreateEmbed::default()
        .description(text.to_string())
        .color(colors::SUCCESS_GREEN)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Vista de la cola: lo que suena, lo pendiente y las políticas activas.
pub fn queue_view(
    current: Option<&Track>,
    tracks: &[std::sync::Arc<Track>],
    total_duration: Duration,
    loop_mode: LoopMode,
    shuffle: bool,
) -> CreateEmbed {
    const MAX_LISTED: usize = 10;

    let mut description = String::new();

    match current {
        Some(track) => {
            description.push_str(&format!("**Sonando:** [{}]({})\n\n", track.title, track.url))
        }
        None => description.push_str("**Sonando:** nada\n\n"),
    }

    if tracks.is_empty() {
        description.push_str("La cola está vacía.");
    } else {
        for (i, track) in tracks.iter().take(MAX_LISTED).enumerate() {
            description.push_str(&format!(
                "`{}.` [{}]({}) · {}\n",
                i + 1,
                track.title,
                track.url,
                format_track_duration(track)
            ));
        }
        if tracks.len() > MAX_LISTED {
            description.push_str(&format!("... y {} más", tracks.len() - MAX_LISTED));
        }
    }

    CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .description(description)
        .color(colors::MUSIC_PURPLE)
        .field("🎶 Pendientes", tracks.len().to_string(), true)
        .field("⏱️ Duración total", format_duration(total_duration), true)
        .field(
            "⚙️ Modo",
            format!(
                "loop: {} · shuffle: {}",
                loop_mode.as_str(),
                if shuffle { "on" } else { "off" }
            ),
            true,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Oferta de continuar una cola guardada de una sesión anterior.
pub fn resume_prompt(track_count: usize, total_duration: Duration) -> CreateEmbed {
    CreateEmbed::default()
        .title("💾 Cola Guardada")
        .description(format!(
            "Quedó una cola de **{}** canciones ({}) de la última sesión. ¿Quieren continuarla?",
            track_count,
            format_duration(total_duration)
        ))
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Listado de comandos disponibles.
pub fn help() -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Comandos de Orpheus")
        .description(
            "`/play <query>` — reproduce una URL o busca en YouTube\n\
             `/join` — me uno a tu canal de voz\n\
             `/leave` — me voy del canal\n\
             `/skip` — salta la canción actual\n\
             `/pause` · `/resume` — pausa y reanuda\n\
             `/queue` — muestra la cola\n\
             `/nowplaying` — qué está sonando\n\
             `/shuffle <on|off>` — modo aleatorio\n\
             `/loop <off|track|queue>` — modo de repetición\n\
             `/remove <posición>` — saca una canción de la cola\n\
             `/clear` — vacía la cola",
        )
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn format_track_duration(track: &Track) -> String {
    if track.duration_secs == 0 {
        "🔴 En vivo".to_string()
    } else {
        format_duration(track.duration())
    }
}

/// Formatea una duración como `mm:ss` o `hh:mm:ss`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0:00");
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(75)), "1:15");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1:00:00");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }
}
