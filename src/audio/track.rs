use anyhow::Result;
use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use songbird::input::{Input, YoutubeDl};
use std::time::Duration;

/// Descriptor inmutable de un item reproducible.
///
/// Se construye una sola vez en el resolver y después circula como
/// `Arc<Track>`: la cola lo posee, `looped_track` y el "now playing" solo
/// lo referencian.
#[derive(Debug, Clone)]
pub struct Track {
    pub url: String,
    pub title: String,
    pub thumbnail: Option<String>,
    /// Duración en segundos enteros (0 para streams en vivo).
    pub duration_secs: u64,
    pub uploader: String,
    pub uploader_url: Option<String>,
    pub requested_by: UserId,
    pub added_at: DateTime<Utc>,
}

impl Track {
    pub fn new(
        url: String,
        title: Option<String>,
        thumbnail: Option<String>,
        duration_secs: u64,
        uploader: Option<String>,
        uploader_url: Option<String>,
        requested_by: UserId,
    ) -> Self {
        Self {
            url,
            title: title.unwrap_or_else(|| "*Sin título*".to_string()),
            thumbnail,
            duration_secs,
            uploader: uploader.unwrap_or_else(|| "*Desconocido*".to_string()),
            uploader_url,
            requested_by,
            added_at: Utc::now(),
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Crea el input de audio para songbird.
    ///
    /// El input de `YoutubeDl` es perezoso: los fallos de stream aparecen
    /// recién al reproducir y los captura el watcher de errores del player.
    pub fn create_input(&self, client: &reqwest::Client) -> Result<Input> {
        let source = YoutubeDl::new(client.clone(), self.url.clone());
        Ok(Input::from(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_metadata_defaults() {
        let track = Track::new(
            "https://youtu.be/abc".to_string(),
            None,
            None,
            0,
            None,
            None,
            UserId::new(1),
        );

        assert_eq!(track.title, "*Sin título*");
        assert_eq!(track.uploader, "*Desconocido*");
        assert_eq!(track.duration(), Duration::ZERO);
    }
}
