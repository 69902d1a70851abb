use anyhow::{Context, Result};
use async_process::Command;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

/// Metadata de un track tal como la entrega el proveedor primario.
#[derive(Debug, Clone)]
pub struct TrackMetadata {
    pub url: String,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration_secs: u64,
    pub uploader: Option<String>,
    pub uploader_url: Option<String>,
}

/// Índice plano de una playlist: título y URLs de los miembros. La metadata
/// completa de cada miembro se pide por separado.
#[derive(Debug)]
pub struct PlaylistIndex {
    pub title: Option<String>,
    pub entry_urls: Vec<String>,
}

/// Cliente del proveedor primario (YouTube vía yt-dlp).
pub struct YouTubeClient {
    /// Limita los subprocesos concurrentes para no gatillar rate limiting.
    rate_limiter: tokio::sync::Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    uploader_url: Option<String>,
    channel_url: Option<String>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YtDlpPlaylist {
    title: Option<String>,
    entries: Option<Vec<YtDlpEntry>>,
}

#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
    url: Option<String>,
}

impl YouTubeClient {
    pub fn new() -> Self {
        Self {
            rate_limiter: tokio::sync::Semaphore::new(3),
        }
    }

    /// Obtiene la metadata completa de un video.
    pub async fn video(&self, url: &str) -> Result<TrackMetadata> {
        if !Self::is_youtube_url(url) {
            anyhow::bail!("URL de YouTube inválida: {}", url);
        }

        let _permit = self.rate_limiter.acquire().await?;

        debug!("📊 Obteniendo info de: {}", url);

        let output = Command::new("yt-dlp")
            .args(["--no-playlist", "--dump-json", "--skip-download", "--no-warnings", url])
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let info: YtDlpInfo =
            serde_json::from_str(stdout.trim()).context("Error al parsear respuesta de yt-dlp")?;

        Ok(info_to_metadata(info, url))
    }

    /// Busca el primer resultado para unas palabras clave.
    pub async fn search_one(&self, keywords: &str) -> Result<TrackMetadata> {
        let _permit = self.rate_limiter.acquire().await?;

        info!("🔍 Buscando en YouTube: {}", keywords);

        let search_query = format!("ytsearch1:{}", keywords);
        let output = Command::new("yt-dlp")
            .args(["--dump-json", "--skip-download", "--no-warnings", &search_query])
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let first_line = stdout
            .lines()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Sin resultados para: {}", keywords))?;

        let info: YtDlpInfo =
            serde_json::from_str(first_line).context("Error al parsear respuesta de yt-dlp")?;

        Ok(info_to_metadata(info, keywords))
    }

    /// Obtiene el índice plano de una playlist, acotado a `max_items`.
    pub async fn playlist(&self, url: &str, max_items: usize) -> Result<PlaylistIndex> {
        let _permit = self.rate_limiter.acquire().await?;

        info!("📋 Obteniendo playlist: {}", url);

        let output = Command::new("yt-dlp")
            .args([
                "--flat-playlist",
                "--dump-single-json",
                "--playlist-end",
                &max_items.to_string(),
                "--no-warnings",
                url,
            ])
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let playlist: YtDlpPlaylist =
            serde_json::from_str(stdout.trim()).context("Error al parsear playlist de yt-dlp")?;

        let entry_urls = playlist
            .entries
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| match (entry.url, entry.id) {
                (Some(url), _) => Some(url),
                (None, Some(id)) => Some(format!("https://www.youtube.com/watch?v={}", id)),
                (None, None) => None,
            })
            .collect();

        Ok(PlaylistIndex {
            title: playlist.title,
            entry_urls,
        })
    }

    /// Verifica si una URL es válida para YouTube
    pub fn is_youtube_url(url: &str) -> bool {
        let youtube_regex = Regex::new(
            r"^(https?://)?(www\.)?(youtube\.com/(watch\?v=|embed/|v/|playlist\?)|youtu\.be/|music\.youtube\.com/)",
        )
        .expect("regex válida");

        youtube_regex.is_match(url)
    }
}

impl Default for YouTubeClient {
    fn default() -> Self {
        Self::new()
    }
}

fn info_to_metadata(info: YtDlpInfo, fallback_url: &str) -> TrackMetadata {
    TrackMetadata {
        url: info.webpage_url.unwrap_or_else(|| fallback_url.to_string()),
        title: info.title,
        thumbnail: info.thumbnail,
        duration_secs: info.duration.map(|d| d.round() as u64).unwrap_or(0),
        uploader: info.uploader,
        uploader_url: info.uploader_url.or(info.channel_url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_youtube_url_detection() {
        assert!(YouTubeClient::is_youtube_url(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        ));
        assert!(YouTubeClient::is_youtube_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(YouTubeClient::is_youtube_url(
            "https://music.youtube.com/watch?v=test"
        ));
        assert!(YouTubeClient::is_youtube_url(
            "https://www.youtube.com/playlist?list=PL123"
        ));
        assert!(!YouTubeClient::is_youtube_url("https://example.com/video"));
    }

    #[test]
    fn test_info_parsing_rounds_duration() {
        let raw = r#"{"title":"Una canción","duration":213.66,"uploader":"Canal","uploader_url":"https://youtube.com/@canal","thumbnail":"https://i.ytimg.com/x.jpg","webpage_url":"https://www.youtube.com/watch?v=abc"}"#;
        let info: YtDlpInfo = serde_json::from_str(raw).unwrap();
        let meta = info_to_metadata(info, "fallback");

        assert_eq!(meta.duration_secs, 214);
        assert_eq!(meta.url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(meta.uploader.as_deref(), Some("Canal"));
    }

    #[test]
    fn test_playlist_entry_url_fallback_from_id() {
        let raw = r#"{"title":"Mi lista","entries":[{"id":"abc","url":null},{"id":null,"url":"https://youtu.be/xyz"},{"id":null,"url":null}]}"#;
        let playlist: YtDlpPlaylist = serde_json::from_str(raw).unwrap();

        let urls: Vec<String> = playlist
            .entries
            .unwrap()
            .into_iter()
            .filter_map(|entry| match (entry.url, entry.id) {
                (Some(url), _) => Some(url),
                (None, Some(id)) => Some(format!("https://www.youtube.com/watch?v={}", id)),
                (None, None) => None,
            })
            .collect();

        assert_eq!(
            urls,
            vec![
                "https://www.youtube.com/watch?v=abc".to_string(),
                "https://youtu.be/xyz".to_string()
            ]
        );
    }
}
