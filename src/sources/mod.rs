pub mod spotify;
pub mod youtube;

use anyhow::Result;
use futures::future;
use regex::Regex;
use serenity::model::id::UserId;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;
use url::Url;

use crate::audio::track::Track;
use crate::config::Config;
use crate::error::MusicError;
pub use spotify::SpotifyClient;
pub use youtube::{TrackMetadata, YouTubeClient};

/// Intentos totales por resolución individual. Sin espera entre reintentos:
/// la política con backoff es exclusiva de la reconexión de voz.
pub const MAX_RESOLVE_ATTEMPTS: u32 = 3;

/// Clasificación de lo que pidió el usuario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Search(String),
    YoutubeVideo(String),
    YoutubePlaylist(String),
    SpotifyTrack(String),
    SpotifyAlbum(String),
    SpotifyPlaylist(String),
    Unsupported(String),
}

impl Reference {
    /// Clasifica una URL o texto de búsqueda.
    ///
    /// Lo que no parsea como URL http(s) se trata como palabras clave. Las
    /// URLs de YouTube con sufijo `&playnext=` se sanean antes de clasificar.
    pub fn classify(input: &str) -> Reference {
        let input = strip_playnext(input.trim());

        let parsed = match Url::parse(&input) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            _ => return Reference::Search(input),
        };

        let host = parsed.host_str().unwrap_or_default();

        if is_youtube_host(host) {
            let has_list = parsed.query_pairs().any(|(k, _)| k == "list");
            return if host != "youtu.be" && (has_list || parsed.path() == "/playlist") {
                Reference::YoutubePlaylist(input)
            } else {
                Reference::YoutubeVideo(input)
            };
        }

        if host == "open.spotify.com" {
            // El path puede traer un segmento regional: /intl-es/track/<id>.
            let mut segments = parsed.path_segments().into_iter().flatten();
            let kind = match segments.next() {
                Some(seg) if seg.starts_with("intl-") => segments.next(),
                other => other,
            };
            return match kind {
                Some("track") => Reference::SpotifyTrack(input),
                Some("album") => Reference::SpotifyAlbum(input),
                Some("playlist") => Reference::SpotifyPlaylist(input),
                _ => Reference::Unsupported(input),
            };
        }

        Reference::Unsupported(input)
    }
}

fn is_youtube_host(host: &str) -> bool {
    matches!(
        host,
        "youtube.com" | "www.youtube.com" | "m.youtube.com" | "music.youtube.com" | "youtu.be"
    )
}

fn strip_playnext(input: &str) -> String {
    let playnext = Regex::new(r"&playnext=.*$").expect("regex válida");
    if Regex::new(r"^https?://.+&playnext=").expect("regex válida").is_match(input) {
        playnext.replace(input, "").into_owned()
    } else {
        input.to_string()
    }
}

/// Resultado de resolver una colección: lo que entró, lo que falló y el
/// nombre para el mensaje de confirmación.
#[derive(Debug)]
pub struct ResolvedBatch {
    pub tracks: Vec<Arc<Track>>,
    pub failed_count: usize,
    pub name: String,
}

/// Resultado de una resolución: un track suelto o un lote.
#[derive(Debug)]
pub enum Resolution {
    Single(Arc<Track>),
    Batch(ResolvedBatch),
}

/// Reintenta una operación hasta [`MAX_RESOLVE_ATTEMPTS`] veces, sin pausa.
/// El último fallo se propaga.
pub async fn with_retries<T, E, F, Fut>(mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < MAX_RESOLVE_ATTEMPTS => {
                warn!("⚠️ Intento {}/{} falló: {}", attempt, MAX_RESOLVE_ATTEMPTS, e);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Resuelve todas las futures de un lote de forma independiente y devuelve
/// los éxitos más la cuenta de fallos. Un miembro que falla no aborta nada.
pub async fn settle_all<T, Fut>(futures: Vec<Fut>) -> (Vec<T>, usize)
where
    Fut: Future<Output = Result<T>>,
{
    let mut fulfilled = Vec::new();
    let mut rejected = 0usize;

    for result in future::join_all(futures).await {
        match result {
            Ok(value) => fulfilled.push(value),
            Err(e) => {
                warn!("⚠️ Miembro del lote descartado: {:#}", e);
                rejected += 1;
            }
        }
    }

    (fulfilled, rejected)
}

/// Convierte referencias de usuario en descriptors reproducibles.
pub struct TrackResolver {
    youtube: YouTubeClient,
    spotify: Option<SpotifyClient>,
    max_playlist_size: usize,
}

impl TrackResolver {
    pub fn new(config: &Config) -> Self {
        let spotify = match (&config.spotify_client_id, &config.spotify_client_secret) {
            (Some(id), Some(secret)) => Some(SpotifyClient::new(id.clone(), secret.clone())),
            _ => None,
        };

        Self {
            youtube: YouTubeClient::new(),
            spotify,
            max_playlist_size: config.max_playlist_size,
        }
    }

    /// Resuelve una URL o búsqueda a uno o varios [`Track`].
    pub async fn resolve(
        &self,
        input: &str,
        requested_by: UserId,
    ) -> Result<Resolution, MusicError> {
        match Reference::classify(input) {
            Reference::Search(keywords) => self.resolve_search(&keywords, requested_by).await,
            Reference::YoutubeVideo(url) => {
                let meta = with_retries(|| self.youtube.video(&url))
                    .await
                    .map_err(|_| MusicError::Resolution(url.clone()))?;
                Ok(Resolution::Single(to_track(meta, requested_by)))
            }
            Reference::YoutubePlaylist(url) => self.resolve_youtube_playlist(&url, requested_by).await,
            Reference::SpotifyTrack(url) => {
                let spotify = self.spotify_or_unsupported(&url)?;
                let sp_track = with_retries(|| spotify.track(&url))
                    .await
                    .map_err(|_| MusicError::Resolution(url.clone()))?;
                self.resolve_search(&sp_track.search_keywords(), requested_by)
                    .await
            }
            Reference::SpotifyAlbum(url) | Reference::SpotifyPlaylist(url) => {
                self.resolve_spotify_collection(&url, requested_by).await
            }
            Reference::Unsupported(url) => Err(MusicError::UnsupportedSource(url)),
        }
    }

    async fn resolve_search(
        &self,
        keywords: &str,
        requested_by: UserId,
    ) -> Result<Resolution, MusicError> {
        let meta = with_retries(|| self.youtube.search_one(keywords))
            .await
            .map_err(|_| MusicError::Resolution(keywords.to_string()))?;
        Ok(Resolution::Single(to_track(meta, requested_by)))
    }

    /// Playlist de YouTube: el índice llega plano; cada miembro se resuelve
    /// a metadata completa por separado, con su propio reintento.
    async fn resolve_youtube_playlist(
        &self,
        url: &str,
        requested_by: UserId,
    ) -> Result<Resolution, MusicError> {
        let playlist = with_retries(|| self.youtube.playlist(url, self.max_playlist_size))
            .await
            .map_err(|_| MusicError::Resolution(url.to_string()))?;

        let youtube = &self.youtube;
        let lookups: Vec<_> = playlist
            .entry_urls
            .iter()
            .map(|entry_url| async move { with_retries(|| youtube.video(entry_url)).await })
            .collect();

        let (resolved, failed_count) = settle_all(lookups).await;
        let tracks = resolved
            .into_iter()
            .map(|meta| to_track(meta, requested_by))
            .collect();

        Ok(Resolution::Batch(ResolvedBatch {
            tracks,
            failed_count,
            name: playlist.title.unwrap_or_else(|| "Playlist sin nombre".to_string()),
        }))
    }

    /// Colecciones de Spotify se resuelven en dos saltos: metadata de la
    /// colección y después una búsqueda en YouTube por cada item. Un fallo
    /// en cualquiera de los dos saltos cuenta como miembro fallido.
    async fn resolve_spotify_collection(
        &self,
        url: &str,
        requested_by: UserId,
    ) -> Result<Resolution, MusicError> {
        let spotify = self.spotify_or_unsupported(url)?;
        let collection = with_retries(|| spotify.collection(url, self.max_playlist_size))
            .await
            .map_err(|_| MusicError::Resolution(url.to_string()))?;

        let total = collection.tracks.len();
        let youtube = &self.youtube;
        let lookups: Vec<_> = collection
            .tracks
            .iter()
            .map(|sp_track| {
                let keywords = sp_track.search_keywords();
                async move { with_retries(|| youtube.search_one(&keywords)).await }
            })
            .collect();

        let (resolved, _) = settle_all(lookups).await;
        let tracks: Vec<Arc<Track>> = resolved
            .into_iter()
            .map(|meta| to_track(meta, requested_by))
            .collect();

        Ok(Resolution::Batch(ResolvedBatch {
            failed_count: total - tracks.len(),
            tracks,
            name: collection.name,
        }))
    }

    fn spotify_or_unsupported(&self, url: &str) -> Result<&SpotifyClient, MusicError> {
        self.spotify
            .as_ref()
            .ok_or_else(|| MusicError::UnsupportedSource(url.to_string()))
    }
}

fn to_track(meta: TrackMetadata, requested_by: UserId) -> Arc<Track> {
    Arc::new(Track::new(
        meta.url,
        meta.title,
        meta.thumbnail,
        meta.duration_secs,
        meta.uploader,
        meta.uploader_url,
        requested_by,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_classify_youtube_video() {
        assert_eq!(
            Reference::classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Reference::YoutubeVideo("https://www.youtube.com/watch?v=dQw4w9WgXcQ".into())
        );
        assert_eq!(
            Reference::classify("https://youtu.be/dQw4w9WgXcQ"),
            Reference::YoutubeVideo("https://youtu.be/dQw4w9WgXcQ".into())
        );
        assert_eq!(
            Reference::classify("https://music.youtube.com/watch?v=abc"),
            Reference::YoutubeVideo("https://music.youtube.com/watch?v=abc".into())
        );
    }

    #[test]
    fn test_classify_youtube_playlist() {
        assert_eq!(
            Reference::classify("https://www.youtube.com/playlist?list=PL123"),
            Reference::YoutubePlaylist("https://www.youtube.com/playlist?list=PL123".into())
        );
        assert_eq!(
            Reference::classify("https://www.youtube.com/watch?v=abc&list=PL123"),
            Reference::YoutubePlaylist("https://www.youtube.com/watch?v=abc&list=PL123".into())
        );
    }

    #[test]
    fn test_classify_spotify() {
        assert_eq!(
            Reference::classify("https://open.spotify.com/track/abc123"),
            Reference::SpotifyTrack("https://open.spotify.com/track/abc123".into())
        );
        assert_eq!(
            Reference::classify("https://open.spotify.com/intl-es/album/xyz"),
            Reference::SpotifyAlbum("https://open.spotify.com/intl-es/album/xyz".into())
        );
        assert_eq!(
            Reference::classify("https://open.spotify.com/playlist/p1"),
            Reference::SpotifyPlaylist("https://open.spotify.com/playlist/p1".into())
        );
    }

    #[test]
    fn test_classify_search_and_unsupported() {
        assert_eq!(
            Reference::classify("never gonna give you up"),
            Reference::Search("never gonna give you up".into())
        );
        assert_eq!(
            Reference::classify("https://example.com/cancion.mp3"),
            Reference::Unsupported("https://example.com/cancion.mp3".into())
        );
    }

    #[test]
    fn test_classify_strips_playnext_suffix() {
        assert_eq!(
            Reference::classify("https://www.youtube.com/watch?v=abc&playnext=1&index=2"),
            Reference::YoutubeVideo("https://www.youtube.com/watch?v=abc".into())
        );
    }

    #[tokio::test]
    async fn test_with_retries_gives_up_after_three_attempts() {
        let calls = AtomicU32::new(0);

        let result: Result<(), anyhow::Error> = with_retries(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { anyhow::bail!("siempre falla") }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retries_stops_on_success() {
        let calls = AtomicU32::new(0);

        let result: Result<u32, anyhow::Error> = with_retries(|| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 2 {
                    anyhow::bail!("fallo transitorio")
                }
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_settle_all_counts_partial_failures() {
        let futures: Vec<_> = (0..5)
            .map(|i| async move {
                if i == 1 || i == 3 {
                    anyhow::bail!("miembro {} roto", i)
                }
                Ok(i)
            })
            .collect();

        let (fulfilled, rejected) = settle_all(futures).await;
        assert_eq!(fulfilled, vec![0, 2, 4]);
        assert_eq!(rejected, 2);
    }
}
