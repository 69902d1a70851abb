use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use base64::Engine;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

/// Metadata mínima de un track de Spotify. Solo sirve para construir la
/// búsqueda en el proveedor primario; el audio nunca viene de Spotify.
#[derive(Debug, Clone)]
pub struct SpotifyTrackMeta {
    pub name: String,
    pub artists: Vec<String>,
}

impl SpotifyTrackMeta {
    /// Palabras clave para buscar el equivalente en YouTube.
    pub fn search_keywords(&self) -> String {
        if self.artists.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.artists.join(" "), self.name)
        }
    }
}

/// Album o playlist ya expandido a sus miembros.
#[derive(Debug)]
pub struct SpotifyCollection {
    pub name: String,
    pub tracks: Vec<SpotifyTrackMeta>,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Cliente de la Web API de Spotify con client credentials.
pub struct SpotifyClient {
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    name: String,
    #[serde(default)]
    artists: Vec<ArtistObject>,
}

#[derive(Debug, Deserialize)]
struct AlbumResponse {
    name: String,
    tracks: Page<TrackObject>,
}

#[derive(Debug, Deserialize)]
struct PlaylistResponse {
    name: String,
    tracks: Page<PlaylistItem>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<TrackObject>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    items: Vec<T>,
    next: Option<String>,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
            http: reqwest::Client::new(),
            token: Mutex::new(None),
        }
    }

    /// Entrega un token vigente, renovándolo si expiró.
    async fn access_token(&self) -> Result<String> {
        {
            let cached = self.token.lock();
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Instant::now() {
                    return Ok(token.access_token.clone());
                }
            }
        }

        debug!("🔑 Renovando token de Spotify");

        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.client_id, self.client_secret));

        let response = self
            .http
            .post(TOKEN_URL)
            .header("Authorization", format!("Basic {}", credentials))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .context("Error al pedir token de Spotify")?
            .error_for_status()
            .context("Spotify rechazó las credenciales")?;

        let token: TokenResponse = response
            .json()
            .await
            .context("Error al parsear token de Spotify")?;

        // Margen de 30s para no usar un token al borde de expirar.
        let expires_at = Instant::now() + Duration::from_secs(token.expires_in.saturating_sub(30));
        let access_token = token.access_token.clone();

        *self.token.lock() = Some(CachedToken {
            access_token: token.access_token,
            expires_at,
        });

        Ok(access_token)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let token = self.access_token().await?;

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .context("Error al consultar la API de Spotify")?
            .error_for_status()
            .context("Spotify respondió con error")?;

        response
            .json()
            .await
            .context("Error al parsear respuesta de Spotify")
    }

    /// Metadata de un track individual.
    pub async fn track(&self, url: &str) -> Result<SpotifyTrackMeta> {
        let id = resource_id(url, "track")
            .ok_or_else(|| anyhow::anyhow!("URL de track de Spotify inválida: {}", url))?;

        let track: TrackObject = self.get_json(&format!("{}/tracks/{}", API_BASE, id)).await?;

        Ok(track_meta(track))
    }

    /// Expande un album o playlist a sus tracks, acotado a `max_items`.
    pub async fn collection(&self, url: &str, max_items: usize) -> Result<SpotifyCollection> {
        if let Some(id) = resource_id(url, "album") {
            return self.album(&id, max_items).await;
        }
        if let Some(id) = resource_id(url, "playlist") {
            return self.playlist(&id, max_items).await;
        }
        anyhow::bail!("URL de colección de Spotify inválida: {}", url)
    }

    async fn album(&self, id: &str, max_items: usize) -> Result<SpotifyCollection> {
        info!("💿 Obteniendo album de Spotify: {}", id);

        let album: AlbumResponse = self.get_json(&format!("{}/albums/{}", API_BASE, id)).await?;

        let mut tracks: Vec<SpotifyTrackMeta> =
            album.tracks.items.into_iter().map(track_meta).collect();

        let mut next = album.tracks.next;
        while let Some(url) = next {
            if tracks.len() >= max_items {
                break;
            }
            let page: Page<TrackObject> = self.get_json(&url).await?;
            tracks.extend(page.items.into_iter().map(track_meta));
            next = page.next;
        }

        tracks.truncate(max_items);

        Ok(SpotifyCollection {
            name: album.name,
            tracks,
        })
    }

    async fn playlist(&self, id: &str, max_items: usize) -> Result<SpotifyCollection> {
        info!("📋 Obteniendo playlist de Spotify: {}", id);

        let playlist: PlaylistResponse = self
            .get_json(&format!("{}/playlists/{}", API_BASE, id))
            .await?;

        let mut tracks: Vec<SpotifyTrackMeta> = playlist
            .tracks
            .items
            .into_iter()
            .filter_map(|item| item.track.map(track_meta))
            .collect();

        let mut next = playlist.tracks.next;
        while let Some(url) = next {
            if tracks.len() >= max_items {
                break;
            }
            let page: Page<PlaylistItem> = self.get_json(&url).await?;
            tracks.extend(page.items.into_iter().filter_map(|item| item.track.map(track_meta)));
            next = page.next;
        }

        tracks.truncate(max_items);

        Ok(SpotifyCollection {
            name: playlist.name,
            tracks,
        })
    }
}

fn track_meta(track: TrackObject) -> SpotifyTrackMeta {
    SpotifyTrackMeta {
        name: track.name,
        artists: track.artists.into_iter().map(|a| a.name).collect(),
    }
}

/// Extrae el id de un recurso desde una URL tipo
/// `https://open.spotify.com/track/{id}?si=...`, tolerando el segmento
/// regional `intl-xx`.
fn resource_id(url: &str, kind: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let mut segments = parsed
        .path_segments()?
        .filter(|seg| !seg.starts_with("intl-"));

    if segments.next()? != kind {
        return None;
    }

    let id = segments.next()?;
    if id.is_empty() {
        return None;
    }
    Some(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resource_id_extraction() {
        assert_eq!(
            resource_id("https://open.spotify.com/track/abc123?si=xyz", "track"),
            Some("abc123".to_string())
        );
        assert_eq!(
            resource_id("https://open.spotify.com/intl-es/album/def456", "album"),
            Some("def456".to_string())
        );
        assert_eq!(
            resource_id("https://open.spotify.com/track/abc123", "playlist"),
            None
        );
        assert_eq!(resource_id("no es una url", "track"), None);
    }

    #[test]
    fn test_search_keywords_includes_artists() {
        let meta = SpotifyTrackMeta {
            name: "Clocks".to_string(),
            artists: vec!["Coldplay".to_string()],
        };
        assert_eq!(meta.search_keywords(), "Coldplay Clocks");

        let sin_artista = SpotifyTrackMeta {
            name: "Misterio".to_string(),
            artists: vec![],
        };
        assert_eq!(sin_artista.search_keywords(), "Misterio");
    }

    #[test]
    fn test_playlist_page_skips_missing_tracks() {
        let raw = r#"{"items":[{"track":{"name":"Uno","artists":[{"name":"A"}]}},{"track":null}],"next":null}"#;
        let page: Page<PlaylistItem> = serde_json::from_str(raw).unwrap();

        let tracks: Vec<SpotifyTrackMeta> = page
            .items
            .into_iter()
            .filter_map(|item| item.track.map(track_meta))
            .collect();

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].name, "Uno");
    }
}
