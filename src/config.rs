use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub max_playlist_size: usize,

    // Sesión
    /// Segundos de gracia antes de irse al quedar solo en el canal.
    pub alone_grace_secs: u64,

    // APIs (opcionales)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,

    // Rendimiento
    pub worker_threads: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            max_playlist_size: std::env::var("MAX_PLAYLIST_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,

            // Sesión
            alone_grace_secs: std::env::var("ALONE_GRACE_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,

            // APIs
            spotify_client_id: std::env::var("SPOTIFY_CLIENT_ID").ok(),
            spotify_client_secret: std::env::var("SPOTIFY_CLIENT_SECRET").ok(),

            // Rendimiento
            worker_threads: match std::env::var("WORKER_THREADS") {
                Ok(threads) => threads.parse()?,
                Err(_) => num_cpus::get().min(4),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.discord_token.is_empty() {
            anyhow::bail!("DISCORD_TOKEN no puede estar vacío");
        }

        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!("DEFAULT_VOLUME debe estar entre 0.0 y 2.0");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("MAX_QUEUE_SIZE debe ser mayor a 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("MAX_PLAYLIST_SIZE debe ser mayor a 0");
        }

        // Spotify es opcional, pero a medias no sirve.
        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID y SPOTIFY_CLIENT_SECRET van juntos");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            discord_token: "token".to_string(),
            application_id: 1,
            guild_id: None,
            default_volume: 0.5,
            max_queue_size: 1000,
            max_playlist_size: 100,
            alone_grace_secs: 5,
            spotify_client_id: None,
            spotify_client_secret: None,
            worker_threads: 2,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_volume_out_of_range_fails() {
        let mut config = base_config();
        config.default_volume = 3.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_half_spotify_credentials_fail() {
        let mut config = base_config();
        config.spotify_client_id = Some("id".to_string());
        assert!(config.validate().is_err());
    }
}
