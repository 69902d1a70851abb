use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::audio::{player::GuildMusicPlayer, track::Track};

/// Snapshot de cola guardado tras una salida por abandono.
///
/// Vive solo en memoria: un reinicio del proceso lo pierde y eso está bien.
#[derive(Debug, Clone)]
pub struct SavedQueue {
    pub tracks: Vec<Arc<Track>>,
}

/// Estado de un guild en el registro: o tiene un player activo, o quedó
/// una cola guardada esperando que alguien quiera continuarla.
pub enum GuildSession {
    Active(Arc<GuildMusicPlayer>),
    Dormant(SavedQueue),
}

/// Registro global de sesiones de música, uno por proceso.
///
/// Un solo mapa con variante etiquetada: `Active` y `Dormant` son
/// mutuamente excluyentes por construcción, no por convención. Las entradas
/// las crean y eliminan los handlers de comandos y el teardown del player;
/// nada las recolecta implícitamente.
pub struct MusicSessionRegistry {
    sessions: DashMap<GuildId, GuildSession>,
    /// Guardas de conexión por guild: evitan que dos comandos concurrentes
    /// creen dos players para el mismo guild.
    connect_guards: DashMap<GuildId, Arc<Mutex<()>>>,
}

impl MusicSessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            connect_guards: DashMap::new(),
        }
    }

    /// Player activo del guild, si hay.
    pub fn player(&self, guild_id: GuildId) -> Option<Arc<GuildMusicPlayer>> {
        match self.sessions.get(&guild_id).as_deref() {
            Some(GuildSession::Active(player)) => Some(player.clone()),
            _ => None,
        }
    }

    /// Registra un player recién conectado. Pisa cualquier cola guardada:
    /// el flujo de comandos ya le ofreció continuarla antes de llegar acá.
    pub fn insert_active(&self, guild_id: GuildId, player: Arc<GuildMusicPlayer>) {
        info!("📌 Sesión activa registrada para guild {}", guild_id);
        self.sessions.insert(guild_id, GuildSession::Active(player));
    }

    /// Transición Active → Dormant: guarda el snapshot de la cola al salir
    /// por abandono. Un snapshot vacío elimina la entrada directamente.
    pub fn park(&self, guild_id: GuildId, tracks: Vec<Arc<Track>>) {
        if tracks.is_empty() {
            self.sessions.remove(&guild_id);
            return;
        }

        info!(
            "💾 Cola de {} canciones guardada para guild {}",
            tracks.len(),
            guild_id
        );
        self.sessions
            .insert(guild_id, GuildSession::Dormant(SavedQueue { tracks }));
    }

    /// Cola guardada del guild, sin consumirla.
    pub fn saved_queue(&self, guild_id: GuildId) -> Option<SavedQueue> {
        match self.sessions.get(&guild_id).as_deref() {
            Some(GuildSession::Dormant(saved)) => Some(saved.clone()),
            _ => None,
        }
    }

    /// Consume la cola guardada (al aceptarla o rechazarla).
    pub fn take_saved_queue(&self, guild_id: GuildId) -> Option<SavedQueue> {
        match self.sessions.remove_if(&guild_id, |_, session| {
            matches!(session, GuildSession::Dormant(_))
        }) {
            Some((_, GuildSession::Dormant(saved))) => Some(saved),
            _ => None,
        }
    }

    /// Elimina la entrada del guild, sea cual sea su estado.
    pub fn remove(&self, guild_id: GuildId) {
        if self.sessions.remove(&guild_id).is_some() {
            debug!("🗑️ Sesión eliminada para guild {}", guild_id);
        }
    }

    /// Guarda de conexión del guild; se toma antes de crear un player.
    pub fn connect_guard(&self, guild_id: GuildId) -> Arc<Mutex<()>> {
        self.connect_guards
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl Default for MusicSessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::model::id::UserId;

    fn track(title: &str) -> Arc<Track> {
        Arc::new(Track::new(
            format!("https://youtu.be/{title}"),
            Some(title.to_string()),
            None,
            60,
            None,
            None,
            UserId::new(1),
        ))
    }

    #[test]
    fn test_park_and_take_saved_queue() {
        let registry = MusicSessionRegistry::new();
        let guild = GuildId::new(10);

        registry.park(guild, vec![track("a"), track("b")]);
        assert_eq!(registry.saved_queue(guild).unwrap().tracks.len(), 2);

        let taken = registry.take_saved_queue(guild).unwrap();
        assert_eq!(taken.tracks.len(), 2);
        // Consumida: no queda nada.
        assert!(registry.saved_queue(guild).is_none());
        assert!(registry.take_saved_queue(guild).is_none());
    }

    #[test]
    fn test_park_empty_snapshot_removes_entry() {
        let registry = MusicSessionRegistry::new();
        let guild = GuildId::new(11);

        registry.park(guild, Vec::new());
        assert!(registry.saved_queue(guild).is_none());
    }

    #[test]
    fn test_connect_guard_is_per_guild() {
        let registry = MusicSessionRegistry::new();
        let a = registry.connect_guard(GuildId::new(1));
        let b = registry.connect_guard(GuildId::new(1));
        let c = registry.connect_guard(GuildId::new(2));

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
