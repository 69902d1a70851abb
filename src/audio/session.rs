use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc,
};
use std::time::Duration;

use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    events::context_data::DisconnectReason, input::Input, model::CloseCode, tracks::TrackHandle,
    Call, Songbird,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Plazo para que la conexión llegue a Ready.
const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Plazo para el único reintento ante un cierre recuperable (4014).
const RECOVERABLE_REJOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Reintentos máximos de rejoin con backoff ante cierres genéricos.
const MAX_REJOIN_ATTEMPTS: u32 = 5;

use crate::error::MusicError;

/// Conexión de voz de un guild.
///
/// Maneja el ciclo conectar → ready → desconectado → destruido. Las
/// banderas `leaving` y `destroyed` distinguen las desconexiones que
/// pedimos nosotros de las que nos hace el transporte; solo estas últimas
/// gatillan recuperación.
pub struct VoiceSession {
    guild_id: GuildId,
    channel_id: ChannelId,
    manager: Arc<Songbird>,
    call: Arc<Mutex<Call>>,
    leaving: AtomicBool,
    destroyed: AtomicBool,
    rejoin_attempts: AtomicU32,
}

impl VoiceSession {
    /// Conecta al canal de voz esperando hasta 10 segundos por Ready.
    ///
    /// Si el plazo vence la conexión a medio armar se destruye acá mismo,
    /// para que el llamador no quede con un Call fantasma.
    pub async fn connect(
        manager: Arc<Songbird>,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Self, MusicError> {
        info!("🔊 Conectando al canal de voz {} en {}", channel_id, guild_id);

        let joined = tokio::time::timeout(READY_TIMEOUT, manager.join(guild_id, channel_id)).await;

        let call = match joined {
            Ok(Ok(call)) => call,
            Ok(Err(e)) => {
                warn!("❌ Falló la conexión de voz en {}: {}", guild_id, e);
                let _ = manager.remove(guild_id).await;
                return Err(MusicError::ConnectionTimeout);
            }
            Err(_) => {
                warn!("⏰ La conexión de voz en {} no llegó a Ready", guild_id);
                let _ = manager.remove(guild_id).await;
                return Err(MusicError::ConnectionTimeout);
            }
        };

        Ok(Self {
            guild_id,
            channel_id,
            manager,
            call,
            leaving: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            rejoin_attempts: AtomicU32::new(0),
        })
    }

    pub fn call(&self) -> Arc<Mutex<Call>> {
        self.call.clone()
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Arranca la reproducción de un input y devuelve el handle del track.
    pub async fn play(&self, input: Input, volume: f32) -> TrackHandle {
        let mut call = self.call.lock().await;
        let handle = call.play_input(input);
        let _ = handle.set_volume(volume);
        handle
    }

    /// Un cierre 4014 (desconexión forzada por el servidor) se recupera
    /// distinto que un corte genérico: un único rejoin inmediato acotado
    /// a 5 segundos, sin backoff ni contador.
    pub fn is_recoverable_close(reason: Option<&DisconnectReason>) -> bool {
        matches!(
            reason,
            Some(DisconnectReason::WsClosed(Some(CloseCode::Disconnected)))
        )
    }

    /// Intenta recuperar la conexión tras una desconexión no pedida.
    ///
    /// Camino recuperable: un solo rejoin con plazo de 5 s. Camino
    /// genérico: espera `(intento + 1) × 5 s` y reintenta, hasta 5 veces;
    /// el contador solo se resetea cuando el driver vuelve a conectar.
    pub async fn recover(&self, recoverable: bool) -> Result<(), MusicError> {
        if recoverable {
            info!("🔄 Cierre recuperable en {}, reintentando una vez", self.guild_id);
            return match tokio::time::timeout(
                RECOVERABLE_REJOIN_TIMEOUT,
                self.manager.join(self.guild_id, self.channel_id),
            )
            .await
            {
                Ok(Ok(_)) => Ok(()),
                _ => Err(MusicError::ConnectionTimeout),
            };
        }

        let attempt = self.rejoin_attempts.fetch_add(1, Ordering::SeqCst);
        if attempt >= MAX_REJOIN_ATTEMPTS {
            warn!("❌ Agotados los reintentos de conexión en {}", self.guild_id);
            return Err(MusicError::ConnectionTimeout);
        }

        let delay = rejoin_delay(attempt);
        info!(
            "🔄 Reintento {}/{} en {} (espera {:?})",
            attempt + 1,
            MAX_REJOIN_ATTEMPTS,
            self.guild_id,
            delay
        );
        tokio::time::sleep(delay).await;

        self.manager
            .join(self.guild_id, self.channel_id)
            .await
            .map(|_| ())
            .map_err(|_| MusicError::ConnectionTimeout)
    }

    /// El driver volvió a Ready: la próxima caída parte de cero.
    pub fn reset_rejoin_attempts(&self) {
        self.rejoin_attempts.store(0, Ordering::SeqCst);
    }

    pub fn mark_leaving(&self) {
        self.leaving.store(true, Ordering::SeqCst);
    }

    pub fn is_leaving(&self) -> bool {
        self.leaving.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Marca la sesión como destruida. Devuelve `true` solo la primera
    /// vez: el teardown corre exactamente una vez aunque converjan varios
    /// caminos (leave explícito, abandono, desconexión fatal).
    pub fn begin_destroy(&self) -> bool {
        !self.destroyed.swap(true, Ordering::SeqCst)
    }

    /// Corta la conexión en el transporte. Idempotente.
    pub async fn disconnect_transport(&self) {
        if let Err(e) = self.manager.remove(self.guild_id).await {
            warn!("⚠️ Error al remover la conexión de {}: {}", self.guild_id, e);
        }
    }
}

/// Espera antes del rejoin número `attempt` (0-based): crece lineal.
fn rejoin_delay(attempt: u32) -> Duration {
    Duration::from_secs(u64::from(attempt + 1) * 5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rejoin_delay_grows_linearly() {
        let delays: Vec<u64> = (0..MAX_REJOIN_ATTEMPTS)
            .map(|attempt| rejoin_delay(attempt).as_secs())
            .collect();
        assert_eq!(delays, vec![5, 10, 15, 20, 25]);
    }

    #[test]
    fn test_recoverable_close_is_only_4014() {
        assert!(VoiceSession::is_recoverable_close(Some(
            &DisconnectReason::WsClosed(Some(CloseCode::Disconnected))
        )));
        assert!(!VoiceSession::is_recoverable_close(Some(
            &DisconnectReason::WsClosed(Some(CloseCode::SessionInvalid))
        )));
        assert!(!VoiceSession::is_recoverable_close(Some(
            &DisconnectReason::WsClosed(None)
        )));
        assert!(!VoiceSession::is_recoverable_close(Some(
            &DisconnectReason::TimedOut
        )));
        assert!(!VoiceSession::is_recoverable_close(None));
    }
}
