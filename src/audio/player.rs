use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serenity::{
    async_trait,
    builder::{CreateEmbed, CreateMessage},
    http::Http,
    model::id::{ChannelId, GuildId, MessageId},
};
use songbird::{
    tracks::TrackHandle, Call, CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler,
    Songbird, TrackEvent,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audio::queue::{LoopMode, PlaybackQueue};
use crate::audio::session::VoiceSession;
use crate::audio::track::Track;
use crate::config::Config;
use crate::error::MusicError;
use crate::registry::MusicSessionRegistry;
use crate::sources::ResolvedBatch;
use crate::ui::embeds;

struct CurrentTrack {
    handle: TrackHandle,
    track: Arc<Track>,
}

/// Slot del track vigente, en tres estados: libre, reservado y ocupado.
///
/// Arrancar un track cruza un await (materializar el stream), así que el
/// avance va en dos pasos: reservar el slot de forma síncrona y publicar
/// el handle cuando el stream ya suena. Mientras la reserva está en pie
/// ningún otro avance pasa el chequeo de inactividad, con lo que dos
/// comandos simultáneos no pueden arrancar dos tracks a la vez.
struct PlaybackSlot<T> {
    state: Mutex<SlotState<T>>,
}

enum SlotState<T> {
    Idle,
    Starting,
    Playing(T),
}

impl<T> PlaybackSlot<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Idle),
        }
    }

    /// Reserva el slot para arrancar un track. Solo gana un avance; el
    /// resto ve el slot tomado.
    fn try_reserve(&self) -> bool {
        let mut state = self.state.lock();
        if matches!(*state, SlotState::Idle) {
            *state = SlotState::Starting;
            true
        } else {
            false
        }
    }

    /// Libera una reserva que no llegó a publicar nada. Un track ya
    /// publicado no se toca.
    fn release(&self) {
        let mut state = self.state.lock();
        if matches!(*state, SlotState::Starting) {
            *state = SlotState::Idle;
        }
    }

    fn publish(&self, value: T) {
        *self.state.lock() = SlotState::Playing(value);
    }

    /// Saca el track publicado dejando el slot libre. Una reserva ajena
    /// en curso queda en pie.
    fn take(&self) -> Option<T> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, SlotState::Idle) {
            SlotState::Playing(value) => Some(value),
            other => {
                *state = other;
                None
            }
        }
    }

    /// Libera el slot solo si el track publicado cumple el predicado.
    /// Devuelve si lo liberó, para distinguir eventos de tracks ya
    /// descartados.
    fn clear_if(&self, pred: impl FnOnce(&T) -> bool) -> bool {
        let mut state = self.state.lock();
        match &*state {
            SlotState::Playing(value) if pred(value) => {
                *state = SlotState::Idle;
                true
            }
            _ => false,
        }
    }

    fn is_occupied(&self) -> bool {
        !matches!(*self.state.lock(), SlotState::Idle)
    }

    fn map_playing<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        match &*self.state.lock() {
            SlotState::Playing(value) => Some(f(value)),
            _ => None,
        }
    }
}

/// Reproductor de un guild: una cola, una sesión de voz y un canal de
/// texto donde reporta estado.
///
/// La cola vive bajo un mutex propio y ninguna mutación espera con el
/// lock tomado. Los eventos del driver y de los tracks llegan por
/// watchers de songbird; el uuid del handle distingue los eventos del
/// track vigente de los de un track ya descartado.
pub struct GuildMusicPlayer {
    guild_id: GuildId,
    text_channel: ChannelId,
    http: Arc<Http>,
    stream_client: reqwest::Client,
    session: VoiceSession,
    queue: Mutex<PlaybackQueue>,
    current: PlaybackSlot<CurrentTrack>,
    now_playing_msg: Mutex<Option<MessageId>>,
    pending_resume: Mutex<Option<Vec<Arc<Track>>>>,
    alone_timer: Mutex<Option<JoinHandle<()>>>,
    registry: Arc<MusicSessionRegistry>,
    volume: f32,
    alone_grace: Duration,
}

impl GuildMusicPlayer {
    /// Conecta al canal de voz y arma el player completo: sesión, cola y
    /// watchers del driver. Registra la sesión como activa en el
    /// registro global.
    pub async fn connect(
        manager: Arc<Songbird>,
        http: Arc<Http>,
        registry: Arc<MusicSessionRegistry>,
        config: &Config,
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
    ) -> Result<Arc<Self>, MusicError> {
        let session = VoiceSession::connect(manager, guild_id, voice_channel).await?;

        let player = Arc::new(Self {
            guild_id,
            text_channel,
            http,
            stream_client: reqwest::Client::new(),
            session,
            queue: Mutex::new(PlaybackQueue::new(config.max_queue_size)),
            current: PlaybackSlot::new(),
            now_playing_msg: Mutex::new(None),
            pending_resume: Mutex::new(None),
            alone_timer: Mutex::new(None),
            registry: registry.clone(),
            volume: config.default_volume,
            alone_grace: Duration::from_secs(config.alone_grace_secs),
        });

        {
            let call = player.session.call();
            let mut call = call.lock().await;
            attach_driver_watchers(&mut call, &player);
        }

        registry.insert_active(guild_id, player.clone());

        info!("✅ Player listo en guild {}", guild_id);
        Ok(player)
    }

    pub fn voice_channel(&self) -> ChannelId {
        self.session.channel_id()
    }

    pub fn is_playing(&self) -> bool {
        self.current.is_occupied()
    }

    /// Track sonando ahora, si hay.
    pub fn current_track(&self) -> Option<Arc<Track>> {
        self.current.map_playing(|c| c.track.clone())
    }

    /// Copia de la cola pendiente, para mostrarla.
    pub fn queue_view(&self) -> (Vec<Arc<Track>>, Duration, LoopMode, bool) {
        let q = self.queue.lock();
        (q.tracks(), q.total_duration(), q.loop_mode(), q.shuffle())
    }

    /// Agrega un track y arranca el loop de reproducción. Devuelve el
    /// embed de confirmación para que el handler responda la interacción.
    pub async fn enqueue(self: &Arc<Self>, track: Arc<Track>) -> CreateEmbed {
        let result = { self.queue.lock().enqueue(track.clone()) };

        match result {
            Ok(()) => {
                let position = { self.queue.lock().len() };
                let confirmation = embeds::track_added(&track, position);
                self.process_queue(false).await;
                confirmation
            }
            Err(e) => embeds::notice(&e.to_string()),
        }
    }

    /// Agrega un lote (playlist/album) y arranca el loop. El embed
    /// devuelto reporta cuántos entraron y cuántos fallaron.
    pub async fn enqueue_batch(self: &Arc<Self>, batch: ResolvedBatch) -> CreateEmbed {
        let requested = batch.tracks.len() + batch.failed_count;
        let duration: Duration = batch.tracks.iter().map(|t| t.duration()).sum();
        let added = { self.queue.lock().enqueue_batch(batch.tracks) };

        let confirmation = embeds::batch_added(
            &batch.name,
            added,
            requested,
            batch.failed_count,
            duration,
        );
        self.process_queue(false).await;
        confirmation
    }

    /// Deja en espera la cola guardada de una sesión anterior hasta que
    /// alguien acepte o rechace continuarla.
    pub fn stash_resume(&self, tracks: Vec<Arc<Track>>) {
        *self.pending_resume.lock() = Some(tracks);
    }

    pub fn take_pending_resume(&self) -> Option<Vec<Arc<Track>>> {
        self.pending_resume.lock().take()
    }

    /// Cuántas canciones y cuánta duración hay en la cola en espera.
    pub fn pending_resume_summary(&self) -> Option<(usize, Duration)> {
        self.pending_resume
            .lock()
            .as_ref()
            .map(|tracks| (tracks.len(), tracks.iter().map(|t| t.duration()).sum()))
    }

    /// Loop de reproducción: toma el siguiente track según la política y
    /// lo arranca. Si el slot ya está ocupado (sonando o arrancando) no
    /// hace nada. Un track que no se deja materializar se notifica y se
    /// salta.
    pub async fn process_queue(self: &Arc<Self>, is_skip: bool) {
        if self.session.is_destroyed() {
            return;
        }
        // La reserva cierra la ventana entre mirar el slot y publicar el
        // handle, que cruza un await: dos avances simultáneos arrancarían
        // dos tracks.
        if !self.current.try_reserve() {
            return;
        }

        let mut skip = is_skip;
        loop {
            let next = { self.queue.lock().take_next(skip) };
            let Some(track) = next else {
                debug!("Cola vacía en guild {}", self.guild_id);
                self.current.release();
                return;
            };

            let input = match track.create_input(&self.stream_client) {
                Ok(input) => input,
                Err(e) => {
                    let err = MusicError::PlaybackSource(track.title.clone());
                    error!("❌ {}: {:#}", err, e);
                    self.send_embed(embeds::playback_failed(&track.title)).await;
                    // Un track fijado que falla no debe repetirse infinito.
                    skip = true;
                    continue;
                }
            };

            info!("🎵 Reproduciendo: {} en guild {}", track.title, self.guild_id);

            let handle = self.session.play(input, self.volume).await;

            let _ = handle.add_event(
                Event::Track(TrackEvent::End),
                TrackEndWatcher {
                    player: self.clone(),
                },
            );
            let _ = handle.add_event(
                Event::Track(TrackEvent::Error),
                TrackErrorWatcher {
                    player: self.clone(),
                    title: track.title.clone(),
                },
            );

            // El player pudo destruirse mientras el stream arrancaba.
            if self.session.is_destroyed() {
                let _ = handle.stop();
                self.current.release();
                return;
            }

            self.current.publish(CurrentTrack {
                handle,
                track: track.clone(),
            });

            let msg = self.send_embed_returning(embeds::now_playing(&track)).await;
            *self.now_playing_msg.lock() = msg;
            return;
        }
    }

    /// Un track llegó a su fin. Los eventos de tracks ya descartados (por
    /// skip o stop) se ignoran comparando el uuid del handle.
    async fn on_track_end(self: &Arc<Self>, ended: &TrackHandle) {
        if self.session.is_destroyed() {
            return;
        }

        if !self.current.clear_if(|c| c.handle.uuid() == ended.uuid()) {
            debug!("Fin de un track ya descartado en guild {}", self.guild_id);
            return;
        }

        self.delete_now_playing_message().await;

        if self.session.is_leaving() {
            return;
        }

        let (is_empty, mode) = {
            let q = self.queue.lock();
            (q.is_empty(), q.loop_mode())
        };

        if is_empty {
            match mode {
                LoopMode::Off => {
                    self.send_embed(embeds::queue_exhausted()).await;
                    return;
                }
                LoopMode::Queue => {
                    self.queue.lock().refill_from_looped();
                }
                // El track fijado se repite sin tocar la cola.
                LoopMode::Track => {}
            }
        }

        self.process_queue(false).await;
    }

    /// Un track falló a mitad de reproducción: se avisa y se sigue con el
    /// siguiente. Un track caído no puede frenar la cola.
    async fn on_track_error(self: &Arc<Self>, failed: &TrackHandle, title: &str) {
        // El aviso va después del chequeo de identidad: un error de un
        // track ya descartado no debe avisar dos veces.
        if !self.current.clear_if(|c| c.handle.uuid() == failed.uuid()) {
            debug!("Error de un track ya descartado en guild {}", self.guild_id);
            return;
        }

        error!("❌ Error reproduciendo `{}` en guild {}", title, self.guild_id);
        self.send_embed(embeds::playback_failed(title)).await;
        self.delete_now_playing_message().await;

        if self.session.is_leaving() || self.session.is_destroyed() {
            return;
        }

        self.process_queue(true).await;
    }

    /// Salta el track actual y avanza el loop.
    pub async fn skip(self: &Arc<Self>) -> Result<(), MusicError> {
        let Some(current) = self.current.take() else {
            return Err(MusicError::NothingPlaying);
        };

        info!("⏭️ Saltando `{}` en guild {}", current.track.title, self.guild_id);
        self.delete_now_playing_message().await;
        let _ = current.handle.stop();

        self.process_queue(true).await;
        Ok(())
    }

    /// Elimina la canción número `n` (1-based) y la devuelve.
    pub fn remove_at(&self, n: usize) -> Result<Arc<Track>, MusicError> {
        self.queue.lock().remove_at(n)
    }

    /// Vacía la cola y corta lo que esté sonando. Devuelve cuántas
    /// canciones pendientes se fueron.
    pub async fn clear_queue(&self) -> Result<usize, MusicError> {
        let removed = {
            let mut q = self.queue.lock();
            if q.is_empty() && !self.is_playing() {
                return Err(MusicError::AlreadyEmpty);
            }
            let removed = q.len();
            q.clear();
            removed
        };

        self.halt_playback().await;
        Ok(removed)
    }

    pub fn set_loop(&self, mode: LoopMode) -> Result<(), MusicError> {
        let now_playing = self.current_track();
        self.queue.lock().set_loop(mode, now_playing.as_ref())
    }

    pub fn set_shuffle(&self, on: bool) -> Result<(), MusicError> {
        self.queue.lock().set_shuffle(on)
    }

    pub fn pause(&self) -> Result<(), MusicError> {
        match self.current.map_playing(|c| {
            let _ = c.handle.pause();
        }) {
            Some(()) => {
                info!("⏸️ Pausado en guild {}", self.guild_id);
                Ok(())
            }
            None => Err(MusicError::NothingPlaying),
        }
    }

    pub fn resume(&self) -> Result<(), MusicError> {
        match self.current.map_playing(|c| {
            let _ = c.handle.play();
        }) {
            Some(()) => {
                info!("▶️ Reanudado en guild {}", self.guild_id);
                Ok(())
            }
            None => Err(MusicError::NothingPlaying),
        }
    }

    /// Programa la salida por abandono tras el período de gracia. Si ya
    /// hay un timer corriendo no hace nada.
    pub fn schedule_alone_departure(self: &Arc<Self>) {
        let mut timer = self.alone_timer.lock();
        if timer.is_some() {
            return;
        }

        debug!(
            "⏳ Solo en el canal de {}; me voy en {:?} si nadie vuelve",
            self.guild_id, self.alone_grace
        );

        let player = self.clone();
        let grace = self.alone_grace;
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            player.on_alone().await;
        }));
    }

    /// Alguien volvió al canal antes de que venciera la gracia.
    pub fn cancel_alone_departure(&self) {
        if let Some(timer) = self.alone_timer.lock().take() {
            timer.abort();
            debug!("⏳ Salida por abandono cancelada en {}", self.guild_id);
        }
    }

    /// Salida por abandono: guarda el snapshot de la cola para poder
    /// ofrecer continuarla en un próximo join, y recién después destruye
    /// la conexión. Es el único camino que guarda.
    async fn on_alone(self: &Arc<Self>) {
        if !self.session.begin_destroy() {
            return;
        }
        self.session.mark_leaving();

        info!("👋 Me quedé solo en guild {}, guardando la cola", self.guild_id);

        let snapshot = {
            let mut q = self.queue.lock();
            q.fold_looped_into_queue();
            q.drain_all()
        };

        self.halt_playback().await;
        self.session.disconnect_transport().await;
        self.registry.park(self.guild_id, snapshot);

        self.send_embed(embeds::farewell_alone()).await;
    }

    /// Salida explícita. No guarda snapshot: el usuario pidió irse. La
    /// despedida la responde el handler del comando.
    pub async fn leave(self: &Arc<Self>) {
        if !self.session.begin_destroy() {
            return;
        }
        self.session.mark_leaving();
        self.cancel_alone_departure();

        {
            self.queue.lock().drain_all();
        }
        self.halt_playback().await;
        self.session.disconnect_transport().await;
        self.registry.remove(self.guild_id);
    }

    /// Teardown terminal por desconexión irrecuperable. Corre una sola
    /// vez sin importar cuántos caminos converjan acá.
    async fn destroy(self: &Arc<Self>) {
        if !self.session.begin_destroy() {
            return;
        }
        self.cancel_alone_departure();

        {
            self.queue.lock().drain_all();
        }
        self.halt_playback().await;
        self.session.disconnect_transport().await;
        self.registry.remove(self.guild_id);

        info!("🗑️ Player destruido en guild {}", self.guild_id);
    }

    /// El driver se desconectó sin que lo pidiéramos: intenta recuperar
    /// según el tipo de cierre y destruye el player si no se puede.
    async fn on_driver_disconnect(self: Arc<Self>, recoverable: bool) {
        if self.session.is_destroyed() || self.session.is_leaving() {
            return;
        }

        match self.session.recover(recoverable).await {
            Ok(()) => info!("🔄 Conexión de voz recuperada en {}", self.guild_id),
            Err(_) => {
                self.send_embed(embeds::notice(
                    "Perdí la conexión de voz y no pude recuperarla 😔",
                ))
                .await;
                self.destroy().await;
            }
        }
    }

    async fn halt_playback(&self) {
        if let Some(current) = self.current.take() {
            let _ = current.handle.stop();
        }
        self.delete_now_playing_message().await;
    }

    async fn delete_now_playing_message(&self) {
        let msg = self.now_playing_msg.lock().take();
        if let Some(msg_id) = msg {
            let _ = self.text_channel.delete_message(&self.http, msg_id).await;
        }
    }

    /// Los mensajes de estado son best-effort: un fallo se loguea y nada
    /// más.
    async fn send_embed(&self, embed: CreateEmbed) {
        self.send_embed_returning(embed).await;
    }

    async fn send_embed_returning(&self, embed: CreateEmbed) -> Option<MessageId> {
        match self
            .text_channel
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await
        {
            Ok(msg) => Some(msg.id),
            Err(e) => {
                warn!("⚠️ No pude publicar el estado en {}: {}", self.guild_id, e);
                None
            }
        }
    }
}

fn attach_driver_watchers(call: &mut Call, player: &Arc<GuildMusicPlayer>) {
    call.add_global_event(
        Event::Core(CoreEvent::DriverConnect),
        DriverWatcher {
            player: player.clone(),
        },
    );
    call.add_global_event(
        Event::Core(CoreEvent::DriverReconnect),
        DriverWatcher {
            player: player.clone(),
        },
    );
    call.add_global_event(
        Event::Core(CoreEvent::DriverDisconnect),
        DriverWatcher {
            player: player.clone(),
        },
    );
}

/// Watcher para el fin de un track.
struct TrackEndWatcher {
    player: Arc<GuildMusicPlayer>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndWatcher {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(track_list) = ctx {
            for (_state, handle) in *track_list {
                self.player.on_track_end(handle).await;
            }
        }
        None
    }
}

/// Watcher para errores de un track.
struct TrackErrorWatcher {
    player: Arc<GuildMusicPlayer>,
    title: String,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorWatcher {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(track_list) = ctx {
            for (_state, handle) in *track_list {
                self.player.on_track_error(handle, &self.title).await;
            }
        }
        None
    }
}

/// Watcher de eventos del driver de voz: reconexiones y desconexiones.
struct DriverWatcher {
    player: Arc<GuildMusicPlayer>,
}

#[async_trait]
impl VoiceEventHandler for DriverWatcher {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        match ctx {
            EventContext::DriverConnect(_) | EventContext::DriverReconnect(_) => {
                self.player.session.reset_rejoin_attempts();
                debug!("🔌 Driver conectado en {}", self.player.guild_id);
            }
            EventContext::DriverDisconnect(data) => {
                let recoverable = VoiceSession::is_recoverable_close(data.reason.as_ref());
                warn!(
                    "🔌 Driver desconectado en {} (recuperable: {})",
                    self.player.guild_id, recoverable
                );
                // La recuperación duerme; no se bloquea el dispatcher.
                let player = self.player.clone();
                tokio::spawn(player.on_driver_disconnect(recoverable));
            }
            _ => {}
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_slot_single_reservation_wins() {
        let slot: PlaybackSlot<u32> = PlaybackSlot::new();

        assert!(slot.try_reserve());
        // El segundo avance ve el slot tomado y no arranca nada.
        assert!(!slot.try_reserve());

        slot.publish(7);
        assert!(!slot.try_reserve());
        assert_eq!(slot.take(), Some(7));
        assert!(slot.try_reserve());
    }

    #[test]
    fn test_slot_release_only_clears_reservation() {
        let slot: PlaybackSlot<u32> = PlaybackSlot::new();

        assert!(slot.try_reserve());
        slot.release();
        assert!(!slot.is_occupied());

        assert!(slot.try_reserve());
        slot.publish(1);
        slot.release();
        // Un track ya publicado no se toca.
        assert!(slot.is_occupied());
    }

    #[test]
    fn test_slot_clear_if_ignores_stale_events() {
        let slot: PlaybackSlot<u32> = PlaybackSlot::new();
        assert!(slot.try_reserve());
        slot.publish(42);

        assert!(!slot.clear_if(|v| *v == 7));
        assert!(slot.is_occupied());

        assert!(slot.clear_if(|v| *v == 42));
        assert!(!slot.is_occupied());
    }

    #[test]
    fn test_slot_take_respects_foreign_reservation() {
        let slot: PlaybackSlot<u32> = PlaybackSlot::new();
        assert!(slot.try_reserve());

        // Un skip durante el arranque no roba la reserva ajena.
        assert_eq!(slot.take(), None);
        assert!(slot.is_occupied());
    }
}
