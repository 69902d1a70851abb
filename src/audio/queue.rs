use rand::Rng;
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tracing::{debug, info};

use crate::audio::track::Track;
use crate::error::MusicError;

/// Modo de repetición de la cola. Solo uno activo a la vez.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Off,
    Track,
    Queue,
}

impl LoopMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopMode::Off => "off",
            LoopMode::Track => "track",
            LoopMode::Queue => "queue",
        }
    }
}

/// Cola de reproducción de un guild.
///
/// FIFO por defecto; con shuffle activo cada pop elige un índice aleatorio.
/// `looped_track` solo existe en modo `Track`; `looped_queue` acumula lo ya
/// reproducido en modo `Queue` hasta que la cola viva se agota.
///
/// Todas las mutaciones corren bajo el mutex del player: ninguna operación
/// de acá espera ni bloquea.
#[derive(Debug)]
pub struct PlaybackQueue {
    items: VecDeque<Arc<Track>>,
    loop_mode: LoopMode,
    shuffle: bool,
    looped_track: Option<Arc<Track>>,
    looped_queue: Vec<Arc<Track>>,
    max_size: usize,
}

impl PlaybackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            loop_mode: LoopMode::Off,
            shuffle: false,
            looped_track: None,
            looped_queue: Vec::new(),
            max_size,
        }
    }

    /// Agrega un track al final de la cola.
    pub fn enqueue(&mut self, track: Arc<Track>) -> anyhow::Result<()> {
        if self.items.len() >= self.max_size {
            anyhow::bail!("La cola está llena (máximo {} canciones)", self.max_size);
        }

        info!("➕ Agregado a la cola: {}", track.title);
        self.items.push_back(track);
        Ok(())
    }

    /// Agrega un lote de tracks (playlist). Devuelve cuántos entraron.
    pub fn enqueue_batch(&mut self, tracks: Vec<Arc<Track>>) -> usize {
        let available = self.max_size.saturating_sub(self.items.len());
        let added = tracks.len().min(available);

        for track in tracks.into_iter().take(added) {
            self.items.push_back(track);
        }

        info!("➕ Agregadas {} canciones a la cola", added);
        added
    }

    /// Saca el siguiente track según la política de loop/shuffle.
    ///
    /// En modo `Track` sin skip devuelve el track fijado sin tocar la cola.
    /// Un skip en modo `Track` saca uno nuevo y lo fija; si la cola está
    /// vacía el track fijado se limpia y la reproducción termina.
    pub fn take_next(&mut self, is_skip: bool) -> Option<Arc<Track>> {
        if self.loop_mode == LoopMode::Track && !is_skip {
            // Sin track fijado (el último se saltó con la cola vacía)
            // se cae al pop normal, que fija lo que salga.
            if let Some(pinned) = &self.looped_track {
                return Some(pinned.clone());
            }
        }

        let popped = self.pop_by_shuffle_mode();

        match self.loop_mode {
            LoopMode::Track => {
                self.looped_track = popped.clone();
            }
            LoopMode::Queue => {
                if let Some(track) = &popped {
                    debug!("🔁 {} vuelve a la rotación cuando la cola se agote", track.title);
                    self.looped_queue.push(track.clone());
                }
            }
            LoopMode::Off => {}
        }

        popped
    }

    fn pop_by_shuffle_mode(&mut self) -> Option<Arc<Track>> {
        if self.shuffle && !self.items.is_empty() {
            let index = rand::thread_rng().gen_range(0..self.items.len());
            self.items.remove(index)
        } else {
            self.items.pop_front()
        }
    }

    /// Elimina la canción número `n` (1-based) y la devuelve.
    pub fn remove_at(&mut self, n: usize) -> Result<Arc<Track>, MusicError> {
        if n < 1 || n > self.items.len() {
            return Err(MusicError::IndexOutOfRange(n));
        }

        // El rango ya se validó.
        let removed = self.items.remove(n - 1).expect("índice validado");
        debug!("🗑️ Eliminado de la cola: {}", removed.title);
        Ok(removed)
    }

    /// Vacía la cola viva y los buffers de repetición. El modo de loop
    /// queda como estaba.
    pub fn clear(&mut self) {
        self.items.clear();
        self.looped_track = None;
        self.looped_queue.clear();
        info!("🗑️ Cola limpiada");
    }

    /// Cambia el modo shuffle; repetir el mismo estado es un error.
    pub fn set_shuffle(&mut self, on: bool) -> Result<(), MusicError> {
        if self.shuffle == on {
            return Err(MusicError::AlreadyInMode);
        }
        self.shuffle = on;
        info!("🔀 Shuffle: {}", if on { "activado" } else { "desactivado" });
        Ok(())
    }

    /// Cambia el modo de loop aplicando las transiciones de salida/entrada.
    ///
    /// Salir de `Queue` devuelve `looped_queue` al frente de la cola viva;
    /// salir de `Track` limpia el track fijado. Al entrar a `Track` se fija
    /// `now_playing` (sin nada sonando se rechaza); al entrar a `Queue`,
    /// `now_playing` abre la rotación.
    pub fn set_loop(
        &mut self,
        mode: LoopMode,
        now_playing: Option<&Arc<Track>>,
    ) -> Result<(), MusicError> {
        if self.loop_mode == mode {
            return Err(MusicError::AlreadyInMode);
        }
        // Fijar el modo Track sin nada sonando dejaría un pin vacío que
        // frena la cola.
        if mode == LoopMode::Track && now_playing.is_none() {
            return Err(MusicError::NothingPlaying);
        }

        match self.loop_mode {
            LoopMode::Track => self.looped_track = None,
            LoopMode::Queue => {
                for track in self.looped_queue.drain(..).rev() {
                    self.items.push_front(track);
                }
            }
            LoopMode::Off => {}
        }

        self.loop_mode = mode;

        match mode {
            LoopMode::Track => self.looped_track = now_playing.cloned(),
            LoopMode::Queue => {
                if let Some(track) = now_playing {
                    self.looped_queue.push(track.clone());
                }
            }
            LoopMode::Off => {}
        }

        info!("🔁 Modo de repetición: {}", mode.as_str());
        Ok(())
    }

    /// Rellena la cola viva desde `looped_queue` cuando se agotó en modo
    /// `Queue`. La rotación arranca de nuevo en el mismo orden.
    pub fn refill_from_looped(&mut self) {
        debug_assert!(self.items.is_empty());
        self.items = self.looped_queue.drain(..).collect();
        info!("🔁 Cola rellenada con {} canciones", self.items.len());
    }

    /// Devuelve `looped_queue` al final de la cola viva (camino de salida
    /// por abandono, antes de guardar el snapshot).
    pub fn fold_looped_into_queue(&mut self) {
        self.items.extend(self.looped_queue.drain(..));
    }

    /// Vacía la cola por completo y devuelve los tracks en orden.
    pub fn drain_all(&mut self) -> Vec<Arc<Track>> {
        self.looped_track = None;
        self.looped_queue.clear();
        self.items.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    /// Copia de los tracks en orden, para mostrar la cola.
    pub fn tracks(&self) -> Vec<Arc<Track>> {
        self.items.iter().cloned().collect()
    }

    /// Duración total de lo pendiente en la cola.
    pub fn total_duration(&self) -> Duration {
        self.items.iter().map(|t| t.duration()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    fn track(title: &str, duration_secs: u64) -> Arc<Track> {
        Arc::new(Track::new(
            format!("https://youtu.be/{title}"),
            Some(title.to_string()),
            None,
            duration_secs,
            Some("tester".to_string()),
            None,
            UserId::new(1),
        ))
    }

    fn queue_with(titles: &[&str]) -> PlaybackQueue {
        let mut queue = PlaybackQueue::new(100);
        for title in titles {
            queue.enqueue(track(title, 60)).unwrap();
        }
        queue
    }

    #[test]
    fn test_fifo_order_and_total_duration() {
        let mut queue = PlaybackQueue::new(100);
        queue.enqueue(track("Song A", 180)).unwrap();
        queue.enqueue(track("Song B", 120)).unwrap();

        assert_eq!(queue.total_duration(), Duration::from_secs(300));
        assert_eq!(queue.take_next(false).unwrap().title, "Song A");
        assert_eq!(queue.take_next(false).unwrap().title, "Song B");
        assert!(queue.take_next(false).is_none());
    }

    #[test]
    fn test_shuffle_pop_removes_exactly_one() {
        let mut queue = queue_with(&["a", "b", "c", "d"]);
        queue.set_shuffle(true).unwrap();

        let before = queue.len();
        let popped = queue.take_next(false);
        assert!(popped.is_some());
        assert_eq!(queue.len(), before - 1);
        assert!(!queue
            .tracks()
            .iter()
            .any(|t| Arc::ptr_eq(t, popped.as_ref().unwrap())));
    }

    #[test]
    fn test_shuffle_eventually_picks_non_head() {
        // Con 2 elementos y shuffle, el que no es cabeza tiene que salir
        // primero en alguno de 200 intentos.
        let mut saw_non_head = false;
        for _ in 0..200 {
            let mut queue = queue_with(&["head", "tail"]);
            queue.set_shuffle(true).unwrap();
            if queue.take_next(false).unwrap().title == "tail" {
                saw_non_head = true;
                break;
            }
        }
        assert!(saw_non_head);
    }

    #[test]
    fn test_loop_track_returns_same_descriptor() {
        let mut queue = queue_with(&["a", "b"]);
        let first = queue.take_next(false).unwrap();
        queue.set_loop(LoopMode::Track, Some(&first)).unwrap();

        for _ in 0..5 {
            let again = queue.take_next(false).unwrap();
            assert!(Arc::ptr_eq(&first, &again));
        }
        // La cola no se tocó.
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_loop_track_skip_advances_and_repins() {
        let mut queue = queue_with(&["a", "b"]);
        let first = queue.take_next(false).unwrap();
        queue.set_loop(LoopMode::Track, Some(&first)).unwrap();

        let next = queue.take_next(true).unwrap();
        assert_eq!(next.title, "b");
        // El nuevo track quedó fijado.
        assert!(Arc::ptr_eq(&next, &queue.take_next(false).unwrap()));
    }

    #[test]
    fn test_loop_track_skip_on_empty_clears_pin() {
        let mut queue = queue_with(&["a"]);
        let first = queue.take_next(false).unwrap();
        queue.set_loop(LoopMode::Track, Some(&first)).unwrap();

        assert!(queue.take_next(true).is_none());
        assert!(queue.take_next(false).is_none());
    }

    #[test]
    fn test_loop_track_while_idle_is_rejected() {
        let mut queue = queue_with(&["a", "b"]);

        assert!(matches!(
            queue.set_loop(LoopMode::Track, None),
            Err(MusicError::NothingPlaying)
        ));
        // La política no cambió y la cola sigue avanzando normal.
        assert_eq!(queue.loop_mode(), LoopMode::Off);
        assert_eq!(queue.take_next(false).unwrap().title, "a");
    }

    #[test]
    fn test_loop_track_repins_after_pin_cleared() {
        let mut queue = queue_with(&["a"]);
        let first = queue.take_next(false).unwrap();
        queue.set_loop(LoopMode::Track, Some(&first)).unwrap();
        // Saltar con la cola vacía limpia el pin pero deja el modo.
        assert!(queue.take_next(true).is_none());

        queue.enqueue(track("b", 60)).unwrap();
        let next = queue.take_next(false).unwrap();
        assert_eq!(next.title, "b");
        // El nuevo track quedó fijado.
        assert!(Arc::ptr_eq(&next, &queue.take_next(false).unwrap()));
    }

    #[test]
    fn test_clear_drops_loop_buffers() {
        let mut queue = queue_with(&["a", "b"]);
        let first = queue.take_next(false).unwrap();
        queue.set_loop(LoopMode::Track, Some(&first)).unwrap();

        queue.clear();
        // Ni el pin ni la rotación reviven después de limpiar.
        assert!(queue.take_next(false).is_none());
        queue.enqueue(track("c", 60)).unwrap();
        assert_eq!(queue.take_next(false).unwrap().title, "c");
    }

    #[test]
    fn test_loop_queue_replays_in_order() {
        let mut queue = queue_with(&["A", "B", "C"]);
        queue.set_loop(LoopMode::Queue, None).unwrap();

        let first_pass: Vec<String> = (0..3)
            .map(|_| queue.take_next(false).unwrap().title.clone())
            .collect();
        assert_eq!(first_pass, vec!["A", "B", "C"]);
        assert!(queue.is_empty());

        queue.refill_from_looped();
        let second_pass: Vec<String> = (0..3)
            .map(|_| queue.take_next(false).unwrap().title.clone())
            .collect();
        assert_eq!(second_pass, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_leaving_queue_mode_splices_to_front() {
        let mut queue = queue_with(&["A", "B", "C"]);
        queue.set_loop(LoopMode::Queue, None).unwrap();

        queue.take_next(false);
        queue.take_next(false);
        // Quedan: [C]; ya sonaron: [A, B].

        queue.set_loop(LoopMode::Off, None).unwrap();
        let order: Vec<String> = queue.tracks().iter().map(|t| t.title.clone()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_remove_at_bounds() {
        let mut queue = queue_with(&["a", "b", "c"]);

        assert!(matches!(queue.remove_at(0), Err(MusicError::IndexOutOfRange(0))));
        assert!(matches!(queue.remove_at(4), Err(MusicError::IndexOutOfRange(4))));
        assert_eq!(queue.len(), 3);

        let removed = queue.remove_at(2).unwrap();
        assert_eq!(removed.title, "b");
        let order: Vec<String> = queue.tracks().iter().map(|t| t.title.clone()).collect();
        assert_eq!(order, vec!["a", "c"]);
    }

    #[test]
    fn test_set_loop_same_mode_is_rejected() {
        let mut queue = queue_with(&["a"]);
        let current = queue.take_next(false).unwrap();

        queue.set_loop(LoopMode::Track, Some(&current)).unwrap();
        assert!(matches!(
            queue.set_loop(LoopMode::Track, Some(&current)),
            Err(MusicError::AlreadyInMode)
        ));
        // El track fijado no cambió.
        assert!(Arc::ptr_eq(&current, &queue.take_next(false).unwrap()));
    }

    #[test]
    fn test_set_shuffle_same_state_is_rejected() {
        let mut queue = queue_with(&[]);
        assert!(matches!(queue.set_shuffle(false), Err(MusicError::AlreadyInMode)));
        queue.set_shuffle(true).unwrap();
        assert!(matches!(queue.set_shuffle(true), Err(MusicError::AlreadyInMode)));
    }

    #[test]
    fn test_enqueue_batch_respects_capacity() {
        let mut queue = PlaybackQueue::new(3);
        queue.enqueue(track("a", 10)).unwrap();

        let batch = vec![track("b", 10), track("c", 10), track("d", 10)];
        assert_eq!(queue.enqueue_batch(batch), 2);
        assert_eq!(queue.len(), 3);
        assert!(queue.enqueue(track("e", 10)).is_err());
    }

    #[test]
    fn test_fold_looped_appends_to_back() {
        let mut queue = queue_with(&["A", "B"]);
        queue.set_loop(LoopMode::Queue, None).unwrap();
        queue.take_next(false);
        // Viva: [B]; rotación: [A].

        queue.fold_looped_into_queue();
        let order: Vec<String> = queue.tracks().iter().map(|t| t.title.clone()).collect();
        assert_eq!(order, vec!["B", "A"]);
    }
}
