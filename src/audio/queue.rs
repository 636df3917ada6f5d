use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serenity::model::id::GuildId;
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, info};

use crate::error::{PlaybackError, PlaybackResult};
use crate::storage::QueueWriter;

/// Track resuelto y listo para reproducirse. Inmutable una vez creado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    title: String,
    locator: String,
    requested_by: String,
}

impl Track {
    pub fn new(
        title: impl Into<String>,
        locator: impl Into<String>,
        requested_by: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            locator: locator.into(),
            requested_by: requested_by.into(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn requested_by(&self) -> &str {
        &self.requested_by
    }
}

/// Registro de la canción que suena ahora.
///
/// El tiempo transcurrido siempre se deriva de `started_at`; el tiempo en
/// pausa se acumula aparte y `started_at` nunca se modifica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub track: Track,
    pub started_at: DateTime<Utc>,
    /// 0 si la duración es desconocida
    pub duration_secs: u64,
    #[serde(default)]
    pub paused_total_ms: u64,
    #[serde(default)]
    pub paused_since: Option<DateTime<Utc>>,
}

impl NowPlaying {
    pub fn new(track: Track, started_at: DateTime<Utc>, duration_secs: u64) -> Self {
        Self {
            track,
            started_at,
            duration_secs,
            paused_total_ms: 0,
            paused_since: None,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_since.is_some()
    }

    /// Tiempo reproducido hasta `now`, descontando las pausas.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        let mut paused_ms = self.paused_total_ms as i64;
        if let Some(since) = self.paused_since {
            paused_ms += (now - since).num_milliseconds().max(0);
        }

        let played_ms = (now - self.started_at).num_milliseconds() - paused_ms;
        Duration::from_millis(played_ms.max(0) as u64)
    }

    fn mark_paused(&mut self, now: DateTime<Utc>) {
        if self.paused_since.is_none() {
            self.paused_since = Some(now);
        }
    }

    fn mark_resumed(&mut self, now: DateTime<Utc>) {
        if let Some(since) = self.paused_since.take() {
            self.paused_total_ms += (now - since).num_milliseconds().max(0) as u64;
        }
    }
}

/// Estado de la cola de una guild.
///
/// `is_playing` no se guarda como campo: es `now_playing.is_some()`, así que
/// ambos no pueden desincronizarse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredQueue", into = "StoredQueue")]
pub struct GuildQueueState {
    pending: VecDeque<Track>,
    now_playing: Option<NowPlaying>,
}

/// Formato en disco de [`GuildQueueState`].
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredQueue {
    #[serde(default)]
    pending: Vec<Track>,
    #[serde(default)]
    now_playing: Option<NowPlaying>,
    #[serde(default)]
    is_playing: bool,
}

impl From<StoredQueue> for GuildQueueState {
    fn from(stored: StoredQueue) -> Self {
        Self {
            pending: stored.pending.into(),
            now_playing: stored.now_playing,
        }
    }
}

impl From<GuildQueueState> for StoredQueue {
    fn from(state: GuildQueueState) -> Self {
        Self {
            is_playing: state.now_playing.is_some(),
            pending: state.pending.into(),
            now_playing: state.now_playing,
        }
    }
}

impl GuildQueueState {
    pub fn pending(&self) -> &VecDeque<Track> {
        &self.pending
    }

    pub fn now_playing(&self) -> Option<&NowPlaying> {
        self.now_playing.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.now_playing.is_some()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Duración conocida de lo que queda por sonar, en segundos
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        self.now_playing
            .as_ref()
            .map(|np| np.duration_secs.saturating_sub(np.elapsed(now).as_secs()))
            .unwrap_or(0)
    }

    fn push(&mut self, track: Track) -> usize {
        self.pending.push_back(track);
        self.pending.len()
    }

    fn pop_next(&mut self) -> Option<Track> {
        self.pending.pop_front()
    }

    /// Mueve un track entre posiciones 1-based, conservando el orden relativo del resto.
    fn move_track(&mut self, from: usize, to: usize) -> PlaybackResult<Track> {
        let len = self.pending.len();
        for position in [from, to] {
            if position == 0 || position > len {
                return Err(PlaybackError::OutOfRange { position, len });
            }
        }

        let track = self
            .pending
            .remove(from - 1)
            .ok_or(PlaybackError::OutOfRange { position: from, len })?;
        self.pending.insert(to - 1, track.clone());
        Ok(track)
    }

    /// Si el proceso se cayó con algo sonando, esa sesión ya no existe:
    /// el track vuelve al frente de la cola para la próxima reproducción.
    fn recover_interrupted(&mut self) -> bool {
        match self.now_playing.take() {
            Some(np) => {
                self.pending.push_front(np.track);
                true
            }
            None => false,
        }
    }
}

/// Colas de todas las guilds.
///
/// Cada mutación se aplica bajo el mutex de la guild y el snapshot resultante
/// se envía al [`QueueWriter`] dentro de la misma sección crítica, así el orden
/// de escritura en disco es el mismo que el de las mutaciones.
pub struct GuildQueue {
    states: DashMap<GuildId, Arc<Mutex<GuildQueueState>>>,
    writer: QueueWriter,
    max_size: usize,
}

impl GuildQueue {
    pub fn new(writer: QueueWriter, max_size: usize) -> Self {
        Self {
            states: DashMap::new(),
            writer,
            max_size,
        }
    }

    /// Carga los estados guardados al arrancar el proceso
    pub fn restore(&self, saved: HashMap<GuildId, GuildQueueState>) {
        let mut recovered = 0;
        for (guild_id, mut state) in saved {
            if state.recover_interrupted() {
                recovered += 1;
                self.writer.save(guild_id, state.clone());
            }
            self.states.insert(guild_id, Arc::new(Mutex::new(state)));
        }

        if recovered > 0 {
            info!("♻️ {} guilds tenían un track interrumpido, devuelto a la cola", recovered);
        }
    }

    /// Agrega un track al final de la cola y devuelve la nueva longitud
    pub fn enqueue(&self, guild_id: GuildId, track: Track) -> PlaybackResult<usize> {
        let max_size = self.max_size;
        let title = track.title().to_string();
        let len = self.mutate(guild_id, |state| {
            if state.len() >= max_size {
                return Err(PlaybackError::QueueFull { max: max_size });
            }
            Ok(state.push(track))
        })?;

        info!("➕ Agregado a la cola de {}: {} (#{})", guild_id, title, len);
        Ok(len)
    }

    /// Saca el primer track pendiente. Solo lo usa el driver.
    pub(crate) fn dequeue_next(&self, guild_id: GuildId) -> PlaybackResult<Track> {
        self.mutate(guild_id, |state| state.pop_next().ok_or(PlaybackError::Empty))
    }

    pub(crate) fn start_playing(&self, guild_id: GuildId, now_playing: NowPlaying) {
        let _ = self.mutate(guild_id, |state| {
            state.now_playing = Some(now_playing);
            Ok(())
        });
    }

    /// Limpia `now_playing` al terminar un track
    pub(crate) fn finish_current(&self, guild_id: GuildId) -> Option<NowPlaying> {
        self.mutate(guild_id, |state| Ok(state.now_playing.take()))
            .ok()
            .flatten()
    }

    pub(crate) fn set_paused(&self, guild_id: GuildId, paused: bool, now: DateTime<Utc>) {
        let _ = self.mutate(guild_id, |state| {
            let np = state.now_playing.as_mut().ok_or(PlaybackError::NothingPlaying)?;
            if paused {
                np.mark_paused(now);
            } else {
                np.mark_resumed(now);
            }
            Ok(())
        });
    }

    /// Devuelve un track al frente (la conexión se perdió antes de reproducirlo)
    pub(crate) fn requeue_front(&self, guild_id: GuildId, track: Track) {
        let _ = self.mutate(guild_id, |state| {
            state.pending.push_front(track);
            Ok(())
        });
    }

    /// Vacía cola y `now_playing` (stop / desconexión)
    pub(crate) fn reset(&self, guild_id: GuildId) -> usize {
        self.mutate(guild_id, |state| {
            let cleared = state.pending.len();
            state.pending.clear();
            state.now_playing = None;
            Ok(cleared)
        })
        .unwrap_or(0)
    }

    /// Mueve un track de posición (1-based)
    pub fn move_track(&self, guild_id: GuildId, from: usize, to: usize) -> PlaybackResult<Track> {
        let track = self.mutate(guild_id, |state| state.move_track(from, to))?;
        debug!("📍 Track movido de posición {} a {} en {}", from, to, guild_id);
        Ok(track)
    }

    /// Limpia los pendientes sin tocar lo que suena
    pub fn clear(&self, guild_id: GuildId) -> usize {
        let cleared = self
            .mutate(guild_id, |state| {
                let cleared = state.pending.len();
                state.pending.clear();
                Ok(cleared)
            })
            .unwrap_or(0);

        info!("🗑️ Cola limpiada en {}: {} tracks removidos", guild_id, cleared);
        cleared
    }

    /// Copia de solo lectura para los comandos de visualización
    pub fn snapshot(&self, guild_id: GuildId) -> GuildQueueState {
        self.state(guild_id).lock().clone()
    }

    pub fn len(&self, guild_id: GuildId) -> usize {
        self.state(guild_id).lock().len()
    }

    fn mutate<R>(
        &self,
        guild_id: GuildId,
        f: impl FnOnce(&mut GuildQueueState) -> PlaybackResult<R>,
    ) -> PlaybackResult<R> {
        let state = self.state(guild_id);
        let mut guard = state.lock();
        let result = f(&mut guard)?;
        self.writer.save(guild_id, guard.clone());
        Ok(result)
    }

    fn state(&self, guild_id: GuildId) -> Arc<Mutex<GuildQueueState>> {
        self.states
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(GuildQueueState::default())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JsonStorage;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn track(title: &str) -> Track {
        Track::new(title, format!("https://youtu.be/{}", title), "tester")
    }

    fn titles(state: &GuildQueueState) -> Vec<&str> {
        state.pending().iter().map(Track::title).collect()
    }

    fn abcd() -> GuildQueueState {
        let mut state = GuildQueueState::default();
        for t in ["A", "B", "C", "D"] {
            state.push(track(t));
        }
        state
    }

    async fn queue_in(dir: &tempfile::TempDir) -> (GuildQueue, QueueWriter, Arc<JsonStorage>) {
        let storage = Arc::new(JsonStorage::new(dir.path().to_path_buf()).await.unwrap());
        let writer = QueueWriter::spawn(storage.clone());
        (GuildQueue::new(writer.clone(), 3), writer, storage)
    }

    #[test]
    fn move_forward_keeps_relative_order() {
        let mut state = abcd();
        let moved = state.move_track(1, 3).unwrap();
        assert_eq!(moved.title(), "A");
        assert_eq!(titles(&state), vec!["B", "C", "A", "D"]);
    }

    #[test]
    fn move_last_to_front() {
        let mut state = abcd();
        state.move_track(4, 1).unwrap();
        assert_eq!(titles(&state), vec!["D", "A", "B", "C"]);
    }

    #[test]
    fn move_rejects_positions_outside_queue() {
        let mut state = abcd();
        assert_eq!(
            state.move_track(0, 1),
            Err(PlaybackError::OutOfRange { position: 0, len: 4 })
        );
        assert_eq!(
            state.move_track(5, 1),
            Err(PlaybackError::OutOfRange { position: 5, len: 4 })
        );
        assert_eq!(
            state.move_track(2, 9),
            Err(PlaybackError::OutOfRange { position: 9, len: 4 })
        );
        assert_eq!(titles(&state), vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn is_playing_follows_now_playing_through_serde() {
        let mut state = abcd();
        assert!(!state.is_playing());

        let next = state.pop_next().unwrap();
        state.now_playing = Some(NowPlaying::new(next, Utc::now(), 200));

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["isPlaying"], true);
        assert_eq!(json["pending"].as_array().unwrap().len(), 3);

        let back: GuildQueueState = serde_json::from_value(json).unwrap();
        assert!(back.is_playing());
        assert_eq!(back, state);
    }

    #[test]
    fn stale_is_playing_flag_is_ignored_on_load() {
        let raw = r#"{"pending":[],"nowPlaying":null,"isPlaying":true}"#;
        let state: GuildQueueState = serde_json::from_str(raw).unwrap();
        assert!(!state.is_playing());
        assert!(state.now_playing().is_none());
    }

    #[test]
    fn elapsed_excludes_paused_time() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let mut np = NowPlaying::new(track("A"), start, 300);

        np.mark_paused(start + chrono::Duration::seconds(30));
        assert!(np.is_paused());
        // sigue congelado mientras está en pausa
        assert_eq!(np.elapsed(start + chrono::Duration::seconds(90)).as_secs(), 30);

        np.mark_resumed(start + chrono::Duration::seconds(100));
        assert_eq!(np.started_at, start);
        assert_eq!(np.elapsed(start + chrono::Duration::seconds(110)).as_secs(), 40);
    }

    #[test]
    fn interrupted_track_goes_back_to_front() {
        let mut state = abcd();
        let a = state.pop_next().unwrap();
        state.now_playing = Some(NowPlaying::new(a, Utc::now(), 0));

        assert!(state.recover_interrupted());
        assert!(!state.is_playing());
        assert_eq!(titles(&state), vec!["A", "B", "C", "D"]);
        assert!(!state.recover_interrupted());
    }

    #[tokio::test]
    async fn enqueue_reports_length_and_respects_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, _writer, _storage) = queue_in(&dir).await;
        let guild = GuildId::new(1);

        assert_eq!(queue.enqueue(guild, track("A")), Ok(1));
        assert_eq!(queue.enqueue(guild, track("B")), Ok(2));
        assert_eq!(queue.enqueue(guild, track("C")), Ok(3));
        assert_eq!(
            queue.enqueue(guild, track("D")),
            Err(PlaybackError::QueueFull { max: 3 })
        );
        assert_eq!(queue.len(guild), 3);
    }

    #[tokio::test]
    async fn guilds_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, _writer, _storage) = queue_in(&dir).await;

        queue.enqueue(GuildId::new(1), track("A")).unwrap();
        queue.enqueue(GuildId::new(2), track("B")).unwrap();
        queue.clear(GuildId::new(1));

        assert!(queue.snapshot(GuildId::new(1)).is_empty());
        assert_eq!(titles(&queue.snapshot(GuildId::new(2))), vec!["B"]);
    }

    #[tokio::test]
    async fn clear_keeps_now_playing() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, _writer, _storage) = queue_in(&dir).await;
        let guild = GuildId::new(7);

        queue.enqueue(guild, track("A")).unwrap();
        queue.enqueue(guild, track("B")).unwrap();
        let a = queue.dequeue_next(guild).unwrap();
        queue.start_playing(guild, NowPlaying::new(a, Utc::now(), 10));

        assert_eq!(queue.clear(guild), 1);
        let snap = queue.snapshot(guild);
        assert!(snap.is_empty());
        assert_eq!(snap.now_playing().map(|np| np.track.title()), Some("A"));
    }

    #[tokio::test]
    async fn dequeue_on_empty_queue_signals_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, _writer, _storage) = queue_in(&dir).await;
        assert_eq!(queue.dequeue_next(GuildId::new(3)), Err(PlaybackError::Empty));
    }

    #[tokio::test]
    async fn every_mutation_sequence_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(JsonStorage::new(dir.path().to_path_buf()).await.unwrap());
        let writer = QueueWriter::spawn(storage.clone());
        let queue = GuildQueue::new(writer.clone(), 100);
        let guild = GuildId::new(42);

        for t in ["A", "B", "C", "D", "E"] {
            queue.enqueue(guild, track(t)).unwrap();
            writer.flush().await;
            assert_eq!(storage.load_queue(guild).await, queue.snapshot(guild));
        }

        queue.move_track(guild, 5, 2).unwrap();
        writer.flush().await;
        assert_eq!(storage.load_queue(guild).await, queue.snapshot(guild));

        assert!(queue.move_track(guild, 6, 1).is_err());
        queue.move_track(guild, 1, 4).unwrap();
        writer.flush().await;
        assert_eq!(storage.load_queue(guild).await, queue.snapshot(guild));

        queue.clear(guild);
        writer.flush().await;
        assert_eq!(storage.load_queue(guild).await, queue.snapshot(guild));
    }

    #[tokio::test]
    async fn restore_requeues_interrupted_playback() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, _writer, _storage) = queue_in(&dir).await;
        let guild = GuildId::new(9);

        let mut saved = GuildQueueState::default();
        saved.push(track("B"));
        saved.now_playing = Some(NowPlaying::new(track("A"), Utc::now(), 60));

        queue.restore(HashMap::from([(guild, saved)]));

        let snap = queue.snapshot(guild);
        assert!(!snap.is_playing());
        assert_eq!(titles(&snap), vec!["A", "B"]);
    }
}
