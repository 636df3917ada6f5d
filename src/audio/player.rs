use chrono::Utc;
use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::{future::Future, sync::Arc};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        queue::{GuildQueue, GuildQueueState, NowPlaying, Track},
        registry::SessionRegistry,
        transport::{Player, TrackEnd, Transport},
    },
    error::{PlaybackError, PlaybackResult},
    sources::{self, TrackResolver},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Loading,
    Playing,
    Paused,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseOutcome {
    Paused,
    Resumed,
}

/// Estado del driver de una guild, protegido por su mutex.
///
/// `epoch` cambia en cada carga y en cada stop; una carga o señal terminal
/// con un epoch viejo se descarta.
struct GuildControl {
    state: PlayerState,
    epoch: u64,
}

impl GuildControl {
    fn begin_loading(&mut self) -> u64 {
        self.state = PlayerState::Loading;
        self.epoch += 1;
        self.epoch
    }

    fn is_loading(&self, epoch: u64) -> bool {
        self.epoch == epoch && self.state == PlayerState::Loading
    }

    fn is_active(&self, epoch: u64) -> bool {
        self.epoch == epoch && matches!(self.state, PlayerState::Playing | PlayerState::Paused)
    }
}

/// Máquina de estados de reproducción por guild.
///
/// Es el único componente que toca a la vez la [`GuildQueue`] y el
/// [`SessionRegistry`]. Todo avance pasa por [`PlaybackDriver::play_next`],
/// que corre en su propio task para cada carga.
pub struct PlaybackDriver<T: Transport> {
    queue: Arc<GuildQueue>,
    registry: Arc<SessionRegistry<T::Player>>,
    transport: Arc<T>,
    resolver: Arc<dyn TrackResolver>,
    controls: DashMap<GuildId, Arc<Mutex<GuildControl>>>,
}

impl<T: Transport> PlaybackDriver<T> {
    pub fn new(
        queue: Arc<GuildQueue>,
        registry: Arc<SessionRegistry<T::Player>>,
        transport: Arc<T>,
        resolver: Arc<dyn TrackResolver>,
    ) -> Self {
        Self {
            queue,
            registry,
            transport,
            resolver,
            controls: DashMap::new(),
        }
    }

    pub async fn state(&self, guild_id: GuildId) -> PlayerState {
        self.control(guild_id).lock().await.state
    }

    /// Resuelve la consulta y la agrega a la cola.
    ///
    /// `connect` solo corre cuando hay resultado, así una búsqueda fallida no
    /// deja al bot esperando en el canal de voz.
    pub async fn enqueue<F, Fut>(
        self: &Arc<Self>,
        guild_id: GuildId,
        query: &str,
        requested_by: &str,
        connect: F,
    ) -> PlaybackResult<Track>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PlaybackResult<()>>,
    {
        let track = sources::resolve_query(self.resolver.as_ref(), query, requested_by).await?;
        connect().await?;
        self.enqueue_track(guild_id, track.clone()).await?;
        Ok(track)
    }

    /// Agrega un track ya resuelto; si la guild estaba inactiva arranca la carga
    pub async fn enqueue_track(
        self: &Arc<Self>,
        guild_id: GuildId,
        track: Track,
    ) -> PlaybackResult<usize> {
        let len = self.queue.enqueue(guild_id, track)?;
        self.registry
            .get_or_create(guild_id, || self.transport.new_player(guild_id));

        let control = self.control(guild_id);
        let mut ctl = control.lock().await;
        if ctl.state == PlayerState::Idle {
            let epoch = ctl.begin_loading();
            drop(ctl);
            self.spawn_loading(guild_id, epoch);
        }

        Ok(len)
    }

    /// Corta el track actual; el avance lo hace la señal terminal del reproductor
    pub async fn skip(&self, guild_id: GuildId) -> PlaybackResult<()> {
        let control = self.control(guild_id);
        let ctl = control.lock().await;

        match ctl.state {
            PlayerState::Playing | PlayerState::Paused => {
                let player = self
                    .registry
                    .get(guild_id)
                    .ok_or(PlaybackError::NothingPlaying)?;
                player.stop()?;
                info!("⏭️ Track saltado en guild {}", guild_id);
                Ok(())
            }
            _ => Err(PlaybackError::NothingPlaying),
        }
    }

    pub async fn pause_toggle(&self, guild_id: GuildId) -> PlaybackResult<PauseOutcome> {
        let control = self.control(guild_id);
        let mut ctl = control.lock().await;

        let paused = match ctl.state {
            PlayerState::Playing => true,
            PlayerState::Paused => false,
            _ => return Err(PlaybackError::NothingPlaying),
        };

        let player = self
            .registry
            .get(guild_id)
            .ok_or(PlaybackError::NothingPlaying)?;

        if paused {
            player.pause()?;
            ctl.state = PlayerState::Paused;
            info!("⏸️ Reproducción pausada en guild {}", guild_id);
        } else {
            player.resume()?;
            ctl.state = PlayerState::Playing;
            info!("▶️ Reproducción reanudada en guild {}", guild_id);
        }

        self.registry.set_paused(guild_id, paused);
        self.queue.set_paused(guild_id, paused, Utc::now());

        Ok(if paused {
            PauseOutcome::Paused
        } else {
            PauseOutcome::Resumed
        })
    }

    /// Detiene todo: vacía la cola, suelta el reproductor y cierra la conexión.
    /// Llamarlo de nuevo deja el mismo estado.
    pub async fn stop(&self, guild_id: GuildId) {
        let control = self.control(guild_id);
        let mut ctl = control.lock().await;

        ctl.state = PlayerState::Stopping;
        ctl.epoch += 1;

        if let Some(player) = self.registry.remove(guild_id) {
            if let Err(e) = player.stop() {
                debug!("Nada que detener en guild {}: {}", guild_id, e);
            }
        }
        self.transport.destroy(guild_id).await;
        let cleared = self.queue.reset(guild_id);

        ctl.state = PlayerState::Idle;
        info!("⏹️ Reproducción detenida en guild {} ({} tracks descartados)", guild_id, cleared);
    }

    pub fn move_track(&self, guild_id: GuildId, from: usize, to: usize) -> PlaybackResult<Track> {
        self.queue.move_track(guild_id, from, to)
    }

    pub fn clear(&self, guild_id: GuildId) -> usize {
        self.queue.clear(guild_id)
    }

    pub fn snapshot(&self, guild_id: GuildId) -> GuildQueueState {
        self.queue.snapshot(guild_id)
    }

    pub fn is_paused(&self, guild_id: GuildId) -> bool {
        self.registry.is_paused(guild_id)
    }

    pub fn active_sessions(&self) -> usize {
        self.registry.active_sessions()
    }

    fn spawn_loading(self: &Arc<Self>, guild_id: GuildId, epoch: u64) {
        let driver = Arc::clone(self);
        tokio::spawn(async move {
            driver.play_next(guild_id, epoch).await;
        });
    }

    /// Estado `Loading`: saca tracks hasta que uno abra o la cola se agote.
    ///
    /// Como mucho un intento por cada track que había al empezar, así una cola
    /// donde todo falla termina en `Idle`.
    async fn play_next(self: &Arc<Self>, guild_id: GuildId, epoch: u64) {
        let control = self.control(guild_id);
        let attempts = self.queue.len(guild_id).max(1);

        for attempt in 1..=attempts {
            let track = {
                let mut ctl = control.lock().await;
                if !ctl.is_loading(epoch) {
                    debug!("Carga cancelada en guild {}", guild_id);
                    return;
                }
                match self.queue.dequeue_next(guild_id) {
                    Ok(track) => track,
                    Err(_) => {
                        ctl.state = PlayerState::Idle;
                        info!("📭 Cola vacía en guild {}", guild_id);
                        return;
                    }
                }
            };

            debug!("🔄 Intento {}/{}: {}", attempt, attempts, track.title());
            // sin el lock: yt-dlp puede tardar varios segundos
            let opened = self.transport.open_stream(track.locator()).await;

            let mut ctl = control.lock().await;
            if !ctl.is_loading(epoch) {
                info!("🚫 Stream de {} descartado, la guild {} se detuvo", track.title(), guild_id);
                return;
            }

            let opened = match opened {
                Ok(opened) => opened,
                Err(e) => {
                    warn!("❌ {} no se pudo abrir, probando el siguiente: {}", track.title(), e);
                    continue;
                }
            };

            let player = self
                .registry
                .get_or_create(guild_id, || self.transport.new_player(guild_id));

            match player.attach(opened.stream).await {
                Ok(end) => {
                    info!("🎵 Reproduciendo en guild {}: {}", guild_id, track.title());
                    let now_playing =
                        NowPlaying::new(track, Utc::now(), opened.duration_secs.unwrap_or(0));
                    self.queue.start_playing(guild_id, now_playing);
                    self.registry.set_paused(guild_id, false);
                    ctl.state = PlayerState::Playing;
                    self.watch_track_end(guild_id, epoch, end);
                    return;
                }
                Err(PlaybackError::NotConnected) => {
                    warn!("🔌 Sin conexión de voz en guild {}, sesión terminada", guild_id);
                    self.queue.requeue_front(guild_id, track);
                    self.registry.remove(guild_id);
                    ctl.state = PlayerState::Idle;
                    return;
                }
                Err(e) => {
                    warn!("❌ No se pudo adjuntar {}: {}", track.title(), e);
                    continue;
                }
            }
        }

        let mut ctl = control.lock().await;
        if !ctl.is_loading(epoch) {
            return;
        }

        // lo encolado durante esta pasada no despertó al driver
        if self.queue.len(guild_id) > 0 {
            let next_epoch = ctl.begin_loading();
            drop(ctl);
            debug!("{} intentos agotados en guild {}, nueva pasada", attempts, guild_id);
            self.spawn_loading(guild_id, next_epoch);
        } else {
            warn!(
                "⚠️ {} intentos fallidos seguidos en guild {}, queda inactiva",
                attempts, guild_id
            );
            ctl.state = PlayerState::Idle;
        }
    }

    fn watch_track_end(
        self: &Arc<Self>,
        guild_id: GuildId,
        epoch: u64,
        end: oneshot::Receiver<TrackEnd>,
    ) {
        let driver = Arc::clone(self);
        tokio::spawn(async move {
            let signal = end
                .await
                .unwrap_or_else(|_| TrackEnd::Error("el reproductor se cerró sin señal".into()));
            driver.on_track_end(guild_id, epoch, signal).await;
        });
    }

    /// `Finished` y `Error` avanzan igual
    async fn on_track_end(self: &Arc<Self>, guild_id: GuildId, epoch: u64, signal: TrackEnd) {
        let control = self.control(guild_id);
        let mut ctl = control.lock().await;

        if !ctl.is_active(epoch) {
            debug!("Señal vieja ignorada en guild {}: {:?}", guild_id, signal);
            return;
        }

        match &signal {
            TrackEnd::Finished => debug!("✅ Track terminado en guild {}", guild_id),
            TrackEnd::Error(details) => {
                error!("❌ Error de transporte en guild {}: {}", guild_id, details)
            }
        }

        self.queue.finish_current(guild_id);
        self.registry.set_paused(guild_id, false);
        let next_epoch = ctl.begin_loading();
        drop(ctl);

        self.spawn_loading(guild_id, next_epoch);
    }

    fn control(&self, guild_id: GuildId) -> Arc<Mutex<GuildControl>> {
        self.controls
            .entry(guild_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(GuildControl {
                    state: PlayerState::Idle,
                    epoch: 0,
                }))
            })
            .clone()
    }
}
