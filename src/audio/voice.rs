use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use songbird::{
    input::{Compose, Input, YoutubeDl},
    tracks::{ControlError, TrackHandle, TrackResult},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::{
    audio::transport::{OpenedStream, Player, TrackEnd, Transport},
    error::{PlaybackError, PlaybackResult},
};

/// Transporte real: songbird + yt-dlp
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    volume: f32,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client, volume: f32) -> Self {
        Self {
            manager,
            http,
            volume,
        }
    }
}

#[async_trait]
impl Transport for SongbirdTransport {
    type Player = SongbirdPlayer;

    async fn open_stream(&self, locator: &str) -> PlaybackResult<OpenedStream<Input>> {
        info!("🎵 Abriendo stream: {}", locator);

        let mut source = YoutubeDl::new(self.http.clone(), locator.to_string());

        // aux_metadata ejecuta yt-dlp: si el video no es accesible falla aquí
        let metadata = source
            .aux_metadata()
            .await
            .map_err(|e| PlaybackError::StreamOpenFailure {
                locator: locator.to_string(),
                reason: e.to_string(),
            })?;

        Ok(OpenedStream {
            stream: Input::from(source),
            duration_secs: metadata.duration.map(|d| d.as_secs()),
        })
    }

    fn new_player(&self, guild_id: GuildId) -> SongbirdPlayer {
        SongbirdPlayer {
            guild_id,
            manager: Arc::clone(&self.manager),
            volume: self.volume,
            current: Mutex::new(None),
        }
    }

    async fn destroy(&self, guild_id: GuildId) {
        if self.manager.get(guild_id).is_none() {
            debug!("Sin llamada de voz que cerrar en guild {}", guild_id);
            return;
        }

        match self.manager.remove(guild_id).await {
            Ok(()) => info!("👋 Desconectado del canal de voz en guild {}", guild_id),
            Err(e) => warn!("⚠️ Error al cerrar la llamada de guild {}: {:?}", guild_id, e),
        }
    }
}

/// Reproductor de una guild sobre su `Call` de songbird
pub struct SongbirdPlayer {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    volume: f32,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdPlayer {
    fn with_current(
        &self,
        action: impl FnOnce(&TrackHandle) -> TrackResult<()>,
    ) -> PlaybackResult<()> {
        let current = self.current.lock();
        let handle = current.as_ref().ok_or(PlaybackError::NothingPlaying)?;
        action(handle).map_err(|e| PlaybackError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Player for SongbirdPlayer {
    type Stream = Input;

    async fn attach(&self, stream: Input) -> PlaybackResult<oneshot::Receiver<TrackEnd>> {
        let call = self
            .manager
            .get(self.guild_id)
            .ok_or(PlaybackError::NotConnected)?;

        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(tx)));

        let handle = {
            let mut call = call.lock().await;
            call.play_only_input(stream)
        };

        if let Err(e) = handle.set_volume(self.volume) {
            warn!("⚠️ No se pudo fijar el volumen en guild {}: {}", self.guild_id, e);
        }

        for (event, on_error) in [(TrackEvent::End, false), (TrackEvent::Error, true)] {
            let notifier = TrackEndNotifier {
                guild_id: self.guild_id,
                on_error,
                slot: Arc::clone(&slot),
            };
            if let Err(e) = handle.add_event(Event::Track(event), notifier) {
                // el track terminó antes de poder escucharlo
                if let Some(tx) = slot.lock().take() {
                    let _ = tx.send(TrackEnd::Error(e.to_string()));
                }
                break;
            }
        }

        *self.current.lock() = Some(handle);
        Ok(rx)
    }

    fn pause(&self) -> PlaybackResult<()> {
        self.with_current(|handle| handle.pause())
    }

    fn resume(&self) -> PlaybackResult<()> {
        self.with_current(|handle| handle.play())
    }

    fn stop(&self) -> PlaybackResult<()> {
        self.with_current(|handle| already_finished_is_ok(handle.stop()))
    }
}

/// Un track que terminó solo ya tiene su señal en camino; cortarlo no es error
fn already_finished_is_ok(result: TrackResult<()>) -> TrackResult<()> {
    match result {
        Err(ControlError::Finished) => Ok(()),
        other => other,
    }
}

/// Reenvía la primera señal terminal del track al driver
struct TrackEndNotifier {
    guild_id: GuildId,
    on_error: bool,
    slot: Arc<Mutex<Option<oneshot::Sender<TrackEnd>>>>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let signal = if self.on_error {
            let details = match ctx {
                EventContext::Track(tracks) => tracks
                    .iter()
                    .map(|(state, _)| format!("{:?}", state.playing))
                    .collect::<Vec<_>>()
                    .join(", "),
                _ => "error desconocido".to_string(),
            };
            error!("❌ Error en track para guild {}: {}", self.guild_id, details);
            TrackEnd::Error(details)
        } else {
            debug!("Track terminado en guild {}", self.guild_id);
            TrackEnd::Finished
        };

        if let Some(tx) = self.slot.lock().take() {
            let _ = tx.send(signal);
        }

        None
    }
}
