//! Contrato que el driver necesita del transporte de voz.
//!
//! El driver no conoce songbird: abre streams, los entrega a un reproductor y
//! espera la única señal terminal de cada stream adjuntado.

use async_trait::async_trait;
use serenity::model::id::GuildId;
use tokio::sync::oneshot;

use crate::error::PlaybackResult;

/// Señal terminal de un stream adjuntado. Llega exactamente una vez.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackEnd {
    Finished,
    Error(String),
}

/// Stream abierto y listo para adjuntar
pub struct OpenedStream<S> {
    pub stream: S,
    pub duration_secs: Option<u64>,
}

#[async_trait]
pub trait Player: Send + Sync + 'static {
    type Stream: Send + 'static;

    /// Empieza a reproducir `stream`; el receptor entrega su señal terminal.
    ///
    /// Devuelve [`PlaybackError::NotConnected`](crate::error::PlaybackError::NotConnected)
    /// si la guild ya no tiene conexión de voz.
    async fn attach(&self, stream: Self::Stream) -> PlaybackResult<oneshot::Receiver<TrackEnd>>;

    fn pause(&self) -> PlaybackResult<()>;

    fn resume(&self) -> PlaybackResult<()>;

    /// Corta el stream actual; su señal terminal se emite igualmente
    fn stop(&self) -> PlaybackResult<()>;
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Player: Player;

    async fn open_stream(
        &self,
        locator: &str,
    ) -> PlaybackResult<OpenedStream<<Self::Player as Player>::Stream>>;

    fn new_player(&self, guild_id: GuildId) -> Self::Player;

    /// Destruye la conexión de voz de la guild, si existe
    async fn destroy(&self, guild_id: GuildId);
}
