use thiserror::Error;

/// Errores del núcleo de reproducción.
///
/// Solo `ResolutionFailure`, `QueueFull`, `OutOfRange`, `NothingPlaying` y
/// `AlreadyActive` llegan al usuario. `StreamOpenFailure` y `Transport` se
/// registran en el log y el driver avanza al siguiente track.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("no se encontró ningún resultado para `{query}`")]
    ResolutionFailure { query: String },

    #[error("no se pudo abrir el stream de `{locator}`: {reason}")]
    StreamOpenFailure { locator: String, reason: String },

    #[error("error de transporte: {0}")]
    Transport(String),

    #[error("no hay conexión de voz activa")]
    NotConnected,

    #[error("posición fuera de rango: {position} (la cola tiene {len} canciones)")]
    OutOfRange { position: usize, len: usize },

    #[error("la cola está llena (máximo {max} canciones)")]
    QueueFull { max: usize },

    #[error("no hay nada reproduciéndose")]
    NothingPlaying,

    #[error("ya existe un reproductor activo en esta guild")]
    AlreadyActive,

    #[error("la cola está vacía")]
    Empty,
}

pub type PlaybackResult<T> = std::result::Result<T, PlaybackError>;
