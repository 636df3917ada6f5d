pub mod youtube;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::audio::queue::Track;
use crate::error::{PlaybackError, PlaybackResult};

pub use youtube::YouTubeClient;

/// Fuente que convierte una consulta del usuario en un [`Track`].
///
/// Cualquier error se trata como "sin resultado".
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Verifica si la consulta es un enlace reproducible de esta fuente
    fn is_direct_link(&self, query: &str) -> bool;

    /// Resuelve un enlace directo
    async fn resolve_direct(&self, url: &str, requested_by: &str) -> Result<Track>;

    /// Busca tracks en la fuente
    async fn search(&self, query: &str, limit: usize, requested_by: &str) -> Result<Vec<Track>>;

    /// Nombre de la fuente
    fn source_name(&self) -> &'static str;
}

/// Enlace directo → resolución directa; texto libre → primer resultado de búsqueda.
pub async fn resolve_query(
    resolver: &dyn TrackResolver,
    query: &str,
    requested_by: &str,
) -> PlaybackResult<Track> {
    let query = query.trim();
    let not_found = || PlaybackError::ResolutionFailure {
        query: query.to_string(),
    };

    if query.is_empty() {
        return Err(not_found());
    }

    if resolver.is_direct_link(query) {
        debug!("🔗 Enlace directo de {}: {}", resolver.source_name(), query);
        return match resolver.resolve_direct(query, requested_by).await {
            Ok(track) => Ok(track),
            Err(e) => {
                warn!("❌ No se pudo resolver {}: {:?}", query, e);
                Err(not_found())
            }
        };
    }

    info!("🔍 Buscando en {}: {}", resolver.source_name(), query);
    match resolver.search(query, 1, requested_by).await {
        Ok(results) => results.into_iter().next().ok_or_else(not_found),
        Err(e) => {
            warn!("❌ Error de búsqueda para `{}`: {:?}", query, e);
            Err(not_found())
        }
    }
}
