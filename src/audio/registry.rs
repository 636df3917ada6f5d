use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::debug;

#[cfg(test)]
use crate::error::{PlaybackError, PlaybackResult};

/// Reproductor vivo de una guild
pub struct SessionEntry<P> {
    pub guild_id: GuildId,
    pub player: Arc<P>,
    pub paused: bool,
}

/// Mapa guild → reproductor. Como mucho un reproductor por guild.
pub struct SessionRegistry<P> {
    sessions: DashMap<GuildId, SessionEntry<P>>,
}

impl<P> SessionRegistry<P> {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Devuelve el reproductor de la guild o crea uno nuevo con `create`
    pub fn get_or_create(&self, guild_id: GuildId, create: impl FnOnce() -> P) -> Arc<P> {
        match self.sessions.entry(guild_id) {
            Entry::Occupied(entry) => Arc::clone(&entry.get().player),
            Entry::Vacant(entry) => {
                debug!("🎛️ Nuevo reproductor para guild {}", guild_id);
                let player = Arc::new(create());
                entry.insert(SessionEntry {
                    guild_id,
                    player: Arc::clone(&player),
                    paused: false,
                });
                player
            }
        }
    }

    /// Registra un reproductor explícito; falla si la guild ya tiene uno.
    /// El driver usa [`get_or_create`](Self::get_or_create), que nunca choca.
    #[cfg(test)]
    pub fn register(&self, guild_id: GuildId, player: P) -> PlaybackResult<Arc<P>> {
        match self.sessions.entry(guild_id) {
            Entry::Occupied(_) => Err(PlaybackError::AlreadyActive),
            Entry::Vacant(entry) => {
                let player = Arc::new(player);
                entry.insert(SessionEntry {
                    guild_id,
                    player: Arc::clone(&player),
                    paused: false,
                });
                Ok(player)
            }
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<P>> {
        self.sessions
            .get(&guild_id)
            .map(|entry| Arc::clone(&entry.player))
    }

    pub fn set_paused(&self, guild_id: GuildId, paused: bool) {
        if let Some(mut entry) = self.sessions.get_mut(&guild_id) {
            entry.paused = paused;
        }
    }

    pub fn is_paused(&self, guild_id: GuildId) -> bool {
        self.sessions
            .get(&guild_id)
            .map_or(false, |entry| entry.paused)
    }

    /// Quita el reproductor de la guild; no hace nada si no existe
    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<P>> {
        self.sessions.remove(&guild_id).map(|(_, entry)| {
            debug!("🧹 Reproductor de guild {} descartado", entry.guild_id);
            entry.player
        })
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

impl<P> Default for SessionRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy(u32);

    #[test]
    fn get_or_create_reuses_the_live_player() {
        let registry = SessionRegistry::new();
        let guild = GuildId::new(1);

        let first = registry.get_or_create(guild, || Dummy(1));
        let second = registry.get_or_create(guild, || Dummy(2));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.0, 1);
        assert_eq!(registry.active_sessions(), 1);
    }

    #[test]
    fn second_register_is_rejected() {
        let registry = SessionRegistry::new();
        let guild = GuildId::new(1);

        assert!(registry.register(guild, Dummy(1)).is_ok());
        assert_eq!(
            registry.register(guild, Dummy(2)).err(),
            Some(PlaybackError::AlreadyActive)
        );
        assert_eq!(registry.get(guild).map(|p| p.0), Some(1));
    }

    #[test]
    fn remove_is_a_noop_when_absent() {
        let registry: SessionRegistry<Dummy> = SessionRegistry::new();
        assert!(registry.remove(GuildId::new(4)).is_none());

        registry.get_or_create(GuildId::new(4), || Dummy(0));
        registry.set_paused(GuildId::new(4), true);
        assert!(registry.is_paused(GuildId::new(4)));

        assert!(registry.remove(GuildId::new(4)).is_some());
        assert!(registry.remove(GuildId::new(4)).is_none());
        assert!(!registry.is_paused(GuildId::new(4)));
    }
}
