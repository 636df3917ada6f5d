use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,

    // Búsqueda
    pub search_timeout_secs: u64,
    pub ytdlp_path: String,

    // Paths
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,

            // Búsqueda
            search_timeout_secs: std::env::var("SEARCH_TIMEOUT_SECS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),

            // Paths
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string())
                .into(),
        };

        std::fs::create_dir_all(&config.data_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Valida los valores cargados.
    ///
    /// - El volumen debe estar entre 0.0 y 2.0
    /// - Tamaño de cola y timeout de búsqueda mayores a 0
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN está vacío");
        }

        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.search_timeout_secs == 0 {
            anyhow::bail!("Search timeout must be greater than 0");
        }

        Ok(())
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    /// Resumen para logs, sin el token
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: Guild {}\n  \
            Audio: {}% vol, {} max queue\n  \
            Search: {} ({}s timeout)\n  \
            Data: {}",
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.ytdlp_path,
            self.search_timeout_secs,
            self.data_dir.display()
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin default, debe venir del entorno)
            discord_token: String::new(),
            guild_id: None,

            default_volume: 0.5,
            max_queue_size: 1000,

            search_timeout_secs: 20,
            ytdlp_path: "yt-dlp".to_string(),

            data_dir: "./data".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_token() -> Config {
        Config {
            discord_token: "token".into(),
            ..Config::default()
        }
    }

    #[test]
    fn defaults_validate_once_a_token_is_set() {
        assert!(Config::default().validate().is_err());
        assert!(with_token().validate().is_ok());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let loud = Config {
            default_volume: 3.0,
            ..with_token()
        };
        assert!(loud.validate().is_err());

        let no_queue = Config {
            max_queue_size: 0,
            ..with_token()
        };
        assert!(no_queue.validate().is_err());
    }

    #[test]
    fn summary_never_contains_the_token() {
        let config = Config {
            discord_token: "super-secret".into(),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("50% vol"));
        assert!(summary.contains("20s timeout"));
    }
}
