use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{sync::LazyLock, time::Duration};
use tokio::{sync::Semaphore, time::timeout};
use tracing::{debug, info};
use url::Url;

use super::TrackResolver;
use crate::audio::queue::Track;

static YOUTUBE_VIDEO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?(www\.|m\.)?(youtube\.com/(watch\?(.*&)?v=|embed/|v/|shorts/)|youtu\.be/|music\.youtube\.com/watch\?(.*&)?v=)[\w-]{6,}")
        .expect("regex de YouTube válida")
});

const YOUTUBE_HOSTS: [&str; 5] = [
    "www.youtube.com",
    "youtube.com",
    "youtu.be",
    "m.youtube.com",
    "music.youtube.com",
];

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
}

/// Cliente para resolver consultas con yt-dlp
pub struct YouTubeClient {
    ytdlp_path: String,
    search_timeout: Duration,
    // Limitar procesos de yt-dlp concurrentes
    rate_limiter: Semaphore,
}

impl YouTubeClient {
    pub fn new(ytdlp_path: impl Into<String>, search_timeout: Duration) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            search_timeout,
            rate_limiter: Semaphore::new(3),
        }
    }

    pub fn is_youtube_url(url: &str) -> bool {
        let host_ok = Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(|h| YOUTUBE_HOSTS.contains(&h)))
            .unwrap_or(false);

        host_ok && YOUTUBE_VIDEO.is_match(url)
    }

    async fn run_ytdlp(&self, args: &[&str]) -> Result<String> {
        let _permit = self.rate_limiter.acquire().await?;

        // si vence el timeout el future se descarta y el proceso muere con él
        let output = timeout(
            self.search_timeout,
            Command::new(&self.ytdlp_path)
                .kill_on_drop(true)
                .args(args)
                .output(),
        )
        .await
        .context("yt-dlp tardó demasiado")?
        .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn info_to_track(info: YtDlpInfo, requested_by: &str) -> Option<Track> {
        let locator = info
            .webpage_url
            .or_else(|| info.url.filter(|u| u.starts_with("http")))
            .or_else(|| info.id.map(|id| format!("https://www.youtube.com/watch?v={}", id)))?;
        let title = info.title.unwrap_or_else(|| "Desconocido".to_string());

        Some(Track::new(title, locator, requested_by))
    }
}

#[async_trait]
impl TrackResolver for YouTubeClient {
    fn is_direct_link(&self, query: &str) -> bool {
        Self::is_youtube_url(query)
    }

    async fn resolve_direct(&self, url: &str, requested_by: &str) -> Result<Track> {
        debug!("📊 Obteniendo info de: {}", url);

        let stdout = self
            .run_ytdlp(&["--no-playlist", "--dump-json", "--skip-download", "--no-warnings", url])
            .await?;
        let info: YtDlpInfo =
            serde_json::from_str(stdout.trim()).context("Error al parsear respuesta de yt-dlp")?;

        Self::info_to_track(info, requested_by)
            .ok_or_else(|| anyhow::anyhow!("yt-dlp no devolvió URL para {}", url))
    }

    async fn search(&self, query: &str, limit: usize, requested_by: &str) -> Result<Vec<Track>> {
        info!("🔍 Buscando en YouTube: {}", query);

        let search_query = format!("ytsearch{}:{}", limit.max(1), query);
        let stdout = self
            .run_ytdlp(&[
                "--no-playlist",
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .await?;

        Ok(stdout
            .lines()
            .filter_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
            .filter_map(|info| Self::info_to_track(info, requested_by))
            .take(limit)
            .collect())
    }

    fn source_name(&self) -> &'static str {
        "YouTube"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_youtube_url_detection() {
        assert!(YouTubeClient::is_youtube_url(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        ));
        assert!(YouTubeClient::is_youtube_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(YouTubeClient::is_youtube_url(
            "https://music.youtube.com/watch?v=dQw4w9WgXcQ"
        ));
        assert!(YouTubeClient::is_youtube_url(
            "https://m.youtube.com/watch?feature=share&v=dQw4w9WgXcQ"
        ));
        assert!(!YouTubeClient::is_youtube_url("https://example.com/video"));
        assert!(!YouTubeClient::is_youtube_url("https://www.youtube.com/"));
        assert!(!YouTubeClient::is_youtube_url("never gonna give you up"));
    }

    #[test]
    fn flat_search_entries_fall_back_to_id() {
        let line = r#"{"id":"dQw4w9WgXcQ","title":"Never Gonna Give You Up","url":"dQw4w9WgXcQ"}"#;
        let info: YtDlpInfo = serde_json::from_str(line).unwrap();
        let track = YouTubeClient::info_to_track(info, "ana").unwrap();

        assert_eq!(track.locator(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(track.title(), "Never Gonna Give You Up");
        assert_eq!(track.requested_by(), "ana");
    }

    #[test]
    fn entry_without_any_locator_is_dropped() {
        let info: YtDlpInfo = serde_json::from_str(r#"{"title":"x"}"#).unwrap();
        assert!(YouTubeClient::info_to_track(info, "ana").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timed_out_search_kills_ytdlp() {
        use std::os::unix::fs::PermissionsExt;

        // yt-dlp falso: tarda más que el timeout y después deja una marca
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("yt-dlp");
        let marker = dir.path().join("terminado");
        std::fs::write(
            &script,
            format!("#!/bin/sh\nsleep 1\ntouch '{}'\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let client = YouTubeClient::new(script.display().to_string(), Duration::from_millis(200));
        let result = client.search("lofi", 1, "ana").await;
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists(), "yt-dlp siguió corriendo después del timeout");
    }
}
