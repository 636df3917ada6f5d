use chrono::{DateTime, Utc};
use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::queue::{GuildQueueState, NowPlaying};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const BLURPLE: Colour = Colour::new(0x5865F2);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

const STANDARD_FOOTER: &str = "🎵 Guild Player";

/// Entradas visibles en `/queue`
pub const QUEUE_PAGE_SIZE: usize = 10;

/// Celdas de la barra de `/np`
pub const PROGRESS_CELLS: usize = 15;

/// Embed de `/np` con barra de progreso
pub fn create_now_playing_embed(now_playing: &NowPlaying, now: DateTime<Utc>) -> CreateEmbed {
    let elapsed = now_playing.elapsed(now);
    let duration = Duration::from_secs(now_playing.duration_secs);
    let title = if now_playing.is_paused() {
        "⏸️ En Pausa"
    } else {
        "🎶 Reproduciendo Ahora"
    };

    CreateEmbed::default()
        .title(title)
        .description(format!(
            "[{}]({})",
            now_playing.track.title(),
            now_playing.track.locator()
        ))
        .color(colors::BLURPLE)
        .field("Progreso", progress_bar(elapsed, duration, PROGRESS_CELLS), false)
        .field(
            "Tiempo",
            format!("`{} / {}`", format_clock(elapsed), format_clock(duration)),
            false,
        )
        .footer(CreateEmbedFooter::new(format!(
            "Solicitado por {}",
            now_playing.track.requested_by()
        )))
        .timestamp(Timestamp::now())
}

/// Embed de `/queue`: lo que suena y las primeras entradas pendientes
pub fn create_queue_embed(state: &GuildQueueState, now: DateTime<Utc>) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if state.is_empty() && !state.is_playing() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if let Some(current) = state.now_playing() {
        let status = if current.is_paused() { "⏸️" } else { "▶️" };
        embed = embed.field(
            format!("{} Reproduciendo", status),
            format!(
                "[{}]({}) • quedan {}",
                current.track.title(),
                current.track.locator(),
                humantime::format_duration(Duration::from_secs(state.remaining_secs(now)))
            ),
            false,
        );
    }

    let listing = queue_listing(state, QUEUE_PAGE_SIZE);
    embed = embed.description(if listing.is_empty() {
        "🎶 No hay más canciones en la cola".to_string()
    } else {
        listing
    });

    embed
        .footer(CreateEmbedFooter::new(format!(
            "{} en cola • {}",
            state.len(),
            STANDARD_FOOTER
        )))
        .timestamp(Timestamp::now())
}

/// Líneas numeradas `N. [título](url)`, con un "+N más" si no caben
pub fn queue_listing(state: &GuildQueueState, limit: usize) -> String {
    let mut lines: Vec<String> = state
        .pending()
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, track)| format!("{}. [{}]({})", i + 1, track.title(), track.locator()))
        .collect();

    let hidden = state.len().saturating_sub(limit);
    if hidden > 0 {
        lines.push(format!("… y {} más", hidden));
    }

    lines.join("\n")
}

/// Barra `▰▱` de `cells` celdas. Sin duración conocida queda vacía.
pub fn progress_bar(elapsed: Duration, duration: Duration, cells: usize) -> String {
    let filled = if duration.is_zero() {
        0
    } else {
        let ratio = (elapsed.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0);
        ((ratio * cells as f64).floor() as usize).min(cells)
    };

    "▰".repeat(filled) + &"▱".repeat(cells - filled)
}

/// `m:ss`, o `h:mm:ss` a partir de una hora
pub fn format_clock(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::Track;
    use pretty_assertions::assert_eq;

    fn state_with(count: usize) -> GuildQueueState {
        let tracks: Vec<serde_json::Value> = (1..=count)
            .map(|i| {
                serde_json::json!({
                    "title": format!("Canción {}", i),
                    "locator": format!("https://youtu.be/{}", i),
                    "requested_by": "ana",
                })
            })
            .collect();
        serde_json::from_value(serde_json::json!({ "pending": tracks })).unwrap()
    }

    #[test]
    fn progress_bar_fills_proportionally() {
        let total = Duration::from_secs(150);
        assert_eq!(progress_bar(Duration::ZERO, total, 15), "▱".repeat(15));
        assert_eq!(
            progress_bar(Duration::from_secs(75), total, 15),
            "▰".repeat(7) + &"▱".repeat(8)
        );
        assert_eq!(progress_bar(total, total, 15), "▰".repeat(15));
    }

    #[test]
    fn progress_bar_clamps_and_handles_unknown_duration() {
        let over = progress_bar(Duration::from_secs(500), Duration::from_secs(100), 15);
        assert_eq!(over, "▰".repeat(15));

        let unknown = progress_bar(Duration::from_secs(30), Duration::ZERO, 15);
        assert_eq!(unknown, "▱".repeat(15));
    }

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(Duration::from_secs(0)), "0:00");
        assert_eq!(format_clock(Duration::from_secs(65)), "1:05");
        assert_eq!(format_clock(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn listing_is_numbered_markdown() {
        let listing = queue_listing(&state_with(2), QUEUE_PAGE_SIZE);
        assert_eq!(
            listing,
            "1. [Canción 1](https://youtu.be/1)\n2. [Canción 2](https://youtu.be/2)"
        );
    }

    #[test]
    fn listing_truncates_with_overflow_line() {
        let listing = queue_listing(&state_with(13), QUEUE_PAGE_SIZE);
        let lines: Vec<&str> = listing.lines().collect();

        assert_eq!(lines.len(), 11);
        assert!(lines[9].starts_with("10. [Canción 10]"));
        assert_eq!(lines[10], "… y 3 más");
    }

    #[test]
    fn empty_listing_is_blank() {
        assert_eq!(queue_listing(&GuildQueueState::default(), QUEUE_PAGE_SIZE), "");
    }

    #[test]
    fn now_playing_embed_uses_requester_footer() {
        let started = Utc::now();
        let np = NowPlaying::new(Track::new("Tema", "https://youtu.be/t", "ana"), started, 120);
        let embed = create_now_playing_embed(&np, started + chrono::Duration::seconds(60));

        let json = serde_json::to_value(&embed).unwrap();
        assert_eq!(json["footer"]["text"], "Solicitado por ana");
        assert_eq!(json["fields"][1]["value"], "`1:00 / 2:00`");
        assert_eq!(json["fields"][0]["value"], "▰".repeat(7) + &"▱".repeat(8));
    }
}
