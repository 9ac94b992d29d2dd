use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::queue::{LoopMode, QueueInfo},
    sources::{lyrics::Lyrics, Candidate},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Encore";

/// Celdas de la barra de progreso
const PROGRESS_CELLS: usize = 20;

/// Embed de /nowplaying
pub fn create_now_playing_embed(track: &Candidate, position: Duration) -> CreateEmbed {
    let mut description = String::new();
    if let Some(author) = track.author() {
        description.push_str(&format!("Author: **{}**\n", author));
    }

    match track.duration() {
        Some(duration) => description.push_str(&format!(
            "Duration: **{}**\n\n{} `{} / {}`",
            format_duration(duration),
            progress_bar(position, duration),
            format_duration(position),
            format_duration(duration)
        )),
        None => description.push_str("Duration: **🔴 Live**"),
    }

    let mut embed = CreateEmbed::default()
        .title(track.title())
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .field("Requested by", format!("<@{}>", track.requested_by()), true);

    if track.source_id().starts_with("http") {
        embed = embed.url(track.source_id());
    }

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed de /lyrics
pub fn create_lyrics_embed(lyrics: &Lyrics) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(lyrics.title.as_deref().unwrap_or("Lyrics"))
        .description(lyrics.trimmed().unwrap_or_default())
        .color(colors::MUSIC_PURPLE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    if let Some(artist) = &lyrics.artist {
        embed = embed.author(CreateEmbedAuthor::new(artist));
    }

    embed
}

/// Texto de /queue: pista actual y lista numerada
pub fn queue_text(info: &QueueInfo) -> String {
    let current = info
        .current
        .as_ref()
        .map_or("Nothing", |item| item.title());

    let mut text = format!("**Currently Playing:** {}", current);
    match info.loop_mode {
        LoopMode::Track => text.push_str(" 🔂"),
        LoopMode::Queue => text.push_str(" 🔁"),
        LoopMode::Off => {}
    }

    text.push_str("\n\n**Queue:**\n");
    if info.items.is_empty() {
        text.push_str("Empty");
    } else {
        let lines: Vec<String> = info
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| format!("{}. {}", i + 1, item.title()))
            .collect();
        text.push_str(&lines.join("\n"));
    }

    if !info.recent.is_empty() {
        text.push_str("\n\n**Recently played:**\n");
        let lines: Vec<String> = info
            .recent
            .iter()
            .map(|item| format!("- {}", item.title()))
            .collect();
        text.push_str(&lines.join("\n"));
    }

    if info.total_duration > Duration::ZERO {
        text.push_str(&format!("\n\nTotal: {}", format_duration(info.total_duration)));
    }

    text
}

/// Embed de la cola, con el texto de [`queue_text`]
pub fn create_queue_embed(info: &QueueInfo) -> CreateEmbed {
    CreateEmbed::default()
        .title("📋 Queue")
        .description(truncate(&queue_text(info), 4000))
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea la barra de progreso `[▇▇▇———]`
fn progress_bar(position: Duration, total: Duration) -> String {
    let filled = if total.is_zero() {
        0
    } else {
        let ratio = position.as_secs_f64() / total.as_secs_f64();
        ((ratio * PROGRESS_CELLS as f64).round() as usize).min(PROGRESS_CELLS)
    };

    format!(
        "[{}{}]",
        "▇".repeat(filled),
        "—".repeat(PROGRESS_CELLS - filled)
    )
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars - 3).collect();
    cut.push_str("...");
    cut
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
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
    use crate::audio::queue::MusicQueue;
    use crate::sources::ProviderTag;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_progress_bar() {
        let total = Duration::from_secs(200);
        assert_eq!(progress_bar(Duration::ZERO, total), format!("[{}]", "—".repeat(20)));
        assert_eq!(
            progress_bar(Duration::from_secs(100), total),
            format!("[{}{}]", "▇".repeat(10), "—".repeat(10))
        );
        assert_eq!(progress_bar(Duration::from_secs(500), total), format!("[{}]", "▇".repeat(20)));
        assert_eq!(progress_bar(Duration::from_secs(5), Duration::ZERO), format!("[{}]", "—".repeat(20)));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(65)), "1:05");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn test_queue_text() {
        let mut queue = MusicQueue::new(10);
        for id in ["a", "b", "c"] {
            queue
                .add_track(Candidate::new(id, id.to_uppercase(), ProviderTag::WebSearch))
                .unwrap();
        }
        queue.next_track();

        assert_eq!(
            queue_text(&queue.get_info()),
            "**Currently Playing:** A\n\n**Queue:**\n1. B\n2. C"
        );

        queue.next_track();
        assert_eq!(
            queue_text(&queue.get_info()),
            "**Currently Playing:** B\n\n**Queue:**\n1. C\n\n**Recently played:**\n- A"
        );
    }
}
