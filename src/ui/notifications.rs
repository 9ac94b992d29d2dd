//! # Notification Gate
//!
//! Every user-visible status line of a playback episode goes through here.
//! The gate drops duplicate "started playing" notices, hides "queued" notices
//! for fallback candidates and hides "Queue finished" while a fallback chain
//! is still running.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::audio::engine::ExhaustReason;
use crate::audio::events::QueueMetadata;
use crate::error::FailureKind;
use crate::sources::{Candidate, ProviderTag};

/// Envío de mensajes de texto a un canal
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel: ChannelId, content: String) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StartKey {
    episode: Option<u64>,
    source_id: String,
    index: Option<usize>,
}

impl StartKey {
    fn of(track: &Candidate) -> Self {
        let attempt = track.attempt();
        Self {
            episode: attempt.map(|a| a.episode),
            source_id: track.source_id().to_string(),
            index: attempt.map(|a| a.index),
        }
    }
}

pub struct NotificationGate {
    notifier: Arc<dyn Notifier>,
    announced: DashMap<GuildId, StartKey>,
}

impl NotificationGate {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            announced: DashMap::new(),
        }
    }

    /// Un único aviso de inicio por track
    pub async fn track_started(&self, guild_id: GuildId, metadata: &QueueMetadata, track: &Candidate) {
        let key = StartKey::of(track);
        if self.announced.get(&guild_id).is_some_and(|k| *k == key) {
            debug!("🔇 Aviso de inicio duplicado para {}", track.source_id());
            return;
        }
        self.announced.insert(guild_id, key);

        self.send(metadata.text_channel, started_message(track, &metadata.voice_channel_name))
            .await;
    }

    pub fn track_ended(&self, guild_id: GuildId, track: &Candidate) {
        let key = StartKey::of(track);
        self.announced.remove_if(&guild_id, |_, k| *k == key);
    }

    pub async fn track_queued(&self, metadata: &QueueMetadata, track: &Candidate, queue_was_empty: bool) {
        if queue_was_empty || track.is_fallback() {
            return;
        }
        self.send(metadata.text_channel, format!("🎶 | Track **{}** queued!", track.title()))
            .await;
    }

    /// `busy` = fallback en curso o algo sonando
    pub async fn queue_finished(&self, metadata: &QueueMetadata, busy: bool) {
        if busy {
            debug!("🔇 'Queue finished' suprimido");
            return;
        }
        self.send(
            metadata.text_channel,
            "Queue finished. Disconnecting from voice channel.".to_string(),
        )
        .await;
    }

    pub async fn trying_alternative(&self, channel: ChannelId, track: &Candidate, network: bool) {
        let (index, total) = track.attempt().map_or((0, 0), |a| (a.index, a.total));
        let content = if network {
            format!(
                "🌐 | Network issue, trying alternative ({}/{}): **{}**",
                index,
                total,
                track.title()
            )
        } else {
            format!("▶️ | Trying alternative ({}/{}): **{}**", index, total, track.title())
        };
        self.send(channel, content).await;
    }

    pub async fn rescue_attempt(&self, channel: ChannelId, track: &Candidate) {
        self.send(
            channel,
            format!(
                "🔍 | Direct link failed. Trying similar track by title: **{}**",
                track.title()
            ),
        )
        .await;
    }

    pub async fn exhausted(
        &self,
        channel: ChannelId,
        reason: ExhaustReason,
        origin: ProviderTag,
        attempts: usize,
        title: &str,
    ) {
        self.send(channel, exhausted_message(reason, origin, attempts, title))
            .await;
    }

    pub async fn fatal(&self, channel: ChannelId, kind: FailureKind, detail: &str) {
        let content = match kind {
            FailureKind::FatalSession => format!("❌ | Could not join your voice channel: {}", detail),
            _ => "⛔ | The content host is blocking playback right now. Please retry later or use a different source.".to_string(),
        };
        self.send(channel, content).await;
    }

    pub async fn track_error(&self, channel: ChannelId, track: &Candidate, detail: &str) {
        self.send(channel, format!("❌ | Error playing **{}**: {}", track.title(), detail))
            .await;
    }

    pub fn forget(&self, guild_id: GuildId) {
        self.announced.remove(&guild_id);
    }

    async fn send(&self, channel: ChannelId, content: String) {
        if let Err(e) = self.notifier.send(channel, content).await {
            warn!("⚠️ No se pudo enviar aviso a {}: {:#}", channel, e);
        }
    }
}

fn started_message(track: &Candidate, voice_channel: &str) -> String {
    match track.attempt() {
        Some(meta) if meta.rescue => format!(
            "✅ | Successfully playing alternative: **{}** in **{}**!",
            track.title(),
            voice_channel
        ),
        Some(meta) if meta.is_fallback => format!(
            "✅ | Successfully playing alternative ({}/{}): **{}** in **{}**!",
            meta.index,
            meta.total,
            track.title(),
            voice_channel
        ),
        _ => format!("🎶 | Started playing: **{}** in **{}**!", track.title(), voice_channel),
    }
}

fn exhausted_message(reason: ExhaustReason, origin: ProviderTag, attempts: usize, title: &str) -> String {
    if origin == ProviderTag::Attachment {
        return "❌ | This audio format is not supported. If it's a Twitter audio file, try converting it to a standard MP3 format before uploading.".to_string();
    }

    match reason {
        ExhaustReason::CapReached => format!(
            "❌ | I've tried {} different tracks, but they all failed. Please try a completely different song or artist.",
            attempts
        ),
        ExhaustReason::NoAlternatives => format!(
            "❌ | All alternative tracks failed. Please try a different search query like \"{0} lyrics\" or \"{0} audio\".",
            title
        ),
        ExhaustReason::RescueEmpty => format!(
            "❌ | Could not find any new alternatives for this track. Try searching for \"{0} lyrics\" or \"{0} audio\" instead, or try a completely different song.",
            title
        ),
        ExhaustReason::RescueFailed => format!(
            "❌ | Failed to play alternative track. Please try a different search query like \"{} lyrics\".",
            title
        ),
    }
}

/// Respuesta cuando la búsqueda no encontró nada
pub const NO_RESULTS: &str = "No results were found!";

pub const UNSUPPORTED_ATTACHMENT: &str =
    "❌ | The attachment must be an audio file (MP3, OGG, WAV, FLAC, M4A)!";

pub fn unreadable_attachment(twitter: bool) -> &'static str {
    if twitter {
        "❌ | Could not process this Twitter audio file. Twitter audio files may have compatibility issues with Discord bots. Try converting it to a standard MP3 file before uploading."
    } else {
        "❌ | Could not process this attachment as an audio file. Make sure it's a valid audio format."
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::AttemptMeta;
    use crate::testing::{metadata, RecordingNotifier};
    use pretty_assertions::assert_eq;

    fn gate() -> (NotificationGate, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        (NotificationGate::new(notifier.clone()), notifier)
    }

    fn selected(id: &str, index: usize, total: usize, rescue: bool) -> Candidate {
        Candidate::new(id, id.to_uppercase(), ProviderTag::WebSearch).selected(AttemptMeta {
            episode: 7,
            index,
            total,
            is_fallback: index > 1 || rescue,
            rescue,
        })
    }

    #[tokio::test]
    async fn test_one_start_notice_per_track() {
        let (gate, notifier) = gate();
        let guild = GuildId::new(1);
        let track = selected("a", 1, 3, false);

        gate.track_started(guild, &metadata(), &track).await;
        gate.track_started(guild, &metadata(), &track).await;
        assert_eq!(
            notifier.messages(),
            vec!["🎶 | Started playing: **A** in **General**!".to_string()]
        );

        // Tras terminar, una repetición (loop) se anuncia de nuevo
        gate.track_ended(guild, &track);
        gate.track_started(guild, &metadata(), &track).await;
        assert_eq!(notifier.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_start_notice_reflects_attempt() {
        let (gate, notifier) = gate();
        let guild = GuildId::new(1);

        gate.track_started(guild, &metadata(), &selected("b", 3, 3, false)).await;
        gate.track_started(guild, &metadata(), &selected("r", 2, 1, true)).await;
        gate.track_started(guild, &metadata(), &Candidate::new("q", "Q", ProviderTag::WebSearch))
            .await;

        assert_eq!(
            notifier.messages(),
            vec![
                "✅ | Successfully playing alternative (3/3): **B** in **General**!".to_string(),
                "✅ | Successfully playing alternative: **R** in **General**!".to_string(),
                "🎶 | Started playing: **Q** in **General**!".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_queued_notice_suppression() {
        let (gate, notifier) = gate();

        gate.track_queued(&metadata(), &selected("a", 1, 1, false), true).await;
        gate.track_queued(&metadata(), &selected("b", 2, 3, false), false).await;
        gate.track_queued(&metadata(), &Candidate::new("c", "C", ProviderTag::WebSearch), false)
            .await;

        assert_eq!(notifier.messages(), vec!["🎶 | Track **C** queued!".to_string()]);
    }

    #[tokio::test]
    async fn test_send_failures_are_swallowed() {
        let notifier = Arc::new(RecordingNotifier::failing());
        let gate = NotificationGate::new(notifier.clone());
        gate.queue_finished(&metadata(), false).await;
        assert!(notifier.messages().is_empty());
    }

    #[test]
    fn test_attachment_exhaustion_message() {
        let msg = exhausted_message(ExhaustReason::NoAlternatives, ProviderTag::Attachment, 1, "x.mp3");
        assert!(msg.contains("not supported"));
    }
}
