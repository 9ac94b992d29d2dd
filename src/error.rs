//! # Error Module
//!
//! Domain errors for playback and attachment handling, plus the failure
//! taxonomy the fallback engine uses to decide between advancing to the next
//! candidate and tearing the voice session down.
//!
//! Backends are free to return opaque [`anyhow::Error`] values. [`classify`]
//! looks for a typed [`StreamError`] or [`PlaybackError`] first and only falls
//! back to message heuristics when none is found in the chain.

use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

/// Fallos de la sesión de voz; siempre fatales para el episodio
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The bot could not join or keep the voice channel.
    #[error("could not join the voice channel: {0}")]
    Connection(String),

    /// The guild's voice session was torn down while an attempt was pending.
    #[error("voice session is gone for guild {0}")]
    SessionGone(GuildId),
}

/// Fallo de stream ya clasificado por el adaptador de streams
#[derive(Debug, Error)]
#[error("stream failed for {source_id}: {message}")]
pub struct StreamError {
    pub source_id: String,
    pub message: String,
    pub kind: FailureKind,
}

/// Rechazos de adjuntos antes de cualquier búsqueda o reproducción
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttachmentError {
    #[error("unsupported attachment type: {0}")]
    UnsupportedType(String),

    #[error("attachment could not be read as audio: {name}")]
    Unreadable { name: String, twitter: bool },
}

/// How a failed play attempt is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Extraction/format/availability failure on this candidate only.
    RetryableContent,
    /// Timeout or connection failure; same budget, different message.
    RetryableNetwork,
    /// Rate-limit or IP-block; further attempts would fail the same way.
    FatalBlock,
    /// The voice session itself is unusable.
    FatalSession,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RetryableContent | Self::RetryableNetwork)
    }
}

const BLOCK_MARKERS: &[&str] = &[
    "status code: 429",
    "http error 429",
    "too many requests",
    "sign in to confirm you're not a bot",
    "sign in to confirm you’re not a bot",
    "ip block",
    "ip-block",
    "your ip",
];

/// Only meaningful next to a 403; a bare "blocked" is usually geo or copyright.
const RATE_LIMIT_HINTS: &[&str] = &[
    "rate limit",
    "rate-limit",
    "ratelimit",
    "rate limited",
    "not a bot",
    "bot check",
    "captcha",
];

const NETWORK_MARKERS: &[&str] = &[
    "timed out",
    "timeout",
    "connection reset",
    "connection refused",
    "connection closed",
    "network is unreachable",
    "dns error",
    "failed to lookup address",
    "broken pipe",
];

/// Clasifica un error de reproducción
pub fn classify(error: &anyhow::Error, block: &BlockFlag) -> FailureKind {
    if let Some(stream) = error.chain().find_map(|e| e.downcast_ref::<StreamError>()) {
        return escalate_if_blocked(stream.kind, block);
    }

    if error.chain().any(|e| e.is::<PlaybackError>()) {
        return FailureKind::FatalSession;
    }

    let message = format!("{:#}", error);
    escalate_if_blocked(classify_message(&message), block)
}

/// Heurística sobre el texto del error
pub fn classify_message(message: &str) -> FailureKind {
    let lower = message.to_lowercase();

    if BLOCK_MARKERS.iter().any(|m| lower.contains(m)) {
        return FailureKind::FatalBlock;
    }

    let forbidden = lower.contains("status code: 403") || lower.contains("http error 403");
    if forbidden && RATE_LIMIT_HINTS.iter().any(|m| lower.contains(m)) {
        return FailureKind::FatalBlock;
    }

    if NETWORK_MARKERS.iter().any(|m| lower.contains(m)) {
        return FailureKind::RetryableNetwork;
    }

    FailureKind::RetryableContent
}

fn escalate_if_blocked(kind: FailureKind, block: &BlockFlag) -> FailureKind {
    if kind.is_retryable() && block.is_active() {
        FailureKind::FatalBlock
    } else {
        kind
    }
}

/// Process-wide upstream block flag.
///
/// Set when any guild hits a fatal block, consulted by every other guild's
/// classification until the cooldown expires.
#[derive(Debug)]
pub struct BlockFlag {
    blocked_until: Mutex<Option<Instant>>,
    cooldown: Duration,
}

impl BlockFlag {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            blocked_until: Mutex::new(None),
            cooldown,
        }
    }

    pub fn trip(&self, reason: &str) {
        warn!(
            "⛔ Bloqueo upstream detectado ({}), activo durante {}",
            reason,
            humantime::format_duration(self.cooldown)
        );
        *self.blocked_until.lock() = Some(Instant::now() + self.cooldown);
    }

    pub fn is_active(&self) -> bool {
        let mut guard = self.blocked_until.lock();
        match *guard {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                *guard = None;
                false
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn clear(&self) {
        *self.blocked_until.lock() = None;
    }
}

impl Default for BlockFlag {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

/// Marca de bloqueo en un mensaje de pánico
pub fn looks_like_block(message: &str) -> bool {
    classify_message(message) == FailureKind::FatalBlock
}
