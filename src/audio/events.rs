use serenity::model::id::{ChannelId, GuildId};

use crate::sources::Candidate;

/// A dónde van los avisos de un guild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMetadata {
    pub text_channel: ChannelId,
    pub voice_channel_name: String,
}

/// Eventos emitidos por el reproductor
#[derive(Debug)]
pub enum PlayerEvent {
    Start {
        guild_id: GuildId,
        metadata: QueueMetadata,
        track: Candidate,
    },
    Error {
        guild_id: GuildId,
        metadata: QueueMetadata,
        track: Candidate,
        error: anyhow::Error,
    },
    TrackAdd {
        guild_id: GuildId,
        metadata: QueueMetadata,
        track: Candidate,
        queue_was_empty: bool,
    },
    EmptyQueue {
        guild_id: GuildId,
        metadata: QueueMetadata,
    },
    End {
        guild_id: GuildId,
        metadata: QueueMetadata,
        track: Candidate,
    },
}

impl PlayerEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::Start { guild_id, .. }
            | Self::Error { guild_id, .. }
            | Self::TrackAdd { guild_id, .. }
            | Self::EmptyQueue { guild_id, .. }
            | Self::End { guild_id, .. } => *guild_id,
        }
    }
}
