//! Fakes compartidos por los tests de audio y notificaciones.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::audio::engine::{FallbackPolicy, NodeOptions, PlayRequest, PlaybackEngine, VoiceBackend};
use crate::audio::events::QueueMetadata;
use crate::audio::session::SessionManager;
use crate::error::BlockFlag;
use crate::sources::{Candidate, MockSearchBackend, ProviderTag, Resolution, SourceResolver};
use crate::ui::notifications::{NotificationGate, Notifier};

/// `"a"` → candidate with source id `a` and title `A`.
pub fn candidates(ids: &[&str]) -> Vec<Candidate> {
    ids.iter()
        .map(|id| Candidate::new(*id, id.to_uppercase(), ProviderTag::WebSearch))
        .collect()
}

pub fn metadata() -> QueueMetadata {
    QueueMetadata {
        text_channel: ChannelId::new(100),
        voice_channel_name: "General".to_string(),
    }
}

pub fn request(guild_id: u64) -> PlayRequest {
    PlayRequest {
        guild_id: GuildId::new(guild_id),
        voice_channel: ChannelId::new(200),
        requested_by: UserId::new(300),
        node_options: NodeOptions {
            metadata: metadata(),
            leave_on_empty: true,
            leave_on_empty_cooldown: Duration::from_secs(60),
            leave_on_end: true,
            leave_on_end_cooldown: Duration::from_secs(60),
        },
    }
}

pub fn resolution(ids: &[&str], origin: ProviderTag) -> Resolution {
    Resolution {
        candidates: candidates(ids)
            .into_iter()
            .map(|c| c.with_provider(origin))
            .collect(),
        origin,
        service: None,
        effective_query: ids.first().map(|s| s.to_string()).unwrap_or_default(),
        lookup_failed: false,
    }
}

#[derive(Default)]
struct VoiceState {
    failures: HashMap<String, String>,
    played: Vec<Candidate>,
    connected: bool,
    playing: bool,
    teardowns: usize,
}

/// Transporte de voz en memoria
#[derive(Default)]
pub struct FakeVoice {
    state: Mutex<VoiceState>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeVoice {
    /// Every later `play` waits (as if still joining) until the returned gate is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    pub fn fail(&self, source_id: &str, message: &str) {
        self.state
            .lock()
            .failures
            .insert(source_id.to_string(), message.to_string());
    }

    pub fn played(&self) -> Vec<Candidate> {
        self.state.lock().played.clone()
    }

    pub fn played_ids(&self) -> Vec<String> {
        self.played().iter().map(|c| c.source_id().to_string()).collect()
    }

    pub fn teardowns(&self) -> usize {
        self.state.lock().teardowns
    }
}

#[async_trait]
impl VoiceBackend for FakeVoice {
    async fn play(&self, _request: &PlayRequest, candidate: &Candidate) -> Result<Candidate> {
        self.state.lock().played.push(candidate.clone());

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.state.lock();
        if let Some(message) = state.failures.get(candidate.source_id()) {
            anyhow::bail!("{}", message);
        }
        state.connected = true;
        state.playing = true;
        Ok(candidate.clone())
    }

    async fn is_connected(&self, _guild_id: GuildId) -> bool {
        self.state.lock().connected
    }

    async fn is_playing(&self, _guild_id: GuildId) -> bool {
        self.state.lock().playing
    }

    async fn teardown(&self, _guild_id: GuildId) {
        let mut state = self.state.lock();
        state.connected = false;
        state.playing = false;
        state.teardowns += 1;
    }
}

/// Guarda los mensajes en vez de enviarlos
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, _channel: ChannelId, content: String) -> Result<()> {
        if self.failing {
            anyhow::bail!("Missing Permissions");
        }
        self.messages.lock().push(content);
        Ok(())
    }
}

pub struct Harness {
    pub engine: PlaybackEngine,
    pub voice: Arc<FakeVoice>,
    pub notifier: Arc<RecordingNotifier>,
    pub sessions: Arc<SessionManager>,
    pub block: Arc<BlockFlag>,
}

impl Harness {
    pub fn new(backend: MockSearchBackend) -> Self {
        let voice = Arc::new(FakeVoice::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let sessions = Arc::new(SessionManager::new());
        let block = Arc::new(BlockFlag::new(Duration::from_secs(300)));

        let engine = PlaybackEngine::new(
            sessions.clone(),
            Arc::new(SourceResolver::new(Arc::new(backend), 5)),
            voice.clone(),
            Arc::new(NotificationGate::new(notifier.clone())),
            block.clone(),
            FallbackPolicy {
                max_attempts: 5,
                fallback_delay: Duration::ZERO,
            },
        );

        Self {
            engine,
            voice,
            notifier,
            sessions,
            block,
        }
    }
}
