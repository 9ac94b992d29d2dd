//! # Playback Attempt Engine
//!
//! Drives one playback episode per guild: try a candidate, classify the
//! failure, then advance to the next candidate, rescue a dead direct link by
//! title, or give up. Both entry points (a user command and a player error
//! event) run the same loop, so the termination checks live in one place:
//!
//! ```text
//! RESOLVING ─▶ ATTEMPTING(1) ─▶ ATTEMPTING(n+1) ─▶ … ─▶ SUCCEEDED
//!                    │                 │
//!                    ├──▶ RESCUING ────┼──▶ SUCCEEDED | EXHAUSTED
//!                    └──▶ EXHAUSTED    └──▶ FATAL (teardown once)
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::events::{PlayerEvent, QueueMetadata};
use super::session::{EpisodeTicket, GuildEpisode, SessionManager};
use crate::config::Config;
use crate::error::{classify, BlockFlag, FailureKind};
use crate::sources::{AttemptMeta, Candidate, ProviderTag, Resolution, SourceResolver};
use crate::ui::notifications::NotificationGate;

/// Opciones de la sesión de voz de un guild
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOptions {
    pub metadata: QueueMetadata,
    pub leave_on_empty: bool,
    pub leave_on_empty_cooldown: Duration,
    pub leave_on_end: bool,
    pub leave_on_end_cooldown: Duration,
}

impl NodeOptions {
    pub fn from_config(config: &Config, metadata: QueueMetadata) -> Self {
        Self {
            metadata,
            leave_on_empty: config.leave_on_empty,
            leave_on_empty_cooldown: Duration::from_millis(config.leave_on_empty_cooldown_ms),
            leave_on_end: config.leave_on_end,
            leave_on_end_cooldown: Duration::from_millis(config.leave_on_end_cooldown_ms),
        }
    }
}

/// Petición de reproducción de un usuario
#[derive(Debug, Clone, PartialEq)]
pub struct PlayRequest {
    pub guild_id: GuildId,
    pub voice_channel: ChannelId,
    pub requested_by: UserId,
    pub node_options: NodeOptions,
}

impl PlayRequest {
    pub fn text_channel(&self) -> ChannelId {
        self.node_options.metadata.text_channel
    }
}

/// Transporte de voz (songbird en producción)
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    /// Plays the candidate now, or queues it behind the current track.
    async fn play(&self, request: &PlayRequest, candidate: &Candidate) -> Result<Candidate>;
    async fn is_connected(&self, guild_id: GuildId) -> bool;
    async fn is_playing(&self, guild_id: GuildId) -> bool;
    /// Stop, leave and forget the guild's voice session. Idempotent.
    async fn teardown(&self, guild_id: GuildId);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackPolicy {
    pub max_attempts: usize,
    pub fallback_delay: Duration,
}

impl FallbackPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts,
            fallback_delay: Duration::from_millis(config.fallback_delay_ms),
        }
    }
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            fallback_delay: Duration::from_secs(1),
        }
    }
}

/// Por qué terminó un episodio sin reproducir nada
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustReason {
    CapReached,
    NoAlternatives,
    RescueEmpty,
    RescueFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EpisodeOutcome {
    Started { track: Candidate, attempts: usize },
    Exhausted { reason: ExhaustReason, attempts: usize },
    Fatal(FailureKind),
    NoCandidates,
    /// A newer request, a stop or a disconnect took over the guild.
    Superseded,
}

struct Failure {
    candidate: Candidate,
    kind: FailureKind,
    message: String,
}

enum Claim {
    Escalate(EpisodeTicket),
    Duplicate,
    Stale,
}

enum Step {
    Attempt(Candidate),
    Rescue,
    Exhausted(ExhaustReason),
}

/// Motor de reproducción con fallback acotado
pub struct PlaybackEngine {
    sessions: Arc<SessionManager>,
    resolver: Arc<SourceResolver>,
    voice: Arc<dyn VoiceBackend>,
    notices: Arc<NotificationGate>,
    block: Arc<BlockFlag>,
    policy: FallbackPolicy,
}

impl PlaybackEngine {
    pub fn new(
        sessions: Arc<SessionManager>,
        resolver: Arc<SourceResolver>,
        voice: Arc<dyn VoiceBackend>,
        notices: Arc<NotificationGate>,
        block: Arc<BlockFlag>,
        policy: FallbackPolicy,
    ) -> Self {
        Self {
            sessions,
            resolver,
            voice,
            notices,
            block,
            policy,
        }
    }

    pub fn resolver(&self) -> &SourceResolver {
        &self.resolver
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Inicia un episodio con los candidatos resueltos
    pub async fn start_episode(&self, request: PlayRequest, resolution: Resolution) -> EpisodeOutcome {
        if resolution.is_empty() {
            debug!("Sin candidatos para '{}'", resolution.effective_query);
            return EpisodeOutcome::NoCandidates;
        }

        info!(
            "🎯 Nuevo episodio en guild {}: {} candidatos ({})",
            request.guild_id,
            resolution.candidates.len(),
            resolution.origin.as_str()
        );

        let ticket = self
            .sessions
            .begin(request, resolution.origin, resolution.candidates);
        self.run_chain(ticket, None, false).await
    }

    /// Un candidato único (adjuntos)
    pub async fn start_single(&self, request: PlayRequest, candidate: Candidate) -> EpisodeOutcome {
        let origin = candidate.provider();
        let effective_query = candidate.origin_query().to_string();
        self.start_episode(
            request,
            Resolution {
                candidates: vec![candidate],
                origin,
                service: None,
                effective_query,
                lookup_failed: false,
            },
        )
        .await
    }

    /// Procesa un evento del reproductor
    pub async fn handle_event(&self, event: PlayerEvent) -> Option<EpisodeOutcome> {
        match event {
            PlayerEvent::Start {
                guild_id,
                metadata,
                track,
            } => {
                self.notices.track_started(guild_id, &metadata, &track).await;
                None
            }
            PlayerEvent::TrackAdd {
                metadata,
                track,
                queue_was_empty,
                ..
            } => {
                self.notices.track_queued(&metadata, &track, queue_was_empty).await;
                None
            }
            PlayerEvent::EmptyQueue { guild_id, metadata } => {
                let busy = self.sessions.handling_fallback(guild_id)
                    || self.voice.is_playing(guild_id).await;
                self.notices.queue_finished(&metadata, busy).await;
                None
            }
            PlayerEvent::End { guild_id, track, .. } => {
                self.notices.track_ended(guild_id, &track);
                self.finish_track(guild_id, &track);
                None
            }
            PlayerEvent::Error {
                guild_id,
                metadata,
                track,
                error,
            } => Some(self.handle_player_error(guild_id, &metadata, track, error).await),
        }
    }

    /// Entrada del bucle de eventos.
    ///
    /// Errors are claimed before this returns, so an `EmptyQueue` emitted right
    /// after the failure already sees the fallback in progress. The chain itself
    /// runs on its own task.
    pub async fn dispatch(self: &Arc<Self>, event: PlayerEvent) {
        debug!("📨 Evento del reproductor en guild {}", event.guild_id());
        let PlayerEvent::Error {
            guild_id,
            metadata,
            track,
            error,
        } = event
        else {
            self.handle_event(event).await;
            return;
        };

        let claim = self.claim(guild_id, &track);
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = engine.escalate(guild_id, claim, &metadata, track, error).await;
            debug!("Escalada en guild {} terminó: {:?}", guild_id, outcome);
        });
    }

    /// Error de reproducción reportado por el reproductor
    pub async fn handle_player_error(
        &self,
        guild_id: GuildId,
        metadata: &QueueMetadata,
        track: Candidate,
        error: anyhow::Error,
    ) -> EpisodeOutcome {
        let claim = self.claim(guild_id, &track);
        self.escalate(guild_id, claim, metadata, track, error).await
    }

    /// Solo el track aceptado por el episodio escala, y solo una vez
    fn claim(&self, guild_id: GuildId, track: &Candidate) -> Claim {
        let Some(ticket) = track
            .attempt()
            .and_then(|meta| self.sessions.ticket_for(guild_id, meta.episode))
        else {
            return Claim::Stale;
        };

        let claimed = self
            .sessions
            .with_episode(&ticket, |ep| {
                if ep.playing.as_deref() == Some(track.source_id()) {
                    ep.playing = None;
                    ep.handling_fallback = true;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);

        if claimed {
            Claim::Escalate(ticket)
        } else {
            Claim::Duplicate
        }
    }

    async fn escalate(
        &self,
        guild_id: GuildId,
        claim: Claim,
        metadata: &QueueMetadata,
        track: Candidate,
        error: anyhow::Error,
    ) -> EpisodeOutcome {
        let kind = classify(&error, &self.block);
        let message = format!("{:#}", error);

        match claim {
            Claim::Escalate(ticket) => {
                let failure = Failure {
                    candidate: track,
                    kind,
                    message,
                };
                self.run_chain(ticket, Some(failure), true).await
            }
            Claim::Duplicate => {
                debug!("Error duplicado ignorado para {}", track.source_id());
                EpisodeOutcome::Superseded
            }
            Claim::Stale => {
                debug!("Error fuera de episodio para {}: {}", track.source_id(), message);
                if kind == FailureKind::FatalBlock {
                    self.block.trip(&message);
                }
                if self.voice.is_connected(guild_id).await {
                    self.notices
                        .track_error(metadata.text_channel, &track, &message)
                        .await;
                }
                EpisodeOutcome::Superseded
            }
        }
    }

    /// Detiene todo en el guild
    pub async fn stop(&self, guild_id: GuildId) {
        self.forget(guild_id);
        self.voice.teardown(guild_id).await;
        info!("⏹️ Reproducción detenida en guild {}", guild_id);
    }

    /// Olvida el estado sin tocar la conexión (desconexión externa)
    pub fn forget(&self, guild_id: GuildId) {
        self.sessions.reset(guild_id);
        self.notices.forget(guild_id);
    }

    fn finish_track(&self, guild_id: GuildId, track: &Candidate) {
        let Some(ticket) = track
            .attempt()
            .and_then(|meta| self.sessions.ticket_for(guild_id, meta.episode))
        else {
            return;
        };

        let ended = self
            .sessions
            .with_episode(&ticket, |ep| ep.playing.as_deref() == Some(track.source_id()))
            .unwrap_or(false);
        if ended && self.sessions.conclude(&ticket).is_some() {
            debug!("🏁 Episodio {} terminado en guild {}", ticket.generation, guild_id);
        }
    }

    async fn run_chain(
        &self,
        ticket: EpisodeTicket,
        mut pending: Option<Failure>,
        escalated: bool,
    ) -> EpisodeOutcome {
        let mut last_title: Option<String> = None;
        let mut network = false;

        loop {
            if let Some(failure) = pending.take() {
                warn!(
                    "❌ Falló {} ({:?}): {}",
                    failure.candidate.source_id(),
                    failure.kind,
                    failure.message
                );
                if !failure.kind.is_retryable() {
                    return self.abort(&ticket, failure).await;
                }
                network = failure.kind == FailureKind::RetryableNetwork;
                last_title = Some(failure.candidate.title().to_string());
            }

            if !self.is_live(&ticket, escalated).await {
                return self.abandon(&ticket);
            }

            let max_attempts = self.policy.max_attempts;
            let Some((step, request)) = self
                .sessions
                .with_episode(&ticket, |ep| (next_step(ep, max_attempts), ep.request.clone()))
            else {
                return EpisodeOutcome::Superseded;
            };

            let candidate = match step {
                Step::Attempt(candidate) => candidate,
                Step::Exhausted(reason) => return self.exhaust(&ticket, reason, last_title).await,
                Step::Rescue => {
                    let title = match &last_title {
                        Some(title) => title.clone(),
                        None => self
                            .sessions
                            .with_episode(&ticket, |ep| ep.anchor_title.clone())
                            .unwrap_or_default(),
                    };
                    match self.rescue(&ticket, &request, &title).await {
                        Some(Some(candidate)) => candidate,
                        Some(None) => {
                            return self
                                .exhaust(&ticket, ExhaustReason::RescueEmpty, Some(title))
                                .await
                        }
                        None => return EpisodeOutcome::Superseded,
                    }
                }
            };

            if candidate.is_fallback() {
                let channel = request.text_channel();
                if candidate.attempt().is_some_and(|m| m.rescue) {
                    self.notices.rescue_attempt(channel, &candidate).await;
                } else {
                    self.notices.trying_alternative(channel, &candidate, network).await;
                }

                tokio::select! {
                    _ = ticket.token.cancelled() => return EpisodeOutcome::Superseded,
                    _ = tokio::time::sleep(self.policy.fallback_delay) => {}
                }

                if !self.is_live(&ticket, escalated).await {
                    return self.abandon(&ticket);
                }
            }

            debug!("▶️ Intentando {} en guild {}", candidate.source_id(), ticket.guild_id);
            match self.voice.play(&request, &candidate).await {
                Ok(track) => {
                    let attempts = self.sessions.with_episode(&ticket, |ep| {
                        ep.handling_fallback = false;
                        ep.playing = Some(track.source_id().to_string());
                        ep.ledger.len()
                    });

                    let Some(attempts) = attempts else {
                        // Un stop llegó mientras se conectaba
                        if !self.sessions.has_episode(ticket.guild_id) {
                            self.voice.teardown(ticket.guild_id).await;
                        }
                        return EpisodeOutcome::Superseded;
                    };

                    info!("✅ Reproduciendo {} tras {} intento(s)", track.title(), attempts);
                    return EpisodeOutcome::Started { track, attempts };
                }
                Err(e) => {
                    let kind = classify(&e, &self.block);
                    pending = Some(Failure {
                        candidate,
                        kind,
                        message: format!("{:#}", e),
                    });
                }
            }
        }
    }

    async fn is_live(&self, ticket: &EpisodeTicket, escalated: bool) -> bool {
        if !self.sessions.is_current(ticket) {
            return false;
        }
        !escalated || self.voice.is_connected(ticket.guild_id).await
    }

    fn abandon(&self, ticket: &EpisodeTicket) -> EpisodeOutcome {
        if self.sessions.conclude(ticket).is_some() {
            debug!("🔌 Sin conexión de voz, se abandona el episodio {}", ticket.generation);
        }
        EpisodeOutcome::Superseded
    }

    /// Búsqueda por título tras fallar un enlace directo.
    ///
    /// `None` when the episode was superseded while searching.
    async fn rescue(
        &self,
        ticket: &EpisodeTicket,
        request: &PlayRequest,
        title: &str,
    ) -> Option<Option<Candidate>> {
        info!("🔍 Rescate por título: {}", title);
        let found = self.resolver.search_title(title, request.requested_by).await;

        self.sessions.with_episode(ticket, |ep| {
            let pick = found
                .into_iter()
                .find(|c| !ep.ledger.contains(c.source_id()))?;
            ep.ledger.register(pick.source_id());

            let meta = AttemptMeta {
                episode: ep.generation,
                index: ep.ledger.len(),
                total: ep.total,
                is_fallback: true,
                rescue: true,
            };
            Some(
                pick.with_requested_by(ep.request.requested_by)
                    .with_origin_query(title)
                    .selected(meta),
            )
        })
    }

    async fn exhaust(
        &self,
        ticket: &EpisodeTicket,
        reason: ExhaustReason,
        last_title: Option<String>,
    ) -> EpisodeOutcome {
        let Some(ended) = self.sessions.conclude(ticket) else {
            return EpisodeOutcome::Superseded;
        };

        let title = last_title.unwrap_or(ended.anchor_title);
        warn!(
            "🚫 Episodio {} agotado en guild {} ({:?}, {} intentos)",
            ticket.generation, ticket.guild_id, reason, ended.attempts
        );

        self.notices
            .exhausted(ended.request.text_channel(), reason, ended.origin, ended.attempts, &title)
            .await;

        EpisodeOutcome::Exhausted {
            reason,
            attempts: ended.attempts,
        }
    }

    async fn abort(&self, ticket: &EpisodeTicket, failure: Failure) -> EpisodeOutcome {
        let Some(ended) = self.sessions.conclude(ticket) else {
            return EpisodeOutcome::Superseded;
        };

        if failure.kind == FailureKind::FatalBlock {
            self.block.trip(&failure.message);
        }
        error!(
            "⛔ Error fatal en guild {} ({:?}): {}",
            ticket.guild_id, failure.kind, failure.message
        );

        self.voice.teardown(ticket.guild_id).await;
        self.notices
            .fatal(ended.request.text_channel(), failure.kind, &failure.message)
            .await;

        EpisodeOutcome::Fatal(failure.kind)
    }
}

fn next_step(ep: &mut GuildEpisode, max_attempts: usize) -> Step {
    if ep.ledger.len() >= max_attempts {
        return Step::Exhausted(ExhaustReason::CapReached);
    }

    if let Some(candidate) = ep.candidates.pop_untried(&ep.ledger) {
        ep.ledger.register(candidate.source_id());
        let index = ep.ledger.len();
        let meta = AttemptMeta {
            episode: ep.generation,
            index,
            total: ep.total,
            is_fallback: index > 1,
            rescue: false,
        };
        return Step::Attempt(candidate.selected(meta));
    }

    if ep.origin == ProviderTag::DirectLink && !ep.rescue_used {
        ep.rescue_used = true;
        return Step::Rescue;
    }

    Step::Exhausted(if ep.rescue_used {
        ExhaustReason::RescueFailed
    } else {
        ExhaustReason::NoAlternatives
    })
}
