//! Per-guild playback episode state.
//!
//! One [`GuildEpisode`] per guild at most. Every episode gets a process-unique
//! generation; callbacks hold an [`EpisodeTicket`] and only touch the state
//! while their generation is still the current one.

use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::candidates::CandidateQueue;
use super::engine::PlayRequest;
use super::ledger::AttemptLedger;
use crate::sources::{Candidate, ProviderTag};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Estado del episodio en curso de un guild
#[derive(Debug)]
pub struct GuildEpisode {
    pub(crate) generation: u64,
    pub(crate) token: CancellationToken,
    pub(crate) request: PlayRequest,
    pub(crate) origin: ProviderTag,
    pub(crate) ledger: AttemptLedger,
    pub(crate) candidates: CandidateQueue,
    /// Candidates the episode started with; denominator of "(i/n)".
    pub(crate) total: usize,
    /// Title of the first candidate, used when a rescue has no failure title.
    pub(crate) anchor_title: String,
    pub(crate) rescue_used: bool,
    pub(crate) handling_fallback: bool,
    /// Source that the voice backend accepted last.
    pub(crate) playing: Option<String>,
}

/// Lo que queda de un episodio cerrado
#[derive(Debug, Clone)]
pub struct ConcludedEpisode {
    pub request: PlayRequest,
    pub origin: ProviderTag,
    pub attempts: usize,
    pub anchor_title: String,
}

/// Credencial de un episodio para callbacks diferidos
#[derive(Debug, Clone)]
pub struct EpisodeTicket {
    pub guild_id: GuildId,
    pub generation: u64,
    pub token: CancellationToken,
}

impl EpisodeTicket {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Gestor de episodios por guild
#[derive(Default)]
pub struct SessionManager {
    episodes: DashMap<GuildId, Arc<Mutex<GuildEpisode>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inicia un episodio nuevo y reemplaza (cancelando) el anterior
    pub fn begin(
        &self,
        request: PlayRequest,
        origin: ProviderTag,
        candidates: Vec<Candidate>,
    ) -> EpisodeTicket {
        let guild_id = request.guild_id;
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let episode = GuildEpisode {
            generation,
            token: token.clone(),
            request,
            origin,
            ledger: AttemptLedger::new(),
            total: candidates.len(),
            anchor_title: candidates
                .first()
                .map(|c| c.title().to_string())
                .unwrap_or_default(),
            candidates: CandidateQueue::new(candidates),
            rescue_used: false,
            handling_fallback: true,
            playing: None,
        };

        if let Some(previous) = self.episodes.insert(guild_id, Arc::new(Mutex::new(episode))) {
            let previous = previous.lock();
            previous.token.cancel();
            debug!(
                "🔄 Episodio {} reemplazado por {} en guild {}",
                previous.generation, generation, guild_id
            );
        }

        EpisodeTicket {
            guild_id,
            generation,
            token,
        }
    }

    /// Ticket del episodio actual si coincide la generación
    pub fn ticket_for(&self, guild_id: GuildId, generation: u64) -> Option<EpisodeTicket> {
        let entry = self.episodes.get(&guild_id)?;
        let episode = entry.lock();
        (episode.generation == generation && !episode.token.is_cancelled()).then(|| EpisodeTicket {
            guild_id,
            generation,
            token: episode.token.clone(),
        })
    }

    pub fn is_current(&self, ticket: &EpisodeTicket) -> bool {
        !ticket.is_cancelled() && self.current_generation(ticket.guild_id) == Some(ticket.generation)
    }

    pub fn current_generation(&self, guild_id: GuildId) -> Option<u64> {
        self.episodes.get(&guild_id).map(|e| e.lock().generation)
    }

    /// Ejecuta `f` sobre el episodio solo si el ticket sigue vigente
    pub fn with_episode<R>(
        &self,
        ticket: &EpisodeTicket,
        f: impl FnOnce(&mut GuildEpisode) -> R,
    ) -> Option<R> {
        if ticket.is_cancelled() {
            return None;
        }
        let entry = self.episodes.get(&ticket.guild_id)?.clone();
        let mut episode = entry.lock();
        (episode.generation == ticket.generation).then(|| f(&mut episode))
    }

    /// Cierra el episodio del ticket. Solo el primer llamador obtiene el estado.
    pub fn conclude(&self, ticket: &EpisodeTicket) -> Option<ConcludedEpisode> {
        let (_, entry) = self
            .episodes
            .remove_if(&ticket.guild_id, |_, e| e.lock().generation == ticket.generation)?;
        let mut episode = entry.lock();
        episode.token.cancel();

        let concluded = ConcludedEpisode {
            request: episode.request.clone(),
            origin: episode.origin,
            attempts: episode.ledger.len(),
            anchor_title: std::mem::take(&mut episode.anchor_title),
        };
        episode.ledger.clear();
        episode.candidates.clear();

        Some(concluded)
    }

    /// Olvida el estado del guild (stop, desconexión). Idempotente.
    pub fn reset(&self, guild_id: GuildId) -> bool {
        match self.episodes.remove(&guild_id) {
            Some((_, entry)) => {
                let episode = entry.lock();
                episode.token.cancel();
                debug!("🧹 Estado de fallback limpiado para guild {}", guild_id);
                true
            }
            None => false,
        }
    }

    pub fn handling_fallback(&self, guild_id: GuildId) -> bool {
        self.episodes
            .get(&guild_id)
            .is_some_and(|e| e.lock().handling_fallback)
    }

    #[cfg(test)]
    pub fn ledger_len(&self, guild_id: GuildId) -> usize {
        self.episodes
            .get(&guild_id)
            .map_or(0, |e| e.lock().ledger.len())
    }

    pub fn has_episode(&self, guild_id: GuildId) -> bool {
        self.episodes.contains_key(&guild_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{candidates, request};

    #[test]
    fn test_new_request_supersedes_previous_episode() {
        let sessions = SessionManager::new();
        let first = sessions.begin(request(1), ProviderTag::WebSearch, candidates(&["a"]));
        let second = sessions.begin(request(1), ProviderTag::WebSearch, candidates(&["b"]));

        assert!(first.is_cancelled());
        assert!(!sessions.is_current(&first));
        assert!(sessions.is_current(&second));
        assert!(second.generation > first.generation);
        assert!(sessions.with_episode(&first, |_| ()).is_none());
    }

    #[test]
    fn test_reset_is_idempotent() {
        let sessions = SessionManager::new();
        let ticket = sessions.begin(request(1), ProviderTag::WebSearch, candidates(&["a", "b"]));
        sessions.with_episode(&ticket, |e| e.ledger.register("a"));
        assert_eq!(sessions.ledger_len(GuildId::new(1)), 1);

        assert!(sessions.reset(GuildId::new(1)));
        assert!(!sessions.reset(GuildId::new(1)));
        assert!(ticket.is_cancelled());
        assert_eq!(sessions.ledger_len(GuildId::new(1)), 0);
        assert!(!sessions.handling_fallback(GuildId::new(1)));
    }

    #[test]
    fn test_conclude_only_once_and_only_current() {
        let sessions = SessionManager::new();
        let old = sessions.begin(request(1), ProviderTag::WebSearch, candidates(&["a"]));
        let current = sessions.begin(request(1), ProviderTag::WebSearch, candidates(&["b"]));

        assert!(sessions.conclude(&old).is_none());
        assert!(sessions.has_episode(GuildId::new(1)));

        let concluded = sessions.conclude(&current).unwrap();
        assert_eq!(concluded.anchor_title, "B");
        assert!(sessions.conclude(&current).is_none());
        assert!(!sessions.has_episode(GuildId::new(1)));
    }

    #[test]
    fn test_guilds_are_isolated() {
        let sessions = SessionManager::new();
        let a = sessions.begin(request(1), ProviderTag::WebSearch, candidates(&["x"]));
        let b = sessions.begin(request(2), ProviderTag::WebSearch, candidates(&["x"]));
        sessions.with_episode(&a, |e| e.ledger.register("x"));

        assert_eq!(sessions.ledger_len(GuildId::new(1)), 1);
        assert_eq!(sessions.ledger_len(GuildId::new(2)), 0);
        assert!(sessions.ticket_for(GuildId::new(2), b.generation).is_some());
        assert!(sessions.ticket_for(GuildId::new(2), a.generation).is_none());
    }
}
