use std::collections::VecDeque;
use tracing::debug;

use super::ledger::AttemptLedger;
use crate::sources::Candidate;

/// Cola FIFO de candidatos alternativos aún no intentados
#[derive(Debug, Default, Clone)]
pub struct CandidateQueue {
    items: VecDeque<Candidate>,
}

impl CandidateQueue {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            items: candidates.into(),
        }
    }

    /// Siguiente candidato cuya fuente no esté en el ledger.
    ///
    /// Already-tried entries are discarded on the way.
    pub fn pop_untried(&mut self, ledger: &AttemptLedger) -> Option<Candidate> {
        while let Some(candidate) = self.items.pop_front() {
            if !ledger.contains(candidate.source_id()) {
                return Some(candidate);
            }
            debug!("⏭️ Candidato ya intentado, se descarta: {}", candidate.source_id());
        }
        None
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::ProviderTag;

    fn candidate(id: &str) -> Candidate {
        Candidate::new(id, id.to_uppercase(), ProviderTag::WebSearch)
    }

    #[test]
    fn test_pop_skips_tried_sources() {
        let mut queue = CandidateQueue::new(vec![candidate("a"), candidate("b"), candidate("c")]);
        let mut ledger = AttemptLedger::new();
        ledger.register("a");
        ledger.register("b");

        let next = queue.pop_untried(&ledger).unwrap();
        assert_eq!(next.source_id(), "c");
        assert!(queue.pop_untried(&ledger).is_none());
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = CandidateQueue::new(vec![candidate("x"), candidate("y")]);
        let ledger = AttemptLedger::new();
        assert_eq!(queue.pop_untried(&ledger).unwrap().source_id(), "x");
        queue.clear();
        assert!(queue.pop_untried(&ledger).is_none());
    }
}
