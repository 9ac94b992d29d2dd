use anyhow::Result;
use chrono::{DateTime, Utc};
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use crate::sources::Candidate;

#[derive(Debug, Clone)]
pub struct QueueItem {
    pub track: Candidate,
    pub added_at: DateTime<Utc>,
}

impl From<Candidate> for QueueItem {
    fn from(track: Candidate) -> Self {
        Self {
            track,
            added_at: Utc::now(),
        }
    }
}

impl QueueItem {
    pub fn title(&self) -> &str {
        self.track.title()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Off,
    Track,
    Queue,
}

impl LoopMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "off" => Some(Self::Off),
            "track" => Some(Self::Track),
            "queue" => Some(Self::Queue),
            _ => None,
        }
    }
}

/// Pistas del historial que muestra /queue
const RECENT_SHOWN: usize = 3;

#[derive(Debug)]
pub struct MusicQueue {
    items: VecDeque<QueueItem>,
    current: Option<QueueItem>,
    history: Vec<QueueItem>,
    loop_mode: LoopMode,
    max_size: usize,
    max_history: usize,
}

impl MusicQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            current: None,
            history: Vec::new(),
            loop_mode: LoopMode::Off,
            max_size,
            max_history: 50,
        }
    }

    /// Agrega un track a la cola
    pub fn add_track(&mut self, track: Candidate) -> Result<()> {
        if self.items.len() >= self.max_size {
            anyhow::bail!("La cola está llena (máximo {} canciones)", self.max_size);
        }

        let item = QueueItem::from(track);
        info!("➕ Agregado a la cola: {}", item.title());
        self.items.push_back(item);

        Ok(())
    }

    /// Obtiene el siguiente track (FIFO - First In, First Out)
    pub fn next_track(&mut self) -> Option<Candidate> {
        // Guardar current en history si existe
        if let Some(current) = self.current.take() {
            self.add_to_history(current.clone());

            // Si está en modo loop track, devolver el mismo
            if self.loop_mode == LoopMode::Track {
                info!("🔂 Repitiendo track: {}", current.title());
                let track = current.track.clone();
                self.current = Some(current);
                return Some(track);
            }
        }

        let Some(next_item) = self.items.pop_front() else {
            info!("📭 Cola vacía, no hay siguiente track");
            return None;
        };
        info!("➡️ Siguiente en cola (FIFO): {}", next_item.title());

        // Si está en modo loop queue, agregar al final
        if self.loop_mode == LoopMode::Queue {
            self.items.push_back(next_item.clone());
            debug!("🔁 Track agregado al final por loop de cola: {}", next_item.title());
        }

        let track = next_item.track.clone();
        self.current = Some(next_item);
        Some(track)
    }

    /// Descarta el track actual cuando no se pudo reproducir
    pub fn drop_current(&mut self) -> Option<QueueItem> {
        let dropped = self.current.take()?;

        // No volver a encolar una fuente rota
        if self.loop_mode == LoopMode::Queue
            && self
                .items
                .back()
                .is_some_and(|i| i.track.source_id() == dropped.track.source_id())
        {
            self.items.pop_back();
        }

        Some(dropped)
    }

    /// Limpia la cola
    pub fn clear(&mut self) {
        self.items.clear();
        self.current = None;
        info!("🗑️ Cola limpiada");
    }

    /// Cambia el modo de loop
    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
        match mode {
            LoopMode::Off => info!("➡️ Repetición desactivada"),
            LoopMode::Track => info!("🔂 Repetir canción activado"),
            LoopMode::Queue => info!("🔁 Repetir cola activado"),
        }
    }

    /// Obtiene información de la cola
    pub fn get_info(&self) -> QueueInfo {
        QueueInfo {
            current: self.current.clone(),
            items: self.items.iter().cloned().collect(),
            recent: self.history.iter().rev().take(RECENT_SHOWN).cloned().collect(),
            loop_mode: self.loop_mode,
            total_duration: self.calculate_total_duration(),
        }
    }

    /// Elimina un track específico (índice 0-based)
    pub fn remove_track(&mut self, index: usize) -> Result<QueueItem> {
        let item = self
            .items
            .remove(index)
            .ok_or_else(|| anyhow::anyhow!("Índice fuera de rango"))?;
        debug!("❌ Track eliminado en posición {}", index);
        Ok(item)
    }

    // Funciones privadas

    fn add_to_history(&mut self, item: QueueItem) {
        self.history.push(item);

        // Mantener solo los últimos N items
        if self.history.len() > self.max_history {
            self.history.remove(0);
        }
    }

    fn calculate_total_duration(&self) -> Duration {
        let queue_duration: Duration = self.items.iter().filter_map(|item| item.track.duration()).sum();

        let current_duration = self
            .current
            .as_ref()
            .and_then(|c| c.track.duration())
            .unwrap_or_default();

        queue_duration + current_duration
    }
}

#[derive(Debug, Clone)]
pub struct QueueInfo {
    pub current: Option<QueueItem>,
    pub items: Vec<QueueItem>,
    /// Last played tracks, newest first.
    pub recent: Vec<QueueItem>,
    pub loop_mode: LoopMode,
    pub total_duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::ProviderTag;

    fn track(id: &str) -> Candidate {
        Candidate::new(id, id.to_uppercase(), ProviderTag::WebSearch)
            .with_duration(Duration::from_secs(60))
    }

    fn is_idle(queue: &MusicQueue) -> bool {
        let info = queue.get_info();
        info.current.is_none() && info.items.is_empty()
    }

    fn next_id(queue: &mut MusicQueue) -> Option<String> {
        queue.next_track().map(|t| t.source_id().to_string())
    }

    #[test]
    fn test_fifo_and_history() {
        let mut queue = MusicQueue::new(10);
        queue.add_track(track("a")).unwrap();
        queue.add_track(track("b")).unwrap();

        assert_eq!(next_id(&mut queue).as_deref(), Some("a"));
        assert_eq!(next_id(&mut queue).as_deref(), Some("b"));
        assert_eq!(next_id(&mut queue), None);
        let recent: Vec<_> = queue.get_info().recent.iter().map(|i| i.title().to_string()).collect();
        assert_eq!(recent, vec!["B", "A"]);
        assert!(is_idle(&queue));
    }

    #[test]
    fn test_loop_modes() {
        let mut queue = MusicQueue::new(10);
        queue.add_track(track("a")).unwrap();
        queue.add_track(track("b")).unwrap();

        queue.set_loop_mode(LoopMode::Track);
        assert_eq!(next_id(&mut queue).as_deref(), Some("a"));
        assert_eq!(next_id(&mut queue).as_deref(), Some("a"));

        queue.set_loop_mode(LoopMode::Queue);
        assert_eq!(next_id(&mut queue).as_deref(), Some("b"));
        assert_eq!(next_id(&mut queue).as_deref(), Some("b"));
        assert_eq!(next_id(&mut queue).as_deref(), Some("b"));
    }

    #[test]
    fn test_queue_loop_cycles_all_tracks() {
        let mut queue = MusicQueue::new(10);
        queue.set_loop_mode(LoopMode::Queue);
        queue.add_track(track("a")).unwrap();
        queue.add_track(track("b")).unwrap();

        let order: Vec<_> = (0..4).filter_map(|_| next_id(&mut queue)).collect();
        assert_eq!(order, vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn test_drop_current_does_not_requeue_broken_source() {
        let mut queue = MusicQueue::new(10);
        queue.set_loop_mode(LoopMode::Queue);
        queue.add_track(track("a")).unwrap();
        queue.next_track();

        assert_eq!(queue.drop_current().unwrap().track.source_id(), "a");
        assert!(is_idle(&queue));
    }

    #[test]
    fn test_max_size_and_remove() {
        let mut queue = MusicQueue::new(2);
        queue.add_track(track("a")).unwrap();
        queue.add_track(track("b")).unwrap();
        assert!(queue.add_track(track("c")).is_err());

        let removed = queue.remove_track(1).unwrap();
        assert_eq!(removed.title(), "B");
        assert!(queue.remove_track(5).is_err());
        assert_eq!(queue.get_info().items.len(), 1);
        assert_eq!(queue.get_info().total_duration, Duration::from_secs(60));
    }

    #[test]
    fn test_loop_mode_parse() {
        assert_eq!(LoopMode::parse("track"), Some(LoopMode::Track));
        assert_eq!(LoopMode::parse("shuffle"), None);
    }
}
