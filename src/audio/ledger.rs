use std::collections::HashSet;

/// Fuentes ya intentadas en el episodio actual de un guild
#[derive(Debug, Default, Clone)]
pub struct AttemptLedger {
    tried: HashSet<String>,
}

impl AttemptLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra una fuente; `false` si ya estaba
    pub fn register(&mut self, source_id: &str) -> bool {
        self.tried.insert(source_id.to_string())
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.tried.contains(source_id)
    }

    pub fn len(&self) -> usize {
        self.tried.len()
    }

    pub fn clear(&mut self) {
        self.tried.clear();
    }
}
