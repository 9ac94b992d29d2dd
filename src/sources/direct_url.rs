use anyhow::{Context, Result};
use url::Url;

use super::{Candidate, ProviderTag};

/// Extensiones de audio reconocidas para URLs directas
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "ogg", "wav", "flac", "m4a", "mp4"];

/// Cliente para URLs directas a archivos de audio
pub struct DirectUrlClient {}

impl DirectUrlClient {
    pub fn new() -> Self {
        Self {}
    }

    /// Convierte la URL en un candidato sin consultar la red.
    ///
    /// The stream itself is opened later by the HTTP stream backend, so a bad
    /// file only fails at play time where the engine can classify it.
    pub fn get_track(&self, url: &str) -> Result<Candidate> {
        let parsed = Url::parse(url).with_context(|| format!("URL inválida: {}", url))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("Esquema no soportado: {}", parsed.scheme());
        }

        let title = file_name(&parsed).unwrap_or_default();
        Ok(Candidate::new(url, title, ProviderTag::Attachment))
    }

    pub fn has_audio_extension(name: &str) -> bool {
        extension(name).is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
    }
}

impl Default for DirectUrlClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Extensión en minúsculas, sin el punto
pub fn extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_lowercase())
}

fn file_name(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    if segment.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(segment).map(|s| s.into_owned());
    Some(decoded.unwrap_or_else(|_| segment.to_string()))
}
