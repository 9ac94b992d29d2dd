use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

const LRCLIB_SEARCH: &str = "https://lrclib.net/api/search";

/// Longitud máxima de la descripción antes de añadir "..."
pub const LYRICS_EMBED_LIMIT: usize = 1997;

/// Letra encontrada en LRCLIB
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lyrics {
    #[serde(rename = "trackName")]
    pub title: Option<String>,
    #[serde(rename = "artistName")]
    pub artist: Option<String>,
    pub album_name: Option<String>,
    pub plain_lyrics: Option<String>,
}

impl Lyrics {
    /// Texto recortado para el embed
    pub fn trimmed(&self) -> Option<String> {
        let plain = self.plain_lyrics.as_deref()?;
        let cut: String = plain.chars().take(LYRICS_EMBED_LIMIT).collect();
        if cut.chars().count() == LYRICS_EMBED_LIMIT {
            Some(format!("{}...", cut))
        } else {
            Some(cut)
        }
    }
}

/// Cliente de letras
pub struct LyricsClient {
    http: reqwest::Client,
}

impl LyricsClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Primer resultado de LRCLIB para la búsqueda, si existe
    pub async fn search(&self, query: &str) -> Result<Option<Lyrics>> {
        info!("📝 Buscando letra: {}", query);

        let results: Vec<Lyrics> = self
            .http
            .get(LRCLIB_SEARCH)
            .query(&[("q", query)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("Respuesta de LRCLIB inválida")?;

        debug!("📝 {} resultados de letra", results.len());
        Ok(results.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lrclib_payload() {
        let results: Vec<Lyrics> = serde_json::from_str(
            r#"[{"id":1,"trackName":"Song","artistName":"Band","albumName":"LP","duration":200,"instrumental":false,"plainLyrics":"la la","syncedLyrics":null}]"#,
        )
        .unwrap();
        assert_eq!(results[0].title.as_deref(), Some("Song"));
        assert_eq!(results[0].artist.as_deref(), Some("Band"));
        assert_eq!(results[0].trimmed().as_deref(), Some("la la"));
    }

    #[test]
    fn test_long_lyrics_are_trimmed() {
        let lyrics = Lyrics {
            title: None,
            artist: None,
            album_name: None,
            plain_lyrics: Some("x".repeat(5000)),
        };
        let text = lyrics.trimmed().unwrap();
        assert_eq!(text.len(), LYRICS_EMBED_LIMIT + 3);
        assert!(text.ends_with("..."));
    }

    #[test]
    fn test_instrumental_has_no_text() {
        let lyrics = Lyrics {
            title: Some("Intro".into()),
            artist: None,
            album_name: None,
            plain_lyrics: None,
        };
        assert_eq!(lyrics.trimmed(), None);
    }
}
