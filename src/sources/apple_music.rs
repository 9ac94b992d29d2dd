use anyhow::{Context, Result};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

use super::{Candidate, ProviderTag};

static META_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta\s+(?:property|name)="([^"]+)"\s+content="([^"]*)""#)
        .expect("regex de meta tags válido")
});

/// Cliente de Apple Music (metadatos desde la página pública)
pub struct AppleMusicClient {
    http: reqwest::Client,
}

impl AppleMusicClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Lee `og:title` ("Song by Artist on Apple Music") de la página del track
    pub async fn get_track(&self, url: &str) -> Result<Candidate> {
        info!("🍎 Extrayendo metadatos de Apple Music: {}", url);

        let html = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
            .context("No se pudo leer la página de Apple Music")?;

        let og_title = meta_content(&html, "og:title")
            .ok_or_else(|| anyhow::anyhow!("Página de Apple Music sin og:title"))?;
        let (title, artist) = split_title(&og_title);
        debug!("🍎 Apple Music → '{}' / {:?}", title, artist);

        let mut candidate = Candidate::new(url, title, ProviderTag::ExternalService);
        if let Some(artist) = artist {
            candidate = candidate.with_author(artist);
        }
        if let Some(image) = meta_content(&html, "og:image") {
            candidate = candidate.with_thumbnail(image);
        }

        Ok(candidate)
    }
}

/// Valor de un `<meta property|name=... content=...>`
pub(crate) fn meta_content(html: &str, property: &str) -> Option<String> {
    META_TAG
        .captures_iter(html)
        .find(|c| &c[1] == property)
        .map(|c| decode_entities(&c[2]))
        .filter(|v| !v.trim().is_empty())
}

fn split_title(og_title: &str) -> (String, Option<String>) {
    let trimmed = og_title.trim_end_matches(" on Apple Music").trim();
    match trimmed.rsplit_once(" by ") {
        Some((title, artist)) if !title.is_empty() => {
            (title.trim().to_string(), Some(artist.trim().to_string()))
        }
        _ => (trimmed.to_string(), None),
    }
}

pub(crate) fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_og_title_split() {
        assert_eq!(
            split_title("Blinding Lights by The Weeknd on Apple Music"),
            ("Blinding Lights".to_string(), Some("The Weeknd".to_string()))
        );
        assert_eq!(split_title("Just A Title"), ("Just A Title".to_string(), None));
        // El último " by " separa al artista
        assert_eq!(
            split_title("Stand by Me by Ben E. King"),
            ("Stand by Me".to_string(), Some("Ben E. King".to_string()))
        );
    }

    #[test]
    fn test_meta_content_decodes_entities() {
        let html = r#"<head><meta property="og:title" content="Don&#39;t Stop Me Now by Queen on Apple Music"><meta property="og:image" content="https://img/x.jpg"></head>"#;
        assert_eq!(
            meta_content(html, "og:title").as_deref(),
            Some("Don't Stop Me Now by Queen on Apple Music")
        );
        assert_eq!(meta_content(html, "og:image").as_deref(), Some("https://img/x.jpg"));
        assert_eq!(meta_content(html, "og:description"), None);
    }
}
