use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use super::apple_music::meta_content;
use super::{Candidate, ProviderTag};

const OEMBED_URL: &str = "https://open.spotify.com/oembed";

/// Cliente de Spotify (oEmbed público, sin credenciales)
///
/// Spotify audio is never streamed: the candidate only carries the title and
/// artist used for the secondary web search.
pub struct SpotifyClient {
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct OEmbed {
    title: String,
    thumbnail_url: Option<String>,
}

impl SpotifyClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub async fn get_track(&self, url: &str) -> Result<Candidate> {
        info!("🎧 Extrayendo metadatos de Spotify: {}", url);

        let endpoint = format!("{}?url={}", OEMBED_URL, urlencoding::encode(url));
        let embed: OEmbed = self
            .http
            .get(&endpoint)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("Respuesta oEmbed de Spotify inválida")?;

        let mut candidate = Candidate::new(url, embed.title, ProviderTag::ExternalService);
        if let Some(thumbnail) = embed.thumbnail_url {
            candidate = candidate.with_thumbnail(thumbnail);
        }

        // oEmbed no incluye artista; la página sí (best effort)
        match self.artist(url).await {
            Ok(Some(artist)) => candidate = candidate.with_author(artist),
            Ok(None) => {}
            Err(e) => debug!("Sin artista para {}: {}", url, e),
        }

        Ok(candidate)
    }

    async fn artist(&self, url: &str) -> Result<Option<String>> {
        let html = self.http.get(url).send().await?.error_for_status()?.text().await?;
        Ok(meta_content(&html, "music:musician_description"))
    }

    pub fn is_valid_url(url: &str) -> bool {
        url.contains("open.spotify.com")
    }
}
