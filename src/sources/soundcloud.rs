use anyhow::{Context, Result};
use tracing::info;

use super::youtube::{YouTubeClient, YtDlpInfo};
use super::{Candidate, ProviderTag};

/// Cliente de SoundCloud (vía yt-dlp, streaming directo)
pub struct SoundCloudClient {
    ytdlp: YouTubeClient,
}

impl SoundCloudClient {
    pub fn new(ytdlp_path: &str) -> Self {
        Self {
            ytdlp: YouTubeClient::new(ytdlp_path),
        }
    }

    /// Metadatos del track; el candidato se reproduce tal cual
    pub async fn get_track(&self, url: &str) -> Result<Candidate> {
        info!("☁️ Extrayendo track de SoundCloud: {}", url);

        let stdout = self
            .ytdlp
            .run(&["--no-playlist", "--dump-json", "--skip-download", "--no-warnings", url])
            .await?;

        let info: YtDlpInfo = serde_json::from_str(stdout.lines().next().unwrap_or_default())
            .context("Respuesta de SoundCloud inválida")?;

        info.into_candidate(ProviderTag::ExternalService)
            .ok_or_else(|| anyhow::anyhow!("SoundCloud no devolvió URL para {}", url))
    }

    pub fn is_valid_url(url: &str) -> bool {
        url.contains("soundcloud.com")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soundcloud_url() {
        assert!(SoundCloudClient::is_valid_url("https://soundcloud.com/artist/track"));
        assert!(!SoundCloudClient::is_valid_url("https://open.spotify.com/track/x"));
    }
}
