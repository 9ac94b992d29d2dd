use anyhow::{Context, Result};
use async_process::Command;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{Candidate, ProviderTag};

static WATCH_PAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(youtube\.com/watch\?v=|youtu\.be/|music\.youtube\.com/watch\?v=)")
        .expect("regex de watch page válido")
});

/// Cliente para interactuar con YouTube/yt-dlp
pub struct YouTubeClient {
    binary: String,
    // Limitar requests concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
pub(crate) struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    artist: Option<String>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    ie_key: Option<String>,
}

impl YtDlpInfo {
    /// URL canónica del recurso
    fn canonical_url(&self) -> Option<String> {
        if let Some(url) = &self.webpage_url {
            return Some(url.clone());
        }
        let is_youtube = self
            .ie_key
            .as_deref()
            .map_or(true, |k| k.eq_ignore_ascii_case("youtube"));
        match (&self.id, &self.url) {
            (Some(id), _) if is_youtube => Some(format!("https://www.youtube.com/watch?v={}", id)),
            (_, Some(url)) => Some(url.clone()),
            _ => None,
        }
    }

    pub(crate) fn into_candidate(self, provider: ProviderTag) -> Option<Candidate> {
        let url = self.canonical_url()?;
        let title = self.title.clone().unwrap_or_else(|| url.clone());
        let mut candidate = Candidate::new(url, title, provider);

        if let Some(author) = self.artist.or(self.channel).or(self.uploader) {
            candidate = candidate.with_author(author);
        }
        if let Some(duration) = self.duration.filter(|d| d.is_finite() && *d > 0.0) {
            candidate = candidate.with_duration(Duration::from_secs_f64(duration));
        }
        if let Some(thumbnail) = self.thumbnail {
            candidate = candidate.with_thumbnail(thumbnail);
        }

        Some(candidate)
    }
}

impl YouTubeClient {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Busca videos en YouTube
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Candidate>> {
        info!("🔍 Buscando en YouTube: {}", query);

        let search_query = format!("ytsearch{}:{}", limit, query);
        let stdout = self
            .run(&[
                "--no-playlist",
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .await?;

        Ok(parse_lines(&stdout, ProviderTag::WebSearch))
    }

    /// Obtiene información de una URL específica
    pub async fn get_track(&self, url: &str) -> Result<Candidate> {
        debug!("📊 Obteniendo info de: {}", url);

        let stdout = self
            .run(&["--no-playlist", "--dump-json", "--skip-download", "--no-warnings", url])
            .await?;

        let info: YtDlpInfo = serde_json::from_str(stdout.lines().next().unwrap_or_default())
            .context("Error al parsear respuesta de yt-dlp")?;

        let provider = if Self::is_watch_page(url) {
            ProviderTag::DirectLink
        } else {
            ProviderTag::WebSearch
        };

        info.into_candidate(provider)
            .ok_or_else(|| anyhow::anyhow!("yt-dlp no devolvió URL para {}", url))
    }

    /// Versión instalada de yt-dlp
    pub async fn version(&self) -> Result<String> {
        let stdout = self.run(&["--version"]).await?;
        Ok(stdout.trim().to_string())
    }

    /// Links to a single video page (one confident candidate).
    pub fn is_watch_page(url: &str) -> bool {
        WATCH_PAGE.is_match(url)
    }

    pub(crate) async fn run(&self, args: &[&str]) -> Result<String> {
        let _permit = self.rate_limiter.acquire().await?;

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            warn!("⚠️ yt-dlp falló: {}", error.trim());
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn parse_lines(stdout: &str, provider: ProviderTag) -> Vec<Candidate> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
        .filter_map(|info| info.into_candidate(provider))
        .collect()
}
