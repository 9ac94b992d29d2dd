pub mod apple_music;
pub mod attachment;
pub mod direct_url;
pub mod lyrics;
pub mod resolver;
pub mod soundcloud;
pub mod spotify;
pub mod youtube;

use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::UserId;
use std::time::Duration;
use tracing::{debug, info};

pub use apple_music::AppleMusicClient;
pub use direct_url::DirectUrlClient;
pub use resolver::{Resolution, SourceResolver};
pub use soundcloud::SoundCloudClient;
pub use spotify::SpotifyClient;
pub use youtube::YouTubeClient;

/// Búsqueda de candidatos reproducibles
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Busca candidatos para una query o URL. Puede fallar o devolver vacío.
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<Candidate>>;
}

/// Where a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderTag {
    WebSearch,
    DirectLink,
    ExternalService,
    Attachment,
}

impl ProviderTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderTag::WebSearch => "web-search",
            ProviderTag::DirectLink => "direct-link",
            ProviderTag::ExternalService => "external-service",
            ProviderTag::Attachment => "attachment",
        }
    }
}

/// Motor de búsqueda solicitado
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchEngine {
    /// Detect from the query (URL → extractor, text → web search).
    #[default]
    Auto,
    /// Force a web search even for URL-looking text.
    YouTube,
    /// Treat the query as a direct audio file URL.
    File,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub requested_by: UserId,
    pub engine: SearchEngine,
}

impl SearchOptions {
    pub fn new(requested_by: UserId) -> Self {
        Self {
            requested_by,
            engine: SearchEngine::Auto,
        }
    }

    pub fn with_engine(mut self, engine: SearchEngine) -> Self {
        self.engine = engine;
        self
    }
}

/// Retry metadata attached when the engine selects a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptMeta {
    /// Generation of the episode that selected this candidate.
    pub episode: u64,
    /// 1-based attempt number within the episode.
    pub index: usize,
    /// Candidates the episode started with.
    pub total: usize,
    pub is_fallback: bool,
    pub rescue: bool,
}

/// Un candidato resuelto y potencialmente reproducible
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    source_id: String,
    title: String,
    author: Option<String>,
    duration: Option<Duration>,
    thumbnail: Option<String>,
    provider: ProviderTag,
    origin_query: String,
    requested_by: UserId,
    attempt: Option<AttemptMeta>,
}

impl Candidate {
    pub fn new(source_id: impl Into<String>, title: impl Into<String>, provider: ProviderTag) -> Self {
        Self {
            source_id: source_id.into(),
            title: title.into(),
            author: None,
            duration: None,
            thumbnail: None,
            provider,
            origin_query: String::new(),
            requested_by: UserId::new(1),
            attempt: None,
        }
    }

    // Getters
    pub fn source_id(&self) -> &str {
        &self.source_id
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn provider(&self) -> ProviderTag {
        self.provider
    }
    pub fn origin_query(&self) -> &str {
        &self.origin_query
    }
    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }
    pub fn attempt(&self) -> Option<AttemptMeta> {
        self.attempt
    }

    pub fn is_fallback(&self) -> bool {
        self.attempt.is_some_and(|a| a.is_fallback)
    }

    // Builders
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        let author = author.into();
        if !author.trim().is_empty() {
            self.author = Some(author);
        }
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_provider(mut self, provider: ProviderTag) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_origin_query(mut self, query: impl Into<String>) -> Self {
        self.origin_query = query.into();
        self
    }

    pub fn with_requested_by(mut self, user_id: UserId) -> Self {
        self.requested_by = user_id;
        self
    }

    /// Marca el candidato como seleccionado por el motor (una sola vez)
    pub fn selected(mut self, meta: AttemptMeta) -> Self {
        if let Some(previous) = self.attempt {
            debug!(
                "Candidato {} ya seleccionado en episodio {}, se reemplaza",
                self.source_id, previous.episode
            );
        }
        self.attempt = Some(meta);
        self
    }

    /// Texto de búsqueda "{author} {title}" usado para redirigir entre proveedores
    pub fn search_text(&self) -> String {
        match self.author() {
            Some(author) => format!("{} {}", author, self.title),
            None => self.title.clone(),
        }
    }
}

/// Servicios externos reconocidos por enlace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalService {
    Spotify,
    AppleMusic,
    SoundCloud,
}

impl ExternalService {
    pub fn detect(query: &str) -> Option<Self> {
        let lower = query.to_lowercase();
        if lower.contains("spotify.com") {
            Some(Self::Spotify)
        } else if lower.contains("music.apple.com") {
            Some(Self::AppleMusic)
        } else if lower.contains("soundcloud.com") {
            Some(Self::SoundCloud)
        } else {
            None
        }
    }

    /// Whether the provider's own candidates can be streamed as-is.
    pub fn supports_direct_streaming(self) -> bool {
        matches!(self, Self::SoundCloud)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Spotify => "Spotify",
            Self::AppleMusic => "Apple Music",
            Self::SoundCloud => "SoundCloud",
        }
    }
}

/// Manager para todas las fuentes de música
///
/// Production [`SearchBackend`]: routes a query to the provider that owns it
/// and falls back to the yt-dlp web search for everything else.
pub struct SourceManager {
    youtube: YouTubeClient,
    soundcloud: SoundCloudClient,
    spotify: SpotifyClient,
    apple_music: AppleMusicClient,
    direct_url: DirectUrlClient,
}

impl SourceManager {
    pub fn new(ytdlp_path: &str, http: reqwest::Client) -> Self {
        Self {
            youtube: YouTubeClient::new(ytdlp_path),
            soundcloud: SoundCloudClient::new(ytdlp_path),
            spotify: SpotifyClient::new(http.clone()),
            apple_music: AppleMusicClient::new(http),
            direct_url: DirectUrlClient::new(),
        }
    }

    /// Verifica que yt-dlp esté disponible
    pub async fn verify_dependencies(&self) -> Result<()> {
        self.youtube.version().await.map(|v| {
            info!("✅ yt-dlp versión: {}", v);
        })
    }
}

#[async_trait]
impl SearchBackend for SourceManager {
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<Candidate>> {
        let query = query.trim();

        let tracks = match options.engine {
            SearchEngine::File => vec![self.direct_url.get_track(query)?],
            SearchEngine::YouTube => self.youtube.search(query, 5).await?,
            SearchEngine::Auto => match ExternalService::detect(query) {
                Some(ExternalService::Spotify) => vec![self.spotify.get_track(query).await?],
                Some(ExternalService::AppleMusic) => vec![self.apple_music.get_track(query).await?],
                Some(ExternalService::SoundCloud) => vec![self.soundcloud.get_track(query).await?],
                None if is_url(query) => vec![self.youtube.get_track(query).await?],
                None => self.youtube.search(query, 5).await?,
            },
        };

        debug!("🔎 {} resultados para '{}' ({:?})", tracks.len(), query, options.engine);

        Ok(tracks
            .into_iter()
            .map(|t| t.with_requested_by(options.requested_by).with_origin_query(query))
            .collect())
    }
}

pub fn is_url(query: &str) -> bool {
    url::Url::parse(query)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_service_detection() {
        assert_eq!(
            ExternalService::detect("https://open.spotify.com/track/abc"),
            Some(ExternalService::Spotify)
        );
        assert_eq!(
            ExternalService::detect("https://music.apple.com/us/album/x/1?i=2"),
            Some(ExternalService::AppleMusic)
        );
        assert_eq!(
            ExternalService::detect("https://soundcloud.com/artist/song"),
            Some(ExternalService::SoundCloud)
        );
        assert_eq!(ExternalService::detect("never gonna give you up"), None);
        assert!(ExternalService::SoundCloud.supports_direct_streaming());
        assert!(!ExternalService::Spotify.supports_direct_streaming());
    }

    #[test]
    fn test_search_text_uses_author_when_present() {
        let c = Candidate::new("u", "Song", ProviderTag::ExternalService);
        assert_eq!(c.search_text(), "Song");
        let c = c.with_author("Band");
        assert_eq!(c.search_text(), "Band Song");
        let blank = Candidate::new("u", "Song", ProviderTag::WebSearch).with_author("  ");
        assert_eq!(blank.author(), None);
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://www.youtube.com/watch?v=abc"));
        assert!(!is_url("daft punk one more time"));
        assert!(!is_url("ftp://example.com/a.mp3"));
    }
}
