//! Query → ordered candidate list.
//!
//! The resolver never fails: backend errors and empty results are logged and
//! surface as an empty [`Resolution`], which the command layer reports as
//! "No results were found!".

use serenity::model::id::UserId;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    Candidate, ExternalService, ProviderTag, SearchBackend, SearchEngine, SearchOptions,
    YouTubeClient,
};

/// Resultado de resolver una query
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub candidates: Vec<Candidate>,
    /// Provider class of the original request; drives rescue eligibility.
    pub origin: ProviderTag,
    pub service: Option<ExternalService>,
    /// Text actually searched (differs from the query after a metadata lookup).
    pub effective_query: String,
    /// The external-service metadata lookup failed and the raw query was searched.
    pub lookup_failed: bool,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Metadata lookup succeeded and a secondary search was run.
    pub fn redirected(&self) -> bool {
        self.service.is_some_and(|s| !s.supports_direct_streaming()) && !self.lookup_failed
    }
}

/// Resolutor de fuentes con redirección entre proveedores
pub struct SourceResolver {
    pub(super) backend: Arc<dyn SearchBackend>,
    fallback_cap: usize,
}

impl SourceResolver {
    pub fn new(backend: Arc<dyn SearchBackend>, fallback_cap: usize) -> Self {
        Self {
            backend,
            fallback_cap: fallback_cap.max(1),
        }
    }

    /// Resuelve una query o URL en hasta `fallback_cap` candidatos
    pub async fn resolve(&self, query: &str, requester: UserId) -> Resolution {
        let query = query.trim();

        if let Some(service) = ExternalService::detect(query) {
            return self.resolve_external(query, service, requester).await;
        }

        let origin = if YouTubeClient::is_watch_page(query) {
            ProviderTag::DirectLink
        } else {
            ProviderTag::WebSearch
        };

        let options = SearchOptions::new(requester);
        let candidates = self
            .search_safe(query, &options)
            .await
            .into_iter()
            .map(|c| c.with_provider(origin))
            .collect();

        Resolution {
            candidates: self.cap(candidates),
            origin,
            service: None,
            effective_query: query.to_string(),
            lookup_failed: false,
        }
    }

    async fn resolve_external(
        &self,
        query: &str,
        service: ExternalService,
        requester: UserId,
    ) -> Resolution {
        info!("🔗 Enlace de {} detectado: {}", service.display_name(), query);
        let options = SearchOptions::new(requester);

        let lookup = self.search_safe(query, &options).await;
        let Some(first) = lookup.first() else {
            warn!(
                "⚠️ No se pudo extraer info de {}, se busca la URL directamente",
                service.display_name()
            );
            let options = options.with_engine(SearchEngine::YouTube);
            let candidates = self.search_safe(query, &options).await;
            return Resolution {
                candidates: self.cap(candidates),
                origin: ProviderTag::WebSearch,
                service: Some(service),
                effective_query: query.to_string(),
                lookup_failed: true,
            };
        };

        if service.supports_direct_streaming() {
            debug!("▶️ {} soporta streaming directo", service.display_name());
            let candidates = lookup
                .into_iter()
                .map(|c| c.with_provider(ProviderTag::ExternalService))
                .collect();
            return Resolution {
                candidates: self.cap(candidates),
                origin: ProviderTag::ExternalService,
                service: Some(service),
                effective_query: query.to_string(),
                lookup_failed: false,
            };
        }

        let effective_query = first.search_text();
        info!(
            "✅ Encontrado '{}' en {}, buscando en YouTube",
            effective_query,
            service.display_name()
        );

        let options = options.with_engine(SearchEngine::YouTube);
        let candidates = self
            .search_safe(&effective_query, &options)
            .await
            .into_iter()
            .map(|c| c.with_provider(ProviderTag::WebSearch))
            .collect();

        Resolution {
            candidates: self.cap(candidates),
            origin: ProviderTag::ExternalService,
            service: Some(service),
            effective_query,
            lookup_failed: false,
        }
    }

    /// Búsqueda por título usada para el rescate de enlaces directos
    pub async fn search_title(&self, title: &str, requester: UserId) -> Vec<Candidate> {
        let options = SearchOptions::new(requester).with_engine(SearchEngine::YouTube);
        self.search_safe(title, &options)
            .await
            .into_iter()
            .map(|c| c.with_provider(ProviderTag::WebSearch))
            .collect()
    }

    pub(super) async fn search_safe(&self, query: &str, options: &SearchOptions) -> Vec<Candidate> {
        match self.backend.search(query, options).await {
            Ok(found) => {
                if found.is_empty() {
                    debug!("Sin resultados para '{}' ({:?})", query, options.engine);
                }
                found
            }
            Err(e) => {
                warn!("⚠️ Error de búsqueda para '{}': {:#}", query, e);
                Vec::new()
            }
        }
    }

    fn cap(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|c| seen.insert(c.source_id().to_string()))
            .take(self.fallback_cap)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MockSearchBackend;
    use pretty_assertions::assert_eq;

    fn user() -> UserId {
        UserId::new(42)
    }

    fn web(id: &str, title: &str) -> Candidate {
        Candidate::new(format!("https://www.youtube.com/watch?v={id}"), title, ProviderTag::WebSearch)
    }

    fn ids(resolution: &Resolution) -> Vec<&str> {
        resolution.candidates.iter().map(|c| c.source_id()).collect()
    }

    #[tokio::test]
    async fn test_text_search_is_capped_at_three() {
        let mut backend = MockSearchBackend::new();
        backend
            .expect_search()
            .withf(|q, o| q == "daft punk" && o.engine == SearchEngine::Auto)
            .times(1)
            .returning(|_, _| {
                Ok((1..=5).map(|i| web(&i.to_string(), &format!("t{i}"))).collect())
            });

        let resolver = SourceResolver::new(Arc::new(backend), 3);
        let resolution = resolver.resolve("  daft punk ", user()).await;

        assert_eq!(resolution.origin, ProviderTag::WebSearch);
        assert_eq!(resolution.candidates.len(), 3);
        assert_eq!(resolution.effective_query, "daft punk");
    }

    #[tokio::test]
    async fn test_watch_page_is_tagged_direct_link() {
        let mut backend = MockSearchBackend::new();
        backend
            .expect_search()
            .times(1)
            .returning(|_, _| Ok(vec![web("abc", "Song")]));

        let resolver = SourceResolver::new(Arc::new(backend), 3);
        let resolution = resolver
            .resolve("https://www.youtube.com/watch?v=abc", user())
            .await;

        assert_eq!(resolution.origin, ProviderTag::DirectLink);
        assert_eq!(resolution.candidates[0].provider(), ProviderTag::DirectLink);
    }

    #[tokio::test]
    async fn test_spotify_link_redirects_to_secondary_search() {
        let mut backend = MockSearchBackend::new();
        backend
            .expect_search()
            .withf(|q, o| q.contains("spotify.com") && o.engine == SearchEngine::Auto)
            .times(1)
            .returning(|q, _| {
                Ok(vec![Candidate::new(q, "One More Time", ProviderTag::ExternalService)
                    .with_author("Daft Punk")])
            });
        backend
            .expect_search()
            .withf(|q, o| q == "Daft Punk One More Time" && o.engine == SearchEngine::YouTube)
            .times(1)
            .returning(|_, _| Ok(vec![web("a", "A"), web("b", "B")]));

        let resolver = SourceResolver::new(Arc::new(backend), 3);
        let resolution = resolver
            .resolve("https://open.spotify.com/track/xyz", user())
            .await;

        assert_eq!(resolution.service, Some(ExternalService::Spotify));
        assert_eq!(resolution.origin, ProviderTag::ExternalService);
        assert_eq!(resolution.effective_query, "Daft Punk One More Time");
        assert!(resolution.redirected());
        assert!(resolution
            .candidates
            .iter()
            .all(|c| c.provider() == ProviderTag::WebSearch));
        assert_eq!(ids(&resolution).len(), 2);
    }

    #[tokio::test]
    async fn test_soundcloud_streams_directly_without_secondary_search() {
        let mut backend = MockSearchBackend::new();
        backend.expect_search().times(1).returning(|q, _| {
            Ok(vec![Candidate::new(q, "Set", ProviderTag::ExternalService)])
        });

        let resolver = SourceResolver::new(Arc::new(backend), 3);
        let resolution = resolver
            .resolve("https://soundcloud.com/dj/set", user())
            .await;

        assert_eq!(ids(&resolution), vec!["https://soundcloud.com/dj/set"]);
        assert_eq!(resolution.candidates[0].provider(), ProviderTag::ExternalService);
        assert!(!resolution.lookup_failed);
    }

    #[tokio::test]
    async fn test_failed_lookup_falls_through_to_raw_query() {
        let mut backend = MockSearchBackend::new();
        backend
            .expect_search()
            .withf(|_, o| o.engine == SearchEngine::Auto)
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("oembed 404")));
        backend
            .expect_search()
            .withf(|q, o| q.contains("music.apple.com") && o.engine == SearchEngine::YouTube)
            .times(1)
            .returning(|_, _| Ok(vec![web("z", "Z")]));

        let resolver = SourceResolver::new(Arc::new(backend), 3);
        let resolution = resolver
            .resolve("https://music.apple.com/us/album/a/1?i=2", user())
            .await;

        assert!(resolution.lookup_failed);
        assert_eq!(resolution.origin, ProviderTag::WebSearch);
        assert_eq!(resolution.candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_backend_errors_become_empty() {
        let mut backend = MockSearchBackend::new();
        backend
            .expect_search()
            .returning(|_, _| Err(anyhow::anyhow!("yt-dlp exploded")));

        let resolver = SourceResolver::new(Arc::new(backend), 3);
        let resolution = resolver.resolve("anything", user()).await;
        assert!(resolution.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_results_collapse() {
        let mut backend = MockSearchBackend::new();
        backend
            .expect_search()
            .returning(|_, _| Ok(vec![web("a", "A"), web("a", "A again"), web("b", "B")]));

        let resolver = SourceResolver::new(Arc::new(backend), 3);
        let resolution = resolver.resolve("a", user()).await;
        assert_eq!(
            ids(&resolution),
            vec![
                "https://www.youtube.com/watch?v=a",
                "https://www.youtube.com/watch?v=b"
            ]
        );
    }
}
