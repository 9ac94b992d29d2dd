use serenity::model::channel::Attachment;
use serenity::model::id::UserId;
use tracing::{info, warn};

use super::direct_url::{extension, DirectUrlClient};
use super::{Candidate, ProviderTag, SearchEngine, SearchOptions, SourceResolver};
use crate::error::AttachmentError;

const AUDIO_CONTENT_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/mp3",
    "audio/ogg",
    "audio/wav",
    "audio/flac",
    "audio/x-m4a",
    "video/mp4",
];

/// Datos mínimos de un adjunto de Discord
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentInfo {
    pub name: String,
    pub url: String,
    pub content_type: Option<String>,
}

impl From<&Attachment> for AttachmentInfo {
    fn from(attachment: &Attachment) -> Self {
        Self {
            name: attachment.filename.clone(),
            url: attachment.url.clone(),
            content_type: attachment.content_type.clone(),
        }
    }
}

impl AttachmentInfo {
    /// Twitter exports need the auto-detecting engine first.
    pub fn is_twitter_audio(&self) -> bool {
        self.name.to_lowercase().contains("twitter") && extension(&self.name).as_deref() == Some("mp3")
    }

    /// Rechaza adjuntos que no son audio antes de tocar cualquier backend
    pub fn validate(&self) -> Result<(), AttachmentError> {
        let type_ok = self
            .content_type
            .as_deref()
            .is_some_and(|ct| AUDIO_CONTENT_TYPES.iter().any(|t| ct.contains(t)));
        if type_ok || DirectUrlClient::has_audio_extension(&self.name) {
            Ok(())
        } else {
            Err(AttachmentError::UnsupportedType(
                self.content_type.clone().unwrap_or_else(|| self.name.clone()),
            ))
        }
    }

    fn engines(&self) -> [SearchEngine; 2] {
        if self.is_twitter_audio() {
            [SearchEngine::Auto, SearchEngine::File]
        } else {
            [SearchEngine::File, SearchEngine::Auto]
        }
    }
}

impl SourceResolver {
    /// Resuelve un adjunto de audio en un único candidato
    pub async fn resolve_attachment(
        &self,
        attachment: &AttachmentInfo,
        requester: UserId,
    ) -> Result<Candidate, AttachmentError> {
        attachment.validate()?;
        info!("📎 Procesando adjunto: {} ({})", attachment.name, attachment.url);

        for engine in attachment.engines() {
            let options = SearchOptions::new(requester).with_engine(engine);
            let found = self.search_safe(&attachment.url, &options).await;

            if let Some(track) = found.into_iter().next() {
                let track = if track.title().trim().is_empty() {
                    track.with_title(attachment.name.clone())
                } else {
                    track
                };
                return Ok(track
                    .with_provider(ProviderTag::Attachment)
                    .with_origin_query(attachment.url.clone()));
            }
            warn!("⚠️ Adjunto {} sin resultados con {:?}", attachment.name, engine);
        }

        Err(AttachmentError::Unreadable {
            name: attachment.name.clone(),
            twitter: attachment.is_twitter_audio(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MockSearchBackend;
    use std::sync::Arc;

    fn info(name: &str, content_type: Option<&str>) -> AttachmentInfo {
        AttachmentInfo {
            name: name.to_string(),
            url: format!("https://cdn.discordapp.com/attachments/1/2/{name}"),
            content_type: content_type.map(str::to_string),
        }
    }

    #[test]
    fn test_validation_by_type_or_extension() {
        assert!(info("song.mp3", None).validate().is_ok());
        assert!(info("blob", Some("audio/mpeg")).validate().is_ok());
        assert!(info("clip.MP4", Some("application/octet-stream")).validate().is_ok());
        assert_eq!(
            info("notes.txt", Some("text/plain; charset=utf-8")).validate(),
            Err(AttachmentError::UnsupportedType("text/plain; charset=utf-8".into()))
        );
    }

    #[test]
    fn test_twitter_detection() {
        assert!(info("twitter_audio_123.mp3", None).is_twitter_audio());
        assert!(!info("twitter_audio_123.ogg", None).is_twitter_audio());
        assert!(!info("song.mp3", None).is_twitter_audio());
    }

    #[tokio::test]
    async fn test_text_file_never_reaches_backend() {
        let mut backend = MockSearchBackend::new();
        backend.expect_search().never();

        let resolver = SourceResolver::new(Arc::new(backend), 3);
        let result = resolver
            .resolve_attachment(&info("readme.txt", Some("text/plain")), UserId::new(7))
            .await;

        assert!(matches!(result, Err(AttachmentError::UnsupportedType(_))));
    }

    #[tokio::test]
    async fn test_file_engine_first_then_auto_and_name_as_title() {
        let mut backend = MockSearchBackend::new();
        let mut seq = mockall::Sequence::new();
        backend
            .expect_search()
            .withf(|_, o| o.engine == SearchEngine::File)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(vec![]));
        backend
            .expect_search()
            .withf(|_, o| o.engine == SearchEngine::Auto)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|q, _| Ok(vec![Candidate::new(q, "", ProviderTag::WebSearch)]));

        let resolver = SourceResolver::new(Arc::new(backend), 3);
        let track = resolver
            .resolve_attachment(&info("mix.flac", Some("audio/flac")), UserId::new(7))
            .await
            .unwrap();

        assert_eq!(track.title(), "mix.flac");
        assert_eq!(track.provider(), ProviderTag::Attachment);
    }

    #[tokio::test]
    async fn test_twitter_audio_tries_auto_first_and_reports_unreadable() {
        let mut backend = MockSearchBackend::new();
        let mut seq = mockall::Sequence::new();
        backend
            .expect_search()
            .withf(|_, o| o.engine == SearchEngine::Auto)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(anyhow::anyhow!("unsupported format")));
        backend
            .expect_search()
            .withf(|_, o| o.engine == SearchEngine::File)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(vec![]));

        let resolver = SourceResolver::new(Arc::new(backend), 3);
        let result = resolver
            .resolve_attachment(&info("twitter_clip.mp3", None), UserId::new(7))
            .await;

        assert_eq!(
            result,
            Err(AttachmentError::Unreadable {
                name: "twitter_clip.mp3".into(),
                twitter: true
            })
        );
    }
}
