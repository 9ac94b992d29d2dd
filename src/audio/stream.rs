use anyhow::Result;
use async_trait::async_trait;
use songbird::input::{HttpRequest, Input, YoutubeDl};
use tracing::debug;

use crate::error::{classify_message, StreamError};
use crate::sources::{Candidate, ProviderTag};

/// Obtención del stream de audio de un candidato
#[async_trait]
pub trait StreamBackend: Send + Sync {
    async fn fetch_stream(&self, candidate: &Candidate) -> Result<Input>;
}

/// Streams vía yt-dlp (o HTTP directo para adjuntos)
pub struct YtDlpStreams {
    http: reqwest::Client,
    program: &'static str,
}

impl YtDlpStreams {
    pub fn new(http: reqwest::Client, program: &'static str) -> Self {
        Self { http, program }
    }
}

#[async_trait]
impl StreamBackend for YtDlpStreams {
    async fn fetch_stream(&self, candidate: &Candidate) -> Result<Input> {
        let url = candidate.source_id().to_string();

        let input: Input = if candidate.provider() == ProviderTag::Attachment {
            debug!("🌐 Stream HTTP directo: {}", url);
            HttpRequest::new(self.http.clone(), url).into()
        } else {
            debug!("📥 Stream yt-dlp: {}", url);
            YoutubeDl::new_ytdl_like(self.program, self.http.clone(), url)
                .user_args(vec!["-f".into(), "bestaudio[ext=webm]/bestaudio/best".into()])
                .into()
        };

        Ok(input)
    }
}

/// Adaptador que clasifica los fallos de descarga sin tocar el backend
pub struct EnrichedStreams<B> {
    inner: B,
}

impl<B: StreamBackend> EnrichedStreams<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<B: StreamBackend> StreamBackend for EnrichedStreams<B> {
    async fn fetch_stream(&self, candidate: &Candidate) -> Result<Input> {
        self.inner
            .fetch_stream(candidate)
            .await
            .map_err(|e| enrich(candidate, format!("{:#}", e)).into())
    }
}

/// Convierte el texto de un fallo de stream en un [`StreamError`] clasificado.
///
/// Also used for errors that only surface once the track is made playable.
pub fn enrich(candidate: &Candidate, message: String) -> StreamError {
    StreamError {
        source_id: candidate.source_id().to_string(),
        kind: classify_message(&message),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{classify, BlockFlag, FailureKind};

    struct FailingStreams(&'static str);

    #[async_trait]
    impl StreamBackend for FailingStreams {
        async fn fetch_stream(&self, _candidate: &Candidate) -> Result<Input> {
            anyhow::bail!("{}", self.0)
        }
    }

    async fn kind_of(message: &'static str) -> FailureKind {
        let streams = EnrichedStreams::new(FailingStreams(message));
        let candidate = Candidate::new("https://youtu.be/x", "X", ProviderTag::DirectLink);
        let err = match streams.fetch_stream(&candidate).await {
            Ok(_) => panic!("stream should fail"),
            Err(e) => e,
        };
        assert!(err.downcast_ref::<StreamError>().is_some());
        classify(&err, &BlockFlag::default())
    }

    #[tokio::test]
    async fn test_adapter_classifies_download_failures() {
        assert_eq!(kind_of("Video unavailable").await, FailureKind::RetryableContent);
        assert_eq!(kind_of("read timed out").await, FailureKind::RetryableNetwork);
        assert_eq!(kind_of("HTTP Error 429: Too Many Requests").await, FailureKind::FatalBlock);
    }

    #[test]
    fn test_enrich_keeps_source() {
        let candidate = Candidate::new("https://a/b.mp3", "b.mp3", ProviderTag::Attachment);
        let err = enrich(&candidate, "No suitable format".into());
        assert_eq!(err.source_id, "https://a/b.mp3");
        assert_eq!(err.kind, FailureKind::RetryableContent);
    }
}
