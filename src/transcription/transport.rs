use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use thiserror::Error;
use tracing::debug;

/// Upload progress callback, invoked with percent sent.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Body chunk size for upload progress reporting.
const UPLOAD_CHUNK: usize = 64 * 1024;

/// Raw HTTP reply, status plus body.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: Bytes,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport-level failures, all retryable.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("i/o error: {0}")]
    Io(String),
}

/// HTTP seam for the upload client, so retry/backoff logic is testable
/// against a scripted fake.
#[async_trait::async_trait]
pub trait TranscribeTransport: Send + Sync {
    /// Multipart POST to `{server_url}/transcribe` with fields `audio_file`
    /// (audio/pcm) and `language`.
    async fn post_audio(
        &self,
        server_url: &str,
        audio: Bytes,
        language: &str,
        progress: ProgressFn,
    ) -> Result<HttpReply, TransportError>;

    /// Plain GET with a per-call timeout (health and liveness probes).
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpReply, TransportError>;
}

/// reqwest-backed transport.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(Self { client })
    }

    fn map_error(e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Io(e.to_string())
        }
    }
}

#[async_trait::async_trait]
impl TranscribeTransport for ReqwestTransport {
    async fn post_audio(
        &self,
        server_url: &str,
        audio: Bytes,
        language: &str,
        progress: ProgressFn,
    ) -> Result<HttpReply, TransportError> {
        let total = audio.len();
        let url = format!("{}/transcribe", server_url.trim_end_matches('/'));
        debug!("POST {} ({} bytes, language={})", url, total, language);

        // Stream the payload in fixed chunks so progress is observable as
        // the body goes out.
        let chunks: Vec<Bytes> = (0..total)
            .step_by(UPLOAD_CHUNK)
            .map(|off| audio.slice(off..(off + UPLOAD_CHUNK).min(total)))
            .collect();

        let mut sent = 0usize;
        let body_stream = futures::stream::iter(chunks).map(move |chunk| {
            sent += chunk.len();
            let percent = if total == 0 {
                100
            } else {
                (sent * 100 / total) as u8
            };
            progress(percent);
            Ok::<Bytes, Infallible>(chunk)
        });

        let part = reqwest::multipart::Part::stream_with_length(
            reqwest::Body::wrap_stream(body_stream),
            total as u64,
        )
        .file_name("recording.pcm")
        .mime_str("audio/pcm")
        .map_err(|e| TransportError::Io(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .part("audio_file", part)
            .text("language", language.to_string());

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(Self::map_error)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(Self::map_error)?;

        Ok(HttpReply { status, body })
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpReply, TransportError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(Self::map_error)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(Self::map_error)?;

        Ok(HttpReply { status, body })
    }
}
