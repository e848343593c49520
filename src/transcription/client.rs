use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use super::transport::{ProgressFn, ReqwestTransport, TranscribeTransport, TransportError};
use super::types::{ServerStatus, TranscriptionRequest, TranscriptionResult, UploadProgress};
use crate::error::UploadError;

/// Payload size ceiling enforced before any network call.
pub const MAX_PAYLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Retry and timeout policy for transcription uploads.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (3 retries = 4 total attempts)
    pub max_retries: u32,
    /// Backoff unit; the delay before retry N is `N * backoff_unit`
    pub backoff_unit: Duration,
    /// Overall deadline for a single attempt
    pub request_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Timeout for health/liveness probes
    pub probe_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_unit: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Linearly increasing backoff before retry `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit * attempt
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Uploads finished recordings to the transcription server with retry,
/// backoff, and progress events.
///
/// One upload at a time per process; a second concurrent call is rejected
/// with a terminal `AlreadyUploading` event rather than queued.
pub struct TranscriptionUploadClient {
    transport: Arc<dyn TranscribeTransport>,
    policy: RetryPolicy,
    uploading: Arc<AtomicBool>,
}

impl TranscriptionUploadClient {
    pub fn new(transport: Arc<dyn TranscribeTransport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            uploading: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Client over the default reqwest transport.
    pub fn with_default_transport(policy: RetryPolicy) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(policy.connect_timeout)?;
        Ok(Self::new(Arc::new(transport), policy))
    }

    /// Upload one recording. Returns the progress stream; the upload itself
    /// runs on its own task so a slow network call never stalls the caller.
    pub fn upload(&self, request: TranscriptionRequest) -> mpsc::Receiver<UploadProgress> {
        let (tx, rx) = mpsc::channel(32);

        if self.uploading.swap(true, Ordering::SeqCst) {
            tokio::spawn(async move {
                let _ = tx.send(UploadProgress::Error(UploadError::AlreadyUploading)).await;
            });
            return rx;
        }

        let guard = UploadGuard(Arc::clone(&self.uploading));
        let transport = Arc::clone(&self.transport);
        let policy = self.policy.clone();

        tokio::spawn(async move {
            let _guard = guard;
            run_upload(transport, policy, request, tx).await;
        });

        rx
    }

    /// Short liveness probe of `GET {server_url}/ping`.
    pub async fn test_connection(&self, server_url: &str) -> Result<bool, UploadError> {
        let url = format!("{}/ping", server_url.trim_end_matches('/'));
        match self.transport.get(&url, self.policy.probe_timeout).await {
            Ok(reply) => Ok(reply.is_success()),
            Err(TransportError::Timeout) => Err(UploadError::NetworkTimeout),
            Err(e) => {
                warn!("Connection probe failed: {}", e);
                Ok(false)
            }
        }
    }

    /// Fetch `GET {server_url}/health`.
    pub async fn get_server_status(&self, server_url: &str) -> Result<ServerStatus, UploadError> {
        let url = format!("{}/health", server_url.trim_end_matches('/'));
        let reply = self
            .transport
            .get(&url, self.policy.probe_timeout)
            .await
            .map_err(|_| UploadError::NetworkTimeout)?;

        if !reply.is_success() {
            return Err(UploadError::HttpError(reply.status));
        }

        serde_json::from_slice(&reply.body)
            .map_err(|e| UploadError::ResponseParsing(e.to_string()))
    }
}

/// Clears the single-upload flag on every exit route.
struct UploadGuard(Arc<AtomicBool>);

impl Drop for UploadGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

async fn run_upload(
    transport: Arc<dyn TranscribeTransport>,
    policy: RetryPolicy,
    request: TranscriptionRequest,
    tx: mpsc::Sender<UploadProgress>,
) {
    let _ = tx.send(UploadProgress::Started).await;

    // Validation happens before anything touches the network.
    if request.audio.is_empty() {
        let _ = tx
            .send(UploadProgress::Error(UploadError::InvalidPayload(
                "payload is empty".to_string(),
            )))
            .await;
        return;
    }
    if request.audio.len() > MAX_PAYLOAD_BYTES {
        let _ = tx
            .send(UploadProgress::Error(UploadError::InvalidPayload(format!(
                "payload is {} bytes, ceiling is {}",
                request.audio.len(),
                MAX_PAYLOAD_BYTES
            ))))
            .await;
        return;
    }

    let progress: ProgressFn = {
        let tx = tx.clone();
        Arc::new(move |percent| {
            // Metering only; drop updates rather than stall the body stream.
            let _ = tx.try_send(UploadProgress::Uploading(percent));
        })
    };

    let mut last_error = UploadError::NetworkTimeout;

    for attempt in 1..=policy.total_attempts() {
        let outcome = tokio::time::timeout(
            policy.request_timeout,
            transport.post_audio(
                &request.server_url,
                request.audio.clone(),
                &request.language,
                Arc::clone(&progress),
            ),
        )
        .await;

        match outcome {
            Ok(Ok(reply)) if reply.is_success() => {
                let _ = tx.send(UploadProgress::Processing).await;
                match serde_json::from_slice::<TranscriptionResult>(&reply.body) {
                    Ok(parsed) => {
                        let parsed = parsed.dedup_keywords();
                        info!(
                            "Transcription succeeded on attempt {} ({} keywords)",
                            attempt,
                            parsed.keywords.len()
                        );
                        let _ = tx.send(UploadProgress::Success(parsed)).await;
                    }
                    Err(e) => {
                        let _ = tx
                            .send(UploadProgress::Error(UploadError::ResponseParsing(
                                e.to_string(),
                            )))
                            .await;
                    }
                }
                return;
            }
            Ok(Ok(reply)) => match reply.status {
                400 => {
                    let _ = tx
                        .send(UploadProgress::Error(UploadError::BadRequest(
                            reply.body_text(),
                        )))
                        .await;
                    return;
                }
                500..=599 => {
                    warn!("Upload attempt {} got server error {}", attempt, reply.status);
                    last_error = UploadError::ServerError;
                }
                status => {
                    let _ = tx
                        .send(UploadProgress::Error(UploadError::HttpError(status)))
                        .await;
                    return;
                }
            },
            Ok(Err(e)) => {
                warn!("Upload attempt {} failed: {}", attempt, e);
                last_error = UploadError::NetworkTimeout;
            }
            Err(_) => {
                warn!("Upload attempt {} hit the request deadline", attempt);
                last_error = UploadError::NetworkTimeout;
            }
        }

        if attempt <= policy.max_retries {
            let delay = policy.backoff(attempt);
            info!(
                "Retrying upload in {:?} (attempt {}/{})",
                delay,
                attempt + 1,
                policy.total_attempts()
            );
            tokio::time::sleep(delay).await;
        }
    }

    let _ = tx.send(UploadProgress::Error(last_error)).await;
}
