use std::collections::HashSet;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// One transcription request, built once per completed recording and
/// consumed exactly once by the upload client.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub audio: Bytes,
    pub server_url: String,
    pub language: String,
}

/// Structured transcript returned by the server.
///
/// Unknown response fields are ignored; missing optionals coerce to
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    #[serde(default)]
    pub full_text: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub word_count: Option<u32>,
}

impl TranscriptionResult {
    /// Keyword membership set for transcript highlighting.
    pub fn keyword_set(&self) -> HashSet<&str> {
        self.keywords.iter().map(|k| k.as_str()).collect()
    }

    /// Drop duplicate keywords, preserving server order.
    pub fn dedup_keywords(mut self) -> Self {
        let mut seen = HashSet::new();
        self.keywords.retain(|k| seen.insert(k.to_lowercase()));
        self
    }
}

/// Server status reported by `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub model_loaded: bool,
    #[serde(default)]
    pub supported_languages: Vec<String>,
}

/// Progress of one upload: a lazy, single-pass, non-restartable stream
/// consumed once per call.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadProgress {
    Started,
    Uploading(u8),
    Processing,
    Success(TranscriptionResult),
    Error(UploadError),
}

impl UploadProgress {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadProgress::Success(_) | UploadProgress::Error(_))
    }
}
