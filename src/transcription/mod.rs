pub mod client;
pub mod transport;
pub mod types;

pub use client::{RetryPolicy, TranscriptionUploadClient, MAX_PAYLOAD_BYTES};
pub use transport::{HttpReply, ProgressFn, ReqwestTransport, TranscribeTransport, TransportError};
pub use types::{ServerStatus, TranscriptionRequest, TranscriptionResult, UploadProgress};
