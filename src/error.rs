use thiserror::Error;

/// Errors surfaced by the capture device and recording state machine.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording in progress")]
    NotRecording,

    #[error("recording produced no audio data")]
    EmptyRecording,

    #[error("capture i/o error: {0}")]
    Io(String),
}

/// Errors surfaced by the trigger listening loop.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("trigger listener already running")]
    AlreadyListening,

    #[error("trigger device is not ready")]
    DeviceNotReady,

    #[error(transparent)]
    Device(#[from] CaptureError),
}

/// Errors surfaced by the transcription upload client.
///
/// Cloneable because terminal errors travel inside `UploadProgress` events.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum UploadError {
    #[error("invalid audio payload: {0}")]
    InvalidPayload(String),

    #[error("an upload is already in progress")]
    AlreadyUploading,

    #[error("network timeout")]
    NetworkTimeout,

    #[error("server rejected request: {0}")]
    BadRequest(String),

    #[error("server error")]
    ServerError,

    #[error("unexpected http status {0}")]
    HttpError(u16),

    #[error("failed to parse server response: {0}")]
    ResponseParsing(String),
}

/// Errors surfaced by the device-link channel.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("no peers connected")]
    NoPeersConnected,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("peer discovery failed: {0}")]
    Discovery(String),
}
