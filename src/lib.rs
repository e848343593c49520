pub mod audio;
pub mod config;
pub mod error;
pub mod link;
pub mod pipeline;
pub mod transcription;
pub mod trigger;

pub use audio::{
    AmplitudeDetector, AudioCaptureSession, AudioDevice, AudioFrame, CaptureConfig, CaptureState,
    Detection, DeviceConfig, MicrophoneDevice, RecordingOutput,
};
pub use config::Config;
pub use error::{CaptureError, LinkError, TriggerError, UploadError};
pub use link::{ConnectionMonitor, ConnectionState, DeviceLink, LinkEvent, NullLink, PeerId};
pub use pipeline::{PipelineView, VoicePipeline};
pub use transcription::{
    RetryPolicy, ServerStatus, TranscriptionRequest, TranscriptionResult,
    TranscriptionUploadClient, UploadProgress,
};
pub use trigger::{
    HapticFeedback, NoHaptics, TriggerCoordinator, TriggerEvent, TriggerHandler, TriggerType,
};
