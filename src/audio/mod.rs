pub mod capture;
pub mod detector;
pub mod device;
pub mod microphone;

pub use capture::{AudioCaptureSession, CaptureConfig, CaptureState, RecordingOutput};
pub use detector::{AmplitudeDetector, Detection};
pub use device::{AudioDevice, AudioFrame, DeviceConfig};
pub use microphone::MicrophoneDevice;
