use tokio::sync::mpsc;

use crate::error::CaptureError;

/// One block of captured audio (16-bit PCM, mono).
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for an audio input device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Target sample rate (8 kHz for trigger monitoring, 16 kHz for capture)
    pub sample_rate: u32,
    /// Target channel count (1 = mono)
    pub channels: u16,
    /// Block duration in milliseconds (affects metering cadence)
    pub block_ms: u64,
    /// Named input device, or None for the platform default
    pub device_name: Option<String>,
}

impl DeviceConfig {
    /// Samples per block at the configured rate.
    pub fn block_samples(&self) -> usize {
        (self.sample_rate as u64 * self.block_ms / 1000) as usize * self.channels as usize
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            block_ms: 20,
            device_name: None,
        }
    }
}

/// Audio input device abstraction.
///
/// Implementations:
/// - `MicrophoneDevice`: cpal-backed microphone input
/// - scripted fakes in the test suite
#[async_trait::async_trait]
pub trait AudioDevice: Send + Sync {
    /// Start capturing. Returns a channel receiver that delivers fixed-size
    /// blocks until `stop()` is called or the device fails.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError>;

    /// Stop capturing and release the device handle. Idempotent.
    async fn stop(&mut self) -> Result<(), CaptureError>;

    /// Block size in samples, or None while the device cannot compute one.
    fn block_size(&self) -> Option<usize>;

    /// Device name for logging.
    fn name(&self) -> &str;
}
