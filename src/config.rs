use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::audio::{CaptureConfig, DeviceConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub trigger: TriggerSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Transcription server base URL
    pub url: String,
    /// Language code sent with each upload (th, en)
    pub language: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Sample rate for capture-to-transcribe recordings
    pub capture_sample_rate: u32,
    /// Sample rate for trigger monitoring
    pub trigger_sample_rate: u32,
    pub channels: u16,
    /// Device block duration in milliseconds
    pub block_ms: u64,
    pub output_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerSettings {
    /// RMS trigger threshold
    pub threshold: u32,
    /// Trigger cooldown in milliseconds
    pub cooldown_ms: u64,
    /// Upload each clip as soon as it is captured
    pub auto_transcribe: bool,
    /// Clip length recorded after a trigger
    pub recording_duration_secs: u64,
}

impl Config {
    /// Load configuration: built-in defaults overlaid with an optional file.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("server.url", "http://192.168.1.100:8000")?
            .set_default("server.language", "th")?
            .set_default("audio.capture_sample_rate", 16000)?
            .set_default("audio.trigger_sample_rate", 8000)?
            .set_default("audio.channels", 1)?
            .set_default("audio.block_ms", 20)?
            .set_default("audio.output_dir", "recordings")?
            .set_default("trigger.threshold", 2000)?
            .set_default("trigger.cooldown_ms", 5000)?
            .set_default("trigger.auto_transcribe", true)?
            .set_default("trigger.recording_duration_secs", 10)?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.trigger.cooldown_ms)
    }

    pub fn recording_duration(&self) -> Duration {
        Duration::from_secs(self.trigger.recording_duration_secs)
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.audio.capture_sample_rate,
            channels: self.audio.channels,
            output_dir: PathBuf::from(&self.audio.output_dir),
        }
    }

    pub fn capture_device_config(&self) -> DeviceConfig {
        DeviceConfig {
            sample_rate: self.audio.capture_sample_rate,
            channels: self.audio.channels,
            block_ms: self.audio.block_ms,
            device_name: None,
        }
    }

    pub fn trigger_device_config(&self) -> DeviceConfig {
        DeviceConfig {
            sample_rate: self.audio.trigger_sample_rate,
            channels: self.audio.channels,
            block_ms: self.audio.block_ms,
            device_name: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::load(None).expect("built-in defaults are valid")
    }
}
