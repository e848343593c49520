use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::device::{AudioDevice, AudioFrame, DeviceConfig};
use crate::error::CaptureError;

/// cpal-backed microphone input.
///
/// cpal streams are not `Send`, so the stream lives on a dedicated worker
/// thread for the lifetime of a capture; the worker pushes fixed-size blocks
/// into an mpsc channel and exits when `stop()` clears the running flag.
pub struct MicrophoneDevice {
    config: DeviceConfig,
    running: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl MicrophoneDevice {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Classify a device-open failure. cpal reports OS permission refusals
    /// as backend-specific errors, so the mapping goes by message text.
    fn open_error(text: String) -> CaptureError {
        let lower = text.to_lowercase();
        if lower.contains("permission") || lower.contains("access denied") {
            CaptureError::PermissionDenied
        } else {
            CaptureError::DeviceUnavailable(text)
        }
    }
}

#[async_trait::async_trait]
impl AudioDevice for MicrophoneDevice {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.worker.is_some() {
            return Err(CaptureError::DeviceUnavailable(
                "microphone already started".to_string(),
            ));
        }

        let (frame_tx, frame_rx) = mpsc::channel::<AudioFrame>(64);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), CaptureError>>();

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let config = self.config.clone();

        let worker = thread::spawn(move || {
            run_capture_thread(config, running, frame_tx, ready_tx);
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                self.worker = Some(worker);
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = worker.join();
                Err(CaptureError::DeviceUnavailable(
                    "capture thread exited before the stream opened".to_string(),
                ))
            }
        }
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            tokio::task::spawn_blocking(move || {
                if worker.join().is_err() {
                    warn!("Microphone worker thread panicked");
                }
            })
            .await
            .map_err(|e| CaptureError::Io(e.to_string()))?;
        }
        Ok(())
    }

    fn block_size(&self) -> Option<usize> {
        let block = self.config.block_samples();
        (block > 0).then_some(block)
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

fn run_capture_thread(
    config: DeviceConfig,
    running: Arc<AtomicBool>,
    frame_tx: mpsc::Sender<AudioFrame>,
    ready_tx: oneshot::Sender<Result<(), CaptureError>>,
) {
    let host = cpal::default_host();

    let device = match &config.device_name {
        Some(name) => host
            .input_devices()
            .ok()
            .and_then(|mut devices| {
                devices.find(|d| d.name().map(|n| n == *name).unwrap_or(false))
            }),
        None => host.default_input_device(),
    };

    let Some(device) = device else {
        let _ = ready_tx.send(Err(CaptureError::DeviceUnavailable(
            "no input device available".to_string(),
        )));
        return;
    };

    let supported = match device.default_input_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            let _ = ready_tx.send(Err(MicrophoneDevice::open_error(e.to_string())));
            return;
        }
    };

    let stream_config = StreamConfig {
        channels: config.channels,
        sample_rate: SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        "Opening microphone: {} ({} Hz, {} ch, {} ms blocks)",
        device.name().unwrap_or_else(|_| "unknown".to_string()),
        config.sample_rate,
        config.channels,
        config.block_ms
    );

    let block_samples = config.block_samples().max(1);
    let sample_rate = config.sample_rate;
    let channels = config.channels;
    let started = Instant::now();
    let mut pending: Vec<i16> = Vec::with_capacity(block_samples * 2);

    let mut push_samples = move |samples: &mut dyn Iterator<Item = i16>| {
        pending.extend(samples);
        while pending.len() >= block_samples {
            let block: Vec<i16> = pending.drain(..block_samples).collect();
            let frame = AudioFrame {
                samples: block,
                sample_rate,
                channels,
                timestamp_ms: started.elapsed().as_millis() as u64,
            };
            // Drop the block rather than stall the audio callback.
            if frame_tx.try_send(frame).is_err() {
                warn!("Audio frame channel full, dropping block");
            }
        }
    };

    let err_running = Arc::clone(&running);
    let err_fn = move |e: cpal::StreamError| {
        error!("Microphone stream error: {}", e);
        err_running.store(false, Ordering::SeqCst);
    };

    let stream = match supported.sample_format() {
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                push_samples(&mut data.iter().copied());
            },
            err_fn,
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                push_samples(&mut data.iter().map(|&s| {
                    (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
                }));
            },
            err_fn,
            None,
        ),
        other => {
            let _ = ready_tx.send(Err(CaptureError::DeviceUnavailable(format!(
                "unsupported sample format: {:?}",
                other
            ))));
            return;
        }
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(MicrophoneDevice::open_error(e.to_string())));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(MicrophoneDevice::open_error(e.to_string())));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    while running.load(Ordering::SeqCst) {
        thread::park_timeout(Duration::from_millis(50));
    }

    // Dropping the stream tears down the callback, which closes the frame
    // channel and lets any read loop observe end-of-stream.
    drop(stream);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_refusals_map_to_permission_denied() {
        assert!(matches!(
            MicrophoneDevice::open_error("Permission denied by the OS".to_string()),
            CaptureError::PermissionDenied
        ));
        assert!(matches!(
            MicrophoneDevice::open_error("microphone access denied".to_string()),
            CaptureError::PermissionDenied
        ));
        assert!(matches!(
            MicrophoneDevice::open_error("device busy".to_string()),
            CaptureError::DeviceUnavailable(_)
        ));
    }
}
