use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::detector::AmplitudeDetector;
use super::device::{AudioDevice, AudioFrame};
use crate::error::CaptureError;

/// Bounded wait for the read loop to observe a stop request.
const STOP_WAIT: Duration = Duration::from_secs(5);

/// Recording state machine.
///
/// `Idle -> Recording -> Stopping -> {Completed | Cancelled | Error}`;
/// terminal states transition back to `Idle` once cleanup is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Recording,
    Stopping,
    Completed,
    Cancelled,
    Error,
}

/// Configuration for capture-to-transcribe recording.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Sample rate for captured audio (16 kHz for transcription)
    pub sample_rate: u32,
    /// Channel count (1 = mono)
    pub channels: u16,
    /// Directory for recorded WAV files
    pub output_dir: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            output_dir: PathBuf::from("recordings"),
        }
    }
}

/// Handle to a completed recording.
#[derive(Debug, Clone)]
pub struct RecordingOutput {
    pub id: Uuid,
    pub path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub samples: usize,
    pub duration_secs: f64,
    pub sample_rate: u32,
}

struct ActiveRecording {
    id: Uuid,
    started_at: DateTime<Utc>,
    path: PathBuf,
    task: JoinHandle<Result<usize, CaptureError>>,
}

/// Owns the capture device and the recording state machine.
///
/// Exactly one recording may be live at a time; the read loop runs on its
/// own task so it is never blocked by network or UI work. Live level updates
/// are published once per device block through a watch cell.
pub struct AudioCaptureSession {
    config: CaptureConfig,
    device: Mutex<Box<dyn AudioDevice>>,
    detector: Arc<AmplitudeDetector>,
    state_tx: Arc<watch::Sender<CaptureState>>,
    level_tx: Arc<watch::Sender<f32>>,
    keep_running: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
    active: Mutex<Option<ActiveRecording>>,
}

impl AudioCaptureSession {
    pub fn new(
        config: CaptureConfig,
        device: Box<dyn AudioDevice>,
        detector: Arc<AmplitudeDetector>,
    ) -> Self {
        let (state_tx, _) = watch::channel(CaptureState::Idle);
        let (level_tx, _) = watch::channel(0.0f32);
        Self {
            config,
            device: Mutex::new(device),
            detector,
            state_tx: Arc::new(state_tx),
            level_tx: Arc::new(level_tx),
            keep_running: Arc::new(AtomicBool::new(false)),
            stop_signal: Arc::new(Notify::new()),
            active: Mutex::new(None),
        }
    }

    /// Observable recording state.
    pub fn state(&self) -> watch::Receiver<CaptureState> {
        self.state_tx.subscribe()
    }

    /// Observable live amplitude level, one update per device block.
    pub fn level(&self) -> watch::Receiver<f32> {
        self.level_tx.subscribe()
    }

    pub fn is_recording(&self) -> bool {
        self.keep_running.load(Ordering::SeqCst)
    }

    /// Start a new recording.
    ///
    /// Fails with `AlreadyRecording` if a session is live, and with
    /// `DeviceUnavailable` / `PermissionDenied` if the device cannot be
    /// opened.
    pub async fn start(&self) -> Result<Uuid, CaptureError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }

        let frame_rx = {
            let mut device = self.device.lock().await;
            device.start().await?
        };

        let id = Uuid::new_v4();
        let path = self.config.output_dir.join(format!("rec-{}.wav", id));

        let sink = match self.open_sink(&path) {
            Ok(sink) => sink,
            Err(e) => {
                self.release_device().await;
                return Err(e);
            }
        };

        info!("Recording started: {} -> {:?}", id, path);

        self.keep_running.store(true, Ordering::SeqCst);
        self.state_tx.send_replace(CaptureState::Recording);

        let task = tokio::spawn(read_loop(
            frame_rx,
            sink,
            Arc::clone(&self.detector),
            Arc::clone(&self.level_tx),
            Arc::clone(&self.state_tx),
            Arc::clone(&self.keep_running),
            Arc::clone(&self.stop_signal),
        ));

        *active = Some(ActiveRecording {
            id,
            started_at: Utc::now(),
            path,
            task,
        });

        Ok(id)
    }

    /// Stop the live recording and return a handle to the captured audio.
    ///
    /// Waits (bounded) for the read loop to drain, finalizes the WAV sink,
    /// and verifies the output is non-empty. The device is released on every
    /// exit path.
    pub async fn stop(&self) -> Result<RecordingOutput, CaptureError> {
        let mut active = self.active.lock().await;
        let mut rec = active.take().ok_or(CaptureError::NotRecording)?;

        self.state_tx.send_replace(CaptureState::Stopping);
        self.keep_running.store(false, Ordering::SeqCst);
        self.stop_signal.notify_one();

        let result = match tokio::time::timeout(STOP_WAIT, &mut rec.task).await {
            Ok(Ok(loop_result)) => loop_result,
            Ok(Err(join_err)) => Err(CaptureError::Io(format!(
                "capture loop failed: {}",
                join_err
            ))),
            Err(_) => {
                rec.task.abort();
                let _ = (&mut rec.task).await;
                Err(CaptureError::Io(
                    "timed out waiting for the capture loop to stop".to_string(),
                ))
            }
        };

        match result {
            Ok(samples) if samples > 0 => {
                let duration_secs = samples as f64
                    / (self.config.sample_rate as f64 * self.config.channels as f64);
                info!(
                    "Recording complete: {} ({} samples, {:.2}s)",
                    rec.id, samples, duration_secs
                );
                self.finish(CaptureState::Completed).await;
                Ok(RecordingOutput {
                    id: rec.id,
                    path: rec.path,
                    started_at: rec.started_at,
                    samples,
                    duration_secs,
                    sample_rate: self.config.sample_rate,
                })
            }
            Ok(_) => {
                warn!("Recording {} produced no audio, discarding", rec.id);
                let _ = fs::remove_file(&rec.path);
                self.finish(CaptureState::Error).await;
                Err(CaptureError::EmptyRecording)
            }
            Err(e) => {
                error!("Recording {} failed: {}", rec.id, e);
                let _ = fs::remove_file(&rec.path);
                self.finish(CaptureState::Error).await;
                Err(e)
            }
        }
    }

    /// Best-effort immediate stop, discarding any partial output.
    ///
    /// Idempotent and safe to call concurrently with an in-flight `stop()`;
    /// the read loop is interrupted rather than waited on.
    pub async fn cancel(&self) {
        let mut active = self.active.lock().await;
        let Some(mut rec) = active.take() else {
            return;
        };

        info!("Recording cancelled: {}", rec.id);

        self.keep_running.store(false, Ordering::SeqCst);
        self.stop_signal.notify_one();
        rec.task.abort();
        // Wait for the abort so the sink is dropped before the file is
        // unlinked.
        let _ = (&mut rec.task).await;
        let _ = fs::remove_file(&rec.path);

        self.finish(CaptureState::Cancelled).await;
    }

    fn open_sink(&self, path: &PathBuf) -> Result<WavSink, CaptureError> {
        fs::create_dir_all(&self.config.output_dir)
            .map_err(|e| CaptureError::Io(e.to_string()))?;
        WavSink::create(path.clone(), self.config.sample_rate, self.config.channels)
    }

    /// Single cleanup path for every exit route: publish the terminal state,
    /// release the device, reset the level meter, return to Idle.
    async fn finish(&self, terminal: CaptureState) {
        self.state_tx.send_replace(terminal);
        self.release_device().await;
        self.level_tx.send_replace(0.0);
        self.state_tx.send_replace(CaptureState::Idle);
    }

    async fn release_device(&self) {
        let mut device = self.device.lock().await;
        if let Err(e) = device.stop().await {
            warn!("Failed to release capture device: {}", e);
        }
    }
}

async fn read_loop(
    mut frame_rx: mpsc::Receiver<AudioFrame>,
    mut sink: WavSink,
    detector: Arc<AmplitudeDetector>,
    level_tx: Arc<watch::Sender<f32>>,
    state_tx: Arc<watch::Sender<CaptureState>>,
    keep_running: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
) -> Result<usize, CaptureError> {
    let mut written = 0usize;

    loop {
        if !keep_running.load(Ordering::SeqCst) {
            break;
        }

        tokio::select! {
            _ = stop_signal.notified() => {
                // Loop back to re-check the flag.
            }
            frame = frame_rx.recv() => match frame {
                Some(frame) => {
                    level_tx.send_replace(detector.level(&frame.samples));
                    if let Err(e) = sink.write(&frame.samples) {
                        keep_running.store(false, Ordering::SeqCst);
                        state_tx.send_replace(CaptureState::Error);
                        return Err(e);
                    }
                    written += frame.samples.len();
                }
                None => {
                    if keep_running.swap(false, Ordering::SeqCst) {
                        state_tx.send_replace(CaptureState::Error);
                        return Err(CaptureError::DeviceUnavailable(
                            "capture stream ended unexpectedly".to_string(),
                        ));
                    }
                    break;
                }
            }
        }
    }

    sink.finalize()?;
    Ok(written)
}

/// Writes captured PCM to disk as a WAV file.
struct WavSink {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: PathBuf,
}

impl WavSink {
    fn create(path: PathBuf, sample_rate: u32, channels: u16) -> Result<Self, CaptureError> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&path, spec)
            .map_err(|e| CaptureError::Io(format!("failed to create {:?}: {}", path, e)))?;

        Ok(Self {
            writer: Some(writer),
            path,
        })
    }

    fn write(&mut self, samples: &[i16]) -> Result<(), CaptureError> {
        if let Some(writer) = &mut self.writer {
            for &sample in samples {
                writer
                    .write_sample(sample)
                    .map_err(|e| CaptureError::Io(e.to_string()))?;
            }
        }
        Ok(())
    }

    fn finalize(mut self) -> Result<(), CaptureError> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| CaptureError::Io(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for WavSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV sink {:?} on drop: {}", self.path, e);
            }
        }
    }
}
