use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::audio::{AudioCaptureSession, CaptureState, RecordingOutput};
use crate::config::Config;
use crate::error::TriggerError;
use crate::link::{
    paths, ConfigUpdateMessage, ConnectionMonitor, ConnectionState, DeviceLink, LinkEvent,
    StatusMessage, TriggerMessage,
};
use crate::transcription::{
    TranscriptionRequest, TranscriptionResult, TranscriptionUploadClient, UploadProgress,
};
use crate::trigger::{TriggerCoordinator, TriggerEvent, TriggerHandler};

/// Composite view over every observable cell in the pipeline, recomputed
/// whenever any input changes.
#[derive(Debug, Clone)]
pub struct PipelineView {
    pub connection: ConnectionState,
    pub capture: CaptureState,
    pub level: f32,
    pub listening: bool,
    pub trigger_count: u64,
    pub last_transcript: Option<TranscriptionResult>,
}

impl Default for PipelineView {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            capture: CaptureState::Idle,
            level: 0.0,
            listening: false,
            trigger_count: 0,
            last_transcript: None,
        }
    }
}

/// Wires the trigger loop to capture, relay, and upload.
///
/// Data flow: detector -> coordinator -> (local) capture start + (remote)
/// link relay -> timed stop -> upload -> transcript cell. Every failure
/// path logs and leaves the pipeline ready for the next trigger.
pub struct VoicePipeline {
    config: Config,
    capture: Arc<AudioCaptureSession>,
    coordinator: Arc<TriggerCoordinator>,
    monitor: Arc<ConnectionMonitor>,
    uploader: Arc<TranscriptionUploadClient>,
    link: Arc<dyn DeviceLink>,
    transcript_tx: Arc<watch::Sender<Option<TranscriptionResult>>>,
    view_tx: Arc<watch::Sender<PipelineView>>,
    clip_active: Arc<AtomicBool>,
}

impl VoicePipeline {
    pub fn new(
        config: Config,
        capture: Arc<AudioCaptureSession>,
        coordinator: Arc<TriggerCoordinator>,
        monitor: Arc<ConnectionMonitor>,
        uploader: Arc<TranscriptionUploadClient>,
        link: Arc<dyn DeviceLink>,
    ) -> Arc<Self> {
        let (transcript_tx, _) = watch::channel(None);
        let (view_tx, _) = watch::channel(PipelineView::default());

        Arc::new(Self {
            config,
            capture,
            coordinator,
            monitor,
            uploader,
            link,
            transcript_tx: Arc::new(transcript_tx),
            view_tx: Arc::new(view_tx),
            clip_active: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn capture(&self) -> &Arc<AudioCaptureSession> {
        &self.capture
    }

    pub fn coordinator(&self) -> &Arc<TriggerCoordinator> {
        &self.coordinator
    }

    pub fn monitor(&self) -> &Arc<ConnectionMonitor> {
        &self.monitor
    }

    /// Observable composite view.
    pub fn view(&self) -> watch::Receiver<PipelineView> {
        self.view_tx.subscribe()
    }

    /// Observable most-recent transcript.
    pub fn transcript(&self) -> watch::Receiver<Option<TranscriptionResult>> {
        self.transcript_tx.subscribe()
    }

    /// Start the view fan-in task and the trigger listening loop.
    pub async fn start(self: &Arc<Self>) -> Result<(), TriggerError> {
        self.spawn_view_task();

        let handler: Arc<dyn TriggerHandler> = Arc::new(PipelineTrigger {
            pipeline: Arc::downgrade(self),
        });
        self.coordinator
            .start_listening(handler, Some(self.config.trigger.threshold))
            .await
    }

    /// Stop listening and discard any in-flight recording.
    pub async fn shutdown(&self) {
        self.coordinator.stop_listening().await;
        self.capture.cancel().await;
        info!("Pipeline shut down");
    }

    /// React to one trigger: relay to the paired device, then record and
    /// transcribe locally.
    pub async fn handle_trigger(&self, event: TriggerEvent) {
        info!(
            "Trigger received ({:?}, amplitude={:.0})",
            event.trigger_type, event.source_amplitude
        );

        // Relay is at-most-once, best-effort.
        if let Err(e) = self.monitor.send_trigger(event.trigger_type).await {
            debug!("Trigger relay skipped: {}", e);
        }

        if self.config.trigger.auto_transcribe {
            self.record_clip().await;
        }
    }

    /// Record one fixed-length clip and upload it. A clip already in flight
    /// makes this a no-op.
    pub async fn record_clip(&self) {
        if self.clip_active.swap(true, Ordering::SeqCst) {
            debug!("Clip already in progress, ignoring trigger");
            return;
        }

        if let Err(e) = self.capture_and_upload().await {
            warn!("Clip failed: {:#}", e);
        }

        self.clip_active.store(false, Ordering::SeqCst);
    }

    async fn capture_and_upload(&self) -> anyhow::Result<()> {
        self.capture.start().await?;
        tokio::time::sleep(self.config.recording_duration()).await;

        let output = match self.capture.stop().await {
            Ok(output) => output,
            // A remote /stop-recording may have taken the clip already.
            Err(crate::error::CaptureError::NotRecording) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        self.upload_recording(output).await
    }

    async fn upload_recording(&self, output: RecordingOutput) -> anyhow::Result<()> {
        let audio = tokio::fs::read(&output.path).await?;
        let request = TranscriptionRequest {
            audio: audio.into(),
            server_url: self.config.server.url.clone(),
            language: self.config.server.language.clone(),
        };

        let mut progress = self.uploader.upload(request);
        while let Some(event) = progress.recv().await {
            match event {
                UploadProgress::Success(result) => {
                    info!(
                        "Transcript ready: {} keywords, {:.0}% confidence",
                        result.keywords.len(),
                        result.confidence.unwrap_or(0.0) * 100.0
                    );
                    self.transcript_tx.send_replace(Some(result));
                }
                UploadProgress::Error(e) => {
                    warn!("Upload failed: {}", e);
                }
                other => debug!("Upload progress: {:?}", other),
            }
        }

        Ok(())
    }

    /// Dispatch one inbound device-link message.
    pub async fn handle_link_event(&self, event: LinkEvent) {
        match event.path.as_str() {
            paths::TRIGGER_RECORDING => {
                match serde_json::from_slice::<TriggerMessage>(&event.payload) {
                    Ok(message) => {
                        info!(
                            "Remote trigger from {} ({:?})",
                            event.source, message.trigger_type
                        );
                        self.record_clip().await;
                    }
                    Err(e) => warn!("Malformed trigger message: {}", e),
                }
            }
            paths::STOP_RECORDING => match self.capture.stop().await {
                Ok(output) => {
                    if self.config.trigger.auto_transcribe {
                        if let Err(e) = self.upload_recording(output).await {
                            warn!("Upload after remote stop failed: {:#}", e);
                        }
                    }
                }
                Err(e) => debug!("Remote stop ignored: {}", e),
            },
            paths::STATUS_REQUEST => {
                let status = StatusMessage {
                    recording: self.capture.is_recording(),
                    listening: self.coordinator.is_listening(),
                    trigger_count: self.coordinator.trigger_count(),
                };
                match serde_json::to_vec(&status) {
                    Ok(payload) => {
                        if let Err(e) = self
                            .link
                            .send(&event.source, paths::STATUS_REQUEST, &payload)
                            .await
                        {
                            warn!("Status reply failed: {}", e);
                        }
                    }
                    Err(e) => warn!("Status encode failed: {}", e),
                }
            }
            paths::CONFIG_UPDATE => {
                match serde_json::from_slice::<ConfigUpdateMessage>(&event.payload) {
                    Ok(update) => {
                        if let Some(threshold) = update.threshold {
                            self.coordinator.update_threshold(threshold);
                            info!("Threshold updated to {} via link", threshold);
                        }
                    }
                    Err(e) => warn!("Malformed config update: {}", e),
                }
            }
            other => debug!("Unhandled link path: {}", other),
        }
    }

    /// Fan-in task: recompute the composite view whenever any input cell
    /// changes.
    fn spawn_view_task(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let mut connection = self.monitor.state();
        let mut capture = self.capture.state();
        let mut level = self.capture.level();
        let mut listening = self.coordinator.listening();
        let mut transcript = self.transcript_tx.subscribe();

        tokio::spawn(async move {
            loop {
                let Some(pipeline) = weak.upgrade() else {
                    break;
                };

                let view = PipelineView {
                    connection: *connection.borrow_and_update(),
                    capture: *capture.borrow_and_update(),
                    level: *level.borrow_and_update(),
                    listening: *listening.borrow_and_update(),
                    trigger_count: pipeline.coordinator.trigger_count(),
                    last_transcript: transcript.borrow_and_update().clone(),
                };
                pipeline.view_tx.send_replace(view);
                drop(pipeline);

                tokio::select! {
                    r = connection.changed() => if r.is_err() { break },
                    r = capture.changed() => if r.is_err() { break },
                    r = level.changed() => if r.is_err() { break },
                    r = listening.changed() => if r.is_err() { break },
                    r = transcript.changed() => if r.is_err() { break },
                }
            }
        });
    }
}

/// Trigger handler that feeds the pipeline. Holds a weak reference so the
/// coordinator does not keep the pipeline alive.
struct PipelineTrigger {
    pipeline: Weak<VoicePipeline>,
}

#[async_trait::async_trait]
impl TriggerHandler for PipelineTrigger {
    async fn on_trigger(&self, event: TriggerEvent) -> anyhow::Result<()> {
        if let Some(pipeline) = self.pipeline.upgrade() {
            pipeline.handle_trigger(event).await;
        }
        Ok(())
    }
}
