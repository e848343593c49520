use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::{AmplitudeDetector, AudioDevice, AudioFrame};
use crate::error::TriggerError;

/// What caused a trigger to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Voice,
    Manual,
}

/// Fire-and-forget trigger notification. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub timestamp: DateTime<Utc>,
    pub source_amplitude: f32,
    pub trigger_type: TriggerType,
}

/// Receives trigger events on a dedicated dispatcher task, so handler
/// latency never stalls sample processing.
#[async_trait::async_trait]
pub trait TriggerHandler: Send + Sync {
    async fn on_trigger(&self, event: TriggerEvent) -> anyhow::Result<()>;
}

/// Best-effort haptic feedback on trigger. Failures are swallowed.
#[async_trait::async_trait]
pub trait HapticFeedback: Send + Sync {
    async fn pulse(&self) -> anyhow::Result<()>;
}

/// No-op haptics for hosts without a vibration motor.
pub struct NoHaptics;

#[async_trait::async_trait]
impl HapticFeedback for NoHaptics {
    async fn pulse(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Snapshot of the coordinator's runtime configuration.
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub threshold: u32,
    pub cooldown: Duration,
    pub block_size: Option<usize>,
}

struct ListenTasks {
    detect: JoinHandle<()>,
    dispatch: JoinHandle<()>,
}

/// Bridges amplitude detection to action: counts triggers, fires haptics,
/// and forwards events to the registered handler.
pub struct TriggerCoordinator {
    detector: Arc<AmplitudeDetector>,
    device: Mutex<Box<dyn AudioDevice>>,
    haptics: Arc<dyn HapticFeedback>,
    trigger_count: Arc<AtomicU64>,
    listening_tx: Arc<watch::Sender<bool>>,
    tasks: Mutex<Option<ListenTasks>>,
    handler: StdMutex<Option<Arc<dyn TriggerHandler>>>,
    resume_on_activate: AtomicBool,
}

impl TriggerCoordinator {
    pub fn new(
        detector: Arc<AmplitudeDetector>,
        device: Box<dyn AudioDevice>,
        haptics: Arc<dyn HapticFeedback>,
    ) -> Self {
        let (listening_tx, _) = watch::channel(false);
        Self {
            detector,
            device: Mutex::new(device),
            haptics,
            trigger_count: Arc::new(AtomicU64::new(0)),
            listening_tx: Arc::new(listening_tx),
            tasks: Mutex::new(None),
            handler: StdMutex::new(None),
            resume_on_activate: AtomicBool::new(false),
        }
    }

    /// Observable listening flag.
    pub fn listening(&self) -> watch::Receiver<bool> {
        self.listening_tx.subscribe()
    }

    pub fn is_listening(&self) -> bool {
        *self.listening_tx.borrow()
    }

    pub fn trigger_count(&self) -> u64 {
        self.trigger_count.load(Ordering::Relaxed)
    }

    pub fn update_threshold(&self, value: u32) {
        self.detector.set_threshold(value);
    }

    pub async fn configuration(&self) -> TriggerConfig {
        let device = self.device.lock().await;
        TriggerConfig {
            threshold: self.detector.threshold(),
            cooldown: self.detector.cooldown(),
            block_size: device.block_size(),
        }
    }

    /// Start the continuous detection loop.
    ///
    /// Fails with `AlreadyListening` if a loop is running and with
    /// `DeviceNotReady` when the trigger device cannot compute a block size.
    pub async fn start_listening(
        &self,
        handler: Arc<dyn TriggerHandler>,
        threshold_override: Option<u32>,
    ) -> Result<(), TriggerError> {
        let mut tasks = self.tasks.lock().await;
        if tasks.is_some() {
            return Err(TriggerError::AlreadyListening);
        }

        let frame_rx = {
            let mut device = self.device.lock().await;
            device.block_size().ok_or(TriggerError::DeviceNotReady)?;
            device.start().await?
        };

        if let Some(threshold) = threshold_override {
            self.detector.set_threshold(threshold);
        }

        *self.handler.lock().expect("handler lock poisoned") = Some(Arc::clone(&handler));

        info!(
            "Trigger listening started (threshold={}, cooldown={:?})",
            self.detector.threshold(),
            self.detector.cooldown()
        );

        let (event_tx, event_rx) = mpsc::channel::<TriggerEvent>(16);

        let dispatch = tokio::spawn(dispatch_loop(event_rx, handler));
        let detect = tokio::spawn(detect_loop(
            frame_rx,
            Arc::clone(&self.detector),
            Arc::clone(&self.haptics),
            Arc::clone(&self.trigger_count),
            event_tx,
        ));

        self.listening_tx.send_replace(true);
        *tasks = Some(ListenTasks { detect, dispatch });

        Ok(())
    }

    /// Stop the detection loop and release the trigger device. Idempotent.
    pub async fn stop_listening(&self) {
        let mut tasks = self.tasks.lock().await;
        let Some(running) = tasks.take() else {
            return;
        };

        {
            let mut device = self.device.lock().await;
            if let Err(e) = device.stop().await {
                warn!("Failed to release trigger device: {}", e);
            }
        }

        // Stopping the device closes the frame channel; both loops drain and
        // exit. Abort if one is wedged on a slow handler.
        join_or_abort(running.detect, "trigger detect loop").await;
        join_or_abort(running.dispatch, "trigger dispatch loop").await;

        self.listening_tx.send_replace(false);
        info!("Trigger listening stopped");
    }

    /// Fire a manual trigger through the registered handler.
    pub async fn trigger_now(&self) {
        let handler = self
            .handler
            .lock()
            .expect("handler lock poisoned")
            .clone();
        let Some(handler) = handler else {
            warn!("Manual trigger ignored: no handler registered");
            return;
        };

        self.trigger_count.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.haptics.pulse().await {
            debug!("Haptic pulse failed: {}", e);
        }

        let event = TriggerEvent {
            timestamp: Utc::now(),
            source_amplitude: 0.0,
            trigger_type: TriggerType::Manual,
        };
        if let Err(e) = handler.on_trigger(event).await {
            warn!("Trigger handler failed: {:#}", e);
        }
    }

    /// Host lifecycle hook: pause listening when backgrounded.
    pub async fn suspend(&self) {
        let was_listening = self.tasks.lock().await.is_some();
        self.resume_on_activate.store(was_listening, Ordering::SeqCst);
        if was_listening {
            self.stop_listening().await;
        }
    }

    /// Host lifecycle hook: resume listening when foregrounded, if a loop
    /// was running at suspend time.
    pub async fn activate(&self) -> Result<(), TriggerError> {
        if !self.resume_on_activate.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let handler = self
            .handler
            .lock()
            .expect("handler lock poisoned")
            .clone();
        match handler {
            Some(handler) => self.start_listening(handler, None).await,
            None => Ok(()),
        }
    }
}

async fn detect_loop(
    mut frame_rx: mpsc::Receiver<AudioFrame>,
    detector: Arc<AmplitudeDetector>,
    haptics: Arc<dyn HapticFeedback>,
    trigger_count: Arc<AtomicU64>,
    event_tx: mpsc::Sender<TriggerEvent>,
) {
    while let Some(frame) = frame_rx.recv().await {
        let detection = detector.process(&frame.samples);
        if !detection.triggered {
            continue;
        }

        let count = trigger_count.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            "Voice trigger fired (rms={:.0}, total={})",
            detection.rms, count
        );

        if let Err(e) = haptics.pulse().await {
            debug!("Haptic pulse failed: {}", e);
        }

        let event = TriggerEvent {
            timestamp: Utc::now(),
            source_amplitude: detection.rms,
            trigger_type: TriggerType::Voice,
        };
        // Never block sample processing on a slow consumer.
        if event_tx.try_send(event).is_err() {
            warn!("Trigger dispatcher backlog, dropping event");
        }
    }
}

async fn dispatch_loop(
    mut event_rx: mpsc::Receiver<TriggerEvent>,
    handler: Arc<dyn TriggerHandler>,
) {
    while let Some(event) = event_rx.recv().await {
        if let Err(e) = handler.on_trigger(event).await {
            warn!("Trigger handler failed: {:#}", e);
        }
    }
}

async fn join_or_abort(handle: JoinHandle<()>, what: &str) {
    let mut handle = handle;
    if tokio::time::timeout(Duration::from_secs(1), &mut handle)
        .await
        .is_err()
    {
        warn!("{} did not stop in time, aborting", what);
        handle.abort();
    }
}
