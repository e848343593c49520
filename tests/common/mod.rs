// Shared fakes for integration tests: scripted audio devices, a scripted
// HTTP transport, and a recording device link.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use whisperworks::error::{CaptureError, LinkError};
use whisperworks::transcription::{HttpReply, ProgressFn, TranscribeTransport, TransportError};
use whisperworks::{AudioDevice, AudioFrame, DeviceLink, PeerId, TriggerEvent, TriggerHandler};

/// Build a mono frame of constant-amplitude samples.
pub fn frame(amplitude: i16, samples: usize, sample_rate: u32, timestamp_ms: u64) -> AudioFrame {
    AudioFrame {
        samples: vec![amplitude; samples],
        sample_rate,
        channels: 1,
        timestamp_ms,
    }
}

/// Device that plays back a scripted list of frames.
///
/// With `hold_open`, the frame channel stays open after the script runs out
/// until `stop()` is called, mimicking a silent live microphone.
pub struct ScriptedDevice {
    frames: Vec<AudioFrame>,
    frame_gap: Option<Duration>,
    hold_open: bool,
    repeat: bool,
    block: Option<usize>,
    keepalive: Mutex<Option<mpsc::Sender<AudioFrame>>>,
}

impl ScriptedDevice {
    pub fn new(frames: Vec<AudioFrame>) -> Self {
        Self {
            frames,
            frame_gap: None,
            hold_open: true,
            repeat: false,
            block: Some(160),
            keepalive: Mutex::new(None),
        }
    }

    /// Silent device: no frames, channel held open until stop.
    pub fn silent() -> Self {
        Self::new(Vec::new())
    }

    /// Sleep between frames (useful with a paused clock).
    pub fn with_frame_gap(mut self, gap: Duration) -> Self {
        self.frame_gap = Some(gap);
        self
    }

    /// Close the channel once the script runs out, as a dying device would.
    pub fn close_after_script(mut self) -> Self {
        self.hold_open = false;
        self
    }

    /// Replay the script until stopped.
    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }

    pub fn not_ready(mut self) -> Self {
        self.block = None;
        self
    }
}

#[async_trait::async_trait]
impl AudioDevice for ScriptedDevice {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        let (tx, rx) = mpsc::channel(64);

        if self.hold_open {
            *self.keepalive.lock().unwrap() = Some(tx.clone());
        }

        let frames = self.frames.clone();
        let gap = self.frame_gap;
        let repeat = self.repeat;
        tokio::spawn(async move {
            loop {
                for frame in &frames {
                    if let Some(gap) = gap {
                        tokio::time::sleep(gap).await;
                    }
                    if tx.send(frame.clone()).await.is_err() {
                        return;
                    }
                }
                if !repeat {
                    break;
                }
                // Avoid a hot loop when repeating without a gap.
                if gap.is_none() {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        self.keepalive.lock().unwrap().take();
        Ok(())
    }

    fn block_size(&self) -> Option<usize> {
        self.block
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Device whose `start()` always fails.
pub enum FailingDevice {
    PermissionDenied,
    Unavailable,
}

#[async_trait::async_trait]
impl AudioDevice for FailingDevice {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        match self {
            FailingDevice::PermissionDenied => Err(CaptureError::PermissionDenied),
            FailingDevice::Unavailable => {
                Err(CaptureError::DeviceUnavailable("unplugged".to_string()))
            }
        }
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn block_size(&self) -> Option<usize> {
        Some(160)
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Scripted HTTP transport: pops one reply per call, counts attempts.
pub struct ScriptedTransport {
    post_replies: Mutex<VecDeque<Result<HttpReply, TransportError>>>,
    get_replies: Mutex<VecDeque<Result<HttpReply, TransportError>>>,
    post_calls: AtomicUsize,
    get_calls: AtomicUsize,
    hang_posts: bool,
}

impl ScriptedTransport {
    pub fn new(post_replies: Vec<Result<HttpReply, TransportError>>) -> Self {
        Self {
            post_replies: Mutex::new(post_replies.into()),
            get_replies: Mutex::new(VecDeque::new()),
            post_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            hang_posts: false,
        }
    }

    pub fn with_get_replies(self, replies: Vec<Result<HttpReply, TransportError>>) -> Self {
        *self.get_replies.lock().unwrap() = replies.into();
        self
    }

    /// Never complete a POST, as a stalled server would.
    pub fn hanging() -> Self {
        let mut transport = Self::new(vec![]);
        transport.hang_posts = true;
        transport
    }

    pub fn post_calls(&self) -> usize {
        self.post_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn ok_reply(body: &str) -> Result<HttpReply, TransportError> {
        Ok(HttpReply {
            status: 200,
            body: Bytes::copy_from_slice(body.as_bytes()),
        })
    }

    pub fn status_reply(status: u16, body: &str) -> Result<HttpReply, TransportError> {
        Ok(HttpReply {
            status,
            body: Bytes::copy_from_slice(body.as_bytes()),
        })
    }
}

#[async_trait::async_trait]
impl TranscribeTransport for ScriptedTransport {
    async fn post_audio(
        &self,
        _server_url: &str,
        audio: Bytes,
        _language: &str,
        progress: ProgressFn,
    ) -> Result<HttpReply, TransportError> {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_posts {
            std::future::pending::<()>().await;
        }
        if !audio.is_empty() {
            progress(100);
        }
        self.post_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Io("script exhausted".to_string())))
    }

    async fn get(&self, _url: &str, _timeout: Duration) -> Result<HttpReply, TransportError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.get_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Io("script exhausted".to_string())))
    }
}

/// Device link that records every send.
pub struct FakeLink {
    pub sends: Mutex<Vec<(PeerId, String, Vec<u8>)>>,
    peers: Mutex<Vec<PeerId>>,
    fail_sends: bool,
}

impl FakeLink {
    pub fn new(peers: Vec<&str>) -> Self {
        Self {
            sends: Mutex::new(Vec::new()),
            peers: Mutex::new(peers.into_iter().map(String::from).collect()),
            fail_sends: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub fn set_peers(&self, peers: Vec<&str>) {
        *self.peers.lock().unwrap() = peers.into_iter().map(String::from).collect();
    }

    pub fn send_count(&self) -> usize {
        self.sends.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl DeviceLink for FakeLink {
    async fn send(&self, peer: &PeerId, path: &str, payload: &[u8]) -> Result<(), LinkError> {
        if self.fail_sends {
            return Err(LinkError::SendFailed("radio off".to_string()));
        }
        self.sends
            .lock()
            .unwrap()
            .push((peer.clone(), path.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn reachable_peers(&self, _capability: &str) -> Result<Vec<PeerId>, LinkError> {
        Ok(self.peers.lock().unwrap().clone())
    }
}

/// Trigger handler that forwards events to a channel.
pub struct ChannelHandler {
    tx: mpsc::Sender<TriggerEvent>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::Receiver<TriggerEvent>) {
        let (tx, rx) = mpsc::channel(64);
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl TriggerHandler for ChannelHandler {
    async fn on_trigger(&self, event: TriggerEvent) -> anyhow::Result<()> {
        let _ = self.tx.send(event).await;
        Ok(())
    }
}
