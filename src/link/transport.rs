use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LinkError;
use crate::trigger::TriggerType;

/// Identifier of a paired peer device.
pub type PeerId = String;

/// Message paths used on the device-link channel.
pub mod paths {
    pub const TRIGGER_RECORDING: &str = "/trigger-recording";
    pub const STOP_RECORDING: &str = "/stop-recording";
    pub const STATUS_REQUEST: &str = "/status-request";
    pub const CONFIG_UPDATE: &str = "/config-update";
}

/// Capability advertised by peers that can receive recording triggers.
pub const RECORDING_CAPABILITY: &str = "voice_recording";

/// Payload for `/trigger-recording` and `/stop-recording`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerMessage {
    pub trigger_type: TriggerType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub source_amplitude: f32,
}

/// Payload for `/config-update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigUpdateMessage {
    pub threshold: Option<u32>,
}

/// Payload sent in response to `/status-request`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMessage {
    pub recording: bool,
    pub listening: bool,
    pub trigger_count: u64,
}

/// An inbound message delivered by the host's transport adapter.
#[derive(Debug, Clone)]
pub struct LinkEvent {
    pub path: String,
    pub payload: Vec<u8>,
    pub source: PeerId,
}

/// Short-range device-to-device channel.
///
/// The concrete pairing/discovery transport is a collaborator; trigger and
/// coordination logic stays transport-agnostic so it is testable with a
/// fake. Inbound messages and peer-set changes are pushed by the host
/// adapter (`ConnectionMonitor::peers_changed`, `VoicePipeline::handle_link_event`).
#[async_trait::async_trait]
pub trait DeviceLink: Send + Sync {
    /// Send a payload to one peer. At-most-once: failures surface to the
    /// caller synchronously, no automatic retry.
    async fn send(&self, peer: &PeerId, path: &str, payload: &[u8]) -> Result<(), LinkError>;

    /// Query the set of currently reachable peers with a capability.
    async fn reachable_peers(&self, capability: &str) -> Result<Vec<PeerId>, LinkError>;
}

/// Link stub for hosts running without a paired device.
pub struct NullLink;

#[async_trait::async_trait]
impl DeviceLink for NullLink {
    async fn send(&self, _peer: &PeerId, _path: &str, _payload: &[u8]) -> Result<(), LinkError> {
        Err(LinkError::SendFailed("no link transport configured".to_string()))
    }

    async fn reachable_peers(&self, _capability: &str) -> Result<Vec<PeerId>, LinkError> {
        Ok(Vec::new())
    }
}
