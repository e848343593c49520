use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::transport::{paths, DeviceLink, PeerId, TriggerMessage};
use crate::error::LinkError;
use crate::trigger::TriggerType;

/// Reachability of the paired device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Tracks reachability of paired peers via push callbacks and explicit
/// pulls, and relays trigger messages to the first reachable peer.
///
/// Single writer: only the monitor mutates the connection cell.
pub struct ConnectionMonitor {
    link: Arc<dyn DeviceLink>,
    capability: String,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    peers: Mutex<Vec<PeerId>>,
}

impl ConnectionMonitor {
    pub fn new(link: Arc<dyn DeviceLink>, capability: impl Into<String>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            link,
            capability: capability.into(),
            state_tx: Arc::new(state_tx),
            peers: Mutex::new(Vec::new()),
        }
    }

    /// Observable connection state.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.peers.lock().expect("peer lock poisoned").clone()
    }

    /// Push update from the discovery callback.
    pub fn peers_changed(&self, capability: &str, nearby: Vec<PeerId>) {
        if capability != self.capability {
            debug!("Ignoring peer update for capability {}", capability);
            return;
        }
        self.apply_peers(nearby);
    }

    /// Pull the current peer set from the transport. Shows `Connecting`
    /// while the query is in flight.
    pub async fn check_connection_status(&self) -> ConnectionState {
        self.state_tx.send_replace(ConnectionState::Connecting);

        match self.link.reachable_peers(&self.capability).await {
            Ok(nearby) => self.apply_peers(nearby),
            Err(e) => {
                warn!("Peer discovery failed: {}", e);
                self.apply_peers(Vec::new())
            }
        }
    }

    /// Send a recording trigger to the first reachable peer. At-most-once;
    /// transport failures propagate without retry.
    pub async fn send_trigger(&self, trigger_type: TriggerType) -> Result<(), LinkError> {
        let peer = self
            .peers
            .lock()
            .expect("peer lock poisoned")
            .first()
            .cloned()
            .ok_or(LinkError::NoPeersConnected)?;

        let message = TriggerMessage {
            trigger_type,
            timestamp: Utc::now(),
            source_amplitude: 0.0,
        };
        let payload =
            serde_json::to_vec(&message).map_err(|e| LinkError::SendFailed(e.to_string()))?;

        self.link
            .send(&peer, paths::TRIGGER_RECORDING, &payload)
            .await?;

        info!("Trigger relayed to peer {}", peer);
        Ok(())
    }

    fn apply_peers(&self, nearby: Vec<PeerId>) -> ConnectionState {
        let state = if nearby.is_empty() {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Connected
        };

        *self.peers.lock().expect("peer lock poisoned") = nearby;
        self.state_tx.send_replace(state);
        state
    }
}
