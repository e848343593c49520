pub mod monitor;
pub mod transport;

pub use monitor::{ConnectionMonitor, ConnectionState};
pub use transport::{
    paths, ConfigUpdateMessage, DeviceLink, LinkEvent, NullLink, PeerId, StatusMessage,
    TriggerMessage, RECORDING_CAPABILITY,
};
