pub mod coordinator;

pub use coordinator::{
    HapticFeedback, NoHaptics, TriggerConfig, TriggerCoordinator, TriggerEvent, TriggerHandler,
    TriggerType,
};
