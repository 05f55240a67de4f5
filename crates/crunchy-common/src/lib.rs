pub mod classify;
pub mod config;
pub mod errors;
pub mod presence;
pub mod wire;

pub use classify::{classify, clean_watch_title, Classification, PageSnapshot, TransitionTracker};
pub use config::{BridgeConfig, ObserverConfig, RelayConfig};
pub use errors::{ConfigError, WireError};
pub use presence::{map_presence, PresenceRecord};
pub use wire::{parse_state_message, DebugInfo, DisplayState, Metadata, StateMessage};
