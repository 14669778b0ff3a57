//! Services - business logic and state management
//!
//! This module contains the core decision logic:
//! - `rules` - Does a playback event apply to a sensor?
//! - `presence` - Per-sensor active-player set and debounced off edges
//! - `dispatcher` - Serialized event loop driving all sensors

pub mod dispatcher;
pub mod presence;
pub mod rules;

// Re-export commonly used types
pub use dispatcher::{DispatchMsg, Dispatcher};
pub use presence::SensorState;
