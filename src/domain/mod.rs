//! Domain models - playback events and webhook decoding
//!
//! This module contains the canonical data types used throughout the system:
//! - `PlaybackEvent` - a recognized playback webhook event
//! - `EventKind` - classification of playback events
//! - `decode` - extraction of the JSON payload from a raw webhook body
//! - `lookup_path` - safe dotted-path navigation for custom filters

pub mod event;

pub use event::{decode, lookup_path, DecodeOutcome, EventKind, PlaybackEvent};
