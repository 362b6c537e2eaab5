//! cowatch-core: shared playback model, wire messages, errors, and configuration.
//!
//! This crate is the foundational dependency of the `cowatch` sync engine,
//! providing the authoritative/local playback types, the server message
//! envelope, a unified error type, and the tunable sync configuration.

pub mod config;
pub mod error;
pub mod messages;
pub mod playback;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use messages::{InboundMessage, OutboundMessage};
pub use playback::*;
