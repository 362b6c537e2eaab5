//! Cowatch - client-side playback synchronization for shared viewing rooms
//!
//! This library crate exposes the sync engine for embedding and integration testing.

pub mod clock;
pub mod config;
pub mod driver;
pub mod engine;
pub mod session;
pub mod simulate;
pub mod source;
pub mod sync;
