//! Playback engine capability interface.
//!
//! A concrete backend (native media element bridge, hardware decoder,
//! [`HeadlessEngine`] for tests and simulation) implements [`PlaybackEngine`].
//! Only [`EngineAdapter`] holds an engine; everything else routes commands
//! through the adapter so that event attribution stays correct.

mod adapter;
mod headless;

pub use adapter::{EngineAdapter, EventOrigin, PlaybackEvent, PlaybackEventKind};
pub use headless::{EngineCommand, HeadlessEngine};

use cowatch_core::{LocalPlaybackState, Result, SubtitleTrack};

/// Events fired by an engine, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeEvent {
    Play,
    Pause,
    Seeked,
    TimeUpdate,
    DurationChange(f64),
    LoadedMetadata,
    Error(String),
}

/// Minimal control surface of a media playback engine.
///
/// Commands return once the engine has accepted them; the consequences show
/// up later as [`NativeEvent`]s from [`PlaybackEngine::drain_events`].
pub trait PlaybackEngine: Send {
    /// Start loading `url`. `mime_hint` helps engines pick a demuxer.
    fn load(&mut self, url: &str, mime_hint: Option<&str>) -> Result<()>;

    /// Drop the current source.
    fn unload(&mut self) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn seek(&mut self, time: f64) -> Result<()>;

    fn set_rate(&mut self, rate: f64) -> Result<()>;

    /// Attach a sidecar text track, shown only when `active`.
    fn add_text_track(&mut self, track: &SubtitleTrack, active: bool) -> Result<()>;

    /// Current engine-side state. `source_url` is the URL the engine loaded.
    fn state(&self) -> LocalPlaybackState;

    /// Take every event fired since the last call.
    fn drain_events(&mut self) -> Vec<NativeEvent>;
}
