//! A deterministic in-memory playback engine.
//!
//! Behaves like a media element without decoding anything: commands update a
//! simulated playhead and queue the events a real element would fire. Every
//! command is also recorded so tests and the `simulate` command can show
//! exactly what the sync engine asked for.

use std::collections::VecDeque;

use cowatch_core::{Error, LocalPlaybackState, Result, SubtitleTrack};
use serde::Serialize;

use super::{NativeEvent, PlaybackEngine};

/// Default media length for sources whose duration is not configured.
const DEFAULT_DURATION_SECS: f64 = 3_600.0;

/// Seconds of media buffered ahead of the playhead.
const BUFFER_AHEAD_SECS: f64 = 10.0;

/// A command the engine received.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", content = "args", rename_all = "snake_case")]
pub enum EngineCommand {
    Load {
        url: String,
        mime_hint: Option<String>,
    },
    Unload,
    Play,
    Pause,
    Seek(f64),
    SetRate(f64),
    AddTextTrack {
        src: String,
        active: bool,
    },
}

/// Simulated engine; see the module docs.
#[derive(Debug)]
pub struct HeadlessEngine {
    state: LocalPlaybackState,
    events: VecDeque<NativeEvent>,
    commands: Vec<EngineCommand>,
    text_tracks: Vec<(SubtitleTrack, bool)>,
    media_duration: f64,
    instant_metadata: bool,
    loading: bool,
    next_load_error: Option<String>,
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self {
            state: LocalPlaybackState::default(),
            events: VecDeque::new(),
            commands: Vec::new(),
            text_tracks: Vec::new(),
            media_duration: DEFAULT_DURATION_SECS,
            instant_metadata: true,
            loading: false,
            next_load_error: None,
        }
    }

    /// Length reported for the next loaded source.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.media_duration = secs;
        self
    }

    /// Hold metadata back after `load` until [`HeadlessEngine::finish_loading`].
    pub fn with_deferred_metadata(mut self) -> Self {
        self.instant_metadata = false;
        self
    }

    /// Make the next `load` fire an error event instead of loading.
    pub fn fail_next_load(&mut self, message: impl Into<String>) {
        self.next_load_error = Some(message.into());
    }

    /// Complete a deferred load.
    pub fn finish_loading(&mut self) {
        if self.loading {
            self.loading = false;
            self.state.duration = Some(self.media_duration);
            self.events
                .push_back(NativeEvent::DurationChange(self.media_duration));
            self.events.push_back(NativeEvent::LoadedMetadata);
        }
    }

    /// Let `secs` of wall time pass.
    pub fn advance(&mut self, secs: f64) {
        if self.state.paused || self.loading || self.state.source_url.is_none() {
            return;
        }
        let next = self.state.current_time + secs * self.state.playback_rate;
        self.state.current_time = self.clamp(next);
        self.state.buffered_end = self.clamp(self.state.current_time + BUFFER_AHEAD_SECS);
        self.events.push_back(NativeEvent::TimeUpdate);
    }

    /// The user pressed play on the native controls.
    pub fn user_play(&mut self) {
        self.start();
    }

    /// The user pressed pause on the native controls.
    pub fn user_pause(&mut self) {
        self.stop();
    }

    /// The user dragged the native seek bar.
    pub fn user_seek(&mut self, time: f64) {
        self.jump(time);
    }

    /// Take the commands received so far.
    pub fn take_commands(&mut self) -> Vec<EngineCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn commands(&self) -> &[EngineCommand] {
        &self.commands
    }

    /// Text tracks attached to the current source with their active flag.
    pub fn text_tracks(&self) -> &[(SubtitleTrack, bool)] {
        &self.text_tracks
    }

    fn clamp(&self, time: f64) -> f64 {
        let upper = self.state.duration.unwrap_or(f64::INFINITY);
        time.clamp(0.0, upper)
    }

    fn start(&mut self) {
        if self.state.paused {
            self.state.paused = false;
            self.events.push_back(NativeEvent::Play);
        }
    }

    fn stop(&mut self) {
        if !self.state.paused {
            self.state.paused = true;
            self.events.push_back(NativeEvent::Pause);
        }
    }

    fn jump(&mut self, time: f64) {
        self.state.current_time = self.clamp(time);
        self.state.buffered_end = self.state.current_time;
        self.events.push_back(NativeEvent::Seeked);
    }

    fn require_source(&self) -> Result<()> {
        if self.state.source_url.is_none() {
            return Err(Error::engine("no source loaded"));
        }
        Ok(())
    }
}

impl Default for HeadlessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackEngine for HeadlessEngine {
    fn load(&mut self, url: &str, mime_hint: Option<&str>) -> Result<()> {
        self.commands.push(EngineCommand::Load {
            url: url.to_string(),
            mime_hint: mime_hint.map(str::to_string),
        });
        self.text_tracks.clear();
        self.state = LocalPlaybackState {
            source_url: Some(url.to_string()),
            ..LocalPlaybackState::default()
        };

        if let Some(message) = self.next_load_error.take() {
            self.loading = false;
            self.events.push_back(NativeEvent::Error(message));
            return Ok(());
        }

        self.loading = true;
        if self.instant_metadata {
            self.finish_loading();
        }
        Ok(())
    }

    fn unload(&mut self) -> Result<()> {
        self.commands.push(EngineCommand::Unload);
        self.text_tracks.clear();
        self.loading = false;
        self.state = LocalPlaybackState::default();
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.commands.push(EngineCommand::Play);
        self.require_source()?;
        self.start();
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.commands.push(EngineCommand::Pause);
        self.require_source()?;
        self.stop();
        Ok(())
    }

    fn seek(&mut self, time: f64) -> Result<()> {
        self.commands.push(EngineCommand::Seek(time));
        self.require_source()?;
        if !time.is_finite() {
            return Err(Error::engine(format!("cannot seek to {time}")));
        }
        self.jump(time);
        Ok(())
    }

    fn set_rate(&mut self, rate: f64) -> Result<()> {
        self.commands.push(EngineCommand::SetRate(rate));
        if !(rate.is_finite() && rate > 0.0) {
            return Err(Error::engine(format!("invalid playback rate {rate}")));
        }
        self.state.playback_rate = rate;
        Ok(())
    }

    fn add_text_track(&mut self, track: &SubtitleTrack, active: bool) -> Result<()> {
        self.commands.push(EngineCommand::AddTextTrack {
            src: track.src.clone(),
            active,
        });
        self.require_source()?;
        self.text_tracks.push((track.clone(), active));
        Ok(())
    }

    fn state(&self) -> LocalPlaybackState {
        self.state.clone()
    }

    fn drain_events(&mut self) -> Vec<NativeEvent> {
        self.events.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fires_metadata() {
        let mut engine = HeadlessEngine::new().with_duration(120.0);
        engine.load("a.mp4", None).unwrap();
        assert_eq!(
            engine.drain_events(),
            vec![NativeEvent::DurationChange(120.0), NativeEvent::LoadedMetadata]
        );
        assert_eq!(engine.state().duration, Some(120.0));
    }

    #[test]
    fn deferred_metadata_waits() {
        let mut engine = HeadlessEngine::new().with_deferred_metadata();
        engine.load("a.mp4", None).unwrap();
        assert!(engine.drain_events().is_empty());
        assert_eq!(engine.state().duration, None);
        engine.finish_loading();
        assert_eq!(engine.drain_events().len(), 2);
    }

    #[test]
    fn play_without_source_fails() {
        let mut engine = HeadlessEngine::new();
        assert!(engine.play().is_err());
        assert_eq!(engine.commands(), &[EngineCommand::Play]);
    }

    #[test]
    fn advance_honours_rate_and_pause() {
        let mut engine = HeadlessEngine::new();
        engine.load("a.mp4", None).unwrap();
        engine.advance(5.0);
        assert_eq!(engine.state().current_time, 0.0);

        engine.play().unwrap();
        engine.set_rate(1.5).unwrap();
        engine.advance(2.0);
        assert!((engine.state().current_time - 3.0).abs() < 1e-9);
    }

    #[test]
    fn seek_clamps_to_duration() {
        let mut engine = HeadlessEngine::new().with_duration(60.0);
        engine.load("a.mp4", None).unwrap();
        engine.seek(90.0).unwrap();
        assert_eq!(engine.state().current_time, 60.0);
    }

    #[test]
    fn redundant_play_fires_nothing() {
        let mut engine = HeadlessEngine::new();
        engine.load("a.mp4", None).unwrap();
        engine.drain_events();
        engine.play().unwrap();
        engine.play().unwrap();
        assert_eq!(engine.drain_events(), vec![NativeEvent::Play]);
    }

    #[test]
    fn user_actions_are_not_commands() {
        let mut engine = HeadlessEngine::new();
        engine.load("a.mp4", None).unwrap();
        engine.take_commands();
        engine.user_play();
        engine.user_seek(12.0);
        assert!(engine.commands().is_empty());
        assert!(engine.drain_events().contains(&NativeEvent::Seeked));
    }

    #[test]
    fn commands_serialize_for_reports() {
        let json = serde_json::to_value(EngineCommand::Seek(4.5)).unwrap();
        assert_eq!(json["command"], "seek");
    }
}
