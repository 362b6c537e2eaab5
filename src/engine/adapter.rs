//! The single owner of the playback engine.

use std::time::{Duration, Instant};

use cowatch_core::{LocalPlaybackState, Result, SubtitleTrack, SyncPermission};
use tracing::{debug, warn};

use super::{NativeEvent, PlaybackEngine};
use crate::sync::UpdateDiscriminator;

/// Who caused an engine event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    /// Fired while the remote-update guard was armed.
    Remote,
    /// Anything else: the user touched the engine.
    Local,
}

/// Normalized engine event kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEventKind {
    Played,
    Paused,
    Seeked,
    Progress,
    DurationChanged(f64),
    MetadataLoaded,
    Failed(String),
}

impl PlaybackEventKind {
    /// Play, pause and seek are the events that can originate from a user.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            PlaybackEventKind::Played | PlaybackEventKind::Paused | PlaybackEventKind::Seeked
        )
    }
}

/// An engine event with its attribution and the state right after it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackEvent {
    pub kind: PlaybackEventKind,
    pub origin: EventOrigin,
    pub state: LocalPlaybackState,
}

/// Wraps a [`PlaybackEngine`], tracking the applied playback rate and the
/// text tracks registered for the current source.
pub struct EngineAdapter<E> {
    engine: E,
    rate: f64,
    text_tracks: Vec<SubtitleTrack>,
}

impl<E: PlaybackEngine> EngineAdapter<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            rate: 1.0,
            text_tracks: Vec::new(),
        }
    }

    /// Load a resolved source, resetting rate and text tracks.
    pub fn load_source(&mut self, resolved_url: &str, mime_hint: Option<&str>) -> Result<()> {
        self.text_tracks.clear();
        self.engine.load(resolved_url, mime_hint)?;
        self.rate = 1.0;
        Ok(())
    }

    pub fn unload(&mut self) -> Result<()> {
        self.text_tracks.clear();
        self.rate = 1.0;
        self.engine.unload()
    }

    pub fn play(&mut self) -> Result<()> {
        self.engine.play()
    }

    pub fn pause(&mut self) -> Result<()> {
        self.engine.pause()
    }

    pub fn seek(&mut self, time: f64) -> Result<()> {
        self.engine.seek(time.max(0.0))
    }

    pub fn set_rate(&mut self, rate: f64) -> Result<()> {
        self.engine.set_rate(rate)?;
        self.rate = rate;
        Ok(())
    }

    /// Register sidecar subtitles, all inactive. Returns how many were added.
    pub fn register_subtitles(&mut self, tracks: &[SubtitleTrack]) -> usize {
        let mut added = 0;
        for track in tracks {
            if self.text_tracks.iter().any(|t| t.src == track.src) {
                continue;
            }
            match self.engine.add_text_track(track, false) {
                Ok(()) => {
                    self.text_tracks.push(track.clone());
                    added += 1;
                }
                Err(e) => warn!(label = %track.label, error = %e, "Failed to add text track"),
            }
        }
        added
    }

    pub fn text_tracks(&self) -> &[SubtitleTrack] {
        &self.text_tracks
    }

    /// Rate most recently applied through [`EngineAdapter::set_rate`].
    pub fn applied_rate(&self) -> f64 {
        self.rate
    }

    pub fn state(&self) -> LocalPlaybackState {
        let mut state = self.engine.state();
        state.playback_rate = self.rate;
        state
    }

    /// Drain engine events, attribute them, and revert forbidden ones.
    ///
    /// A local play/pause the participant has no right to is undone on the
    /// spot. The guard is armed first so the compensating command's own
    /// event is not itself treated as a forbidden local action.
    pub fn pump(
        &mut self,
        guard: &mut UpdateDiscriminator,
        permission: &SyncPermission,
        now: Instant,
        revert_window: Duration,
    ) -> Vec<PlaybackEvent> {
        let natives = self.engine.drain_events();
        let mut events = Vec::with_capacity(natives.len());

        for native in natives {
            let origin = if guard.is_remote_update(now) {
                EventOrigin::Remote
            } else {
                EventOrigin::Local
            };

            let kind = match native {
                NativeEvent::Play => PlaybackEventKind::Played,
                NativeEvent::Pause => PlaybackEventKind::Paused,
                NativeEvent::Seeked => PlaybackEventKind::Seeked,
                NativeEvent::TimeUpdate => PlaybackEventKind::Progress,
                NativeEvent::DurationChange(d) => PlaybackEventKind::DurationChanged(d),
                NativeEvent::LoadedMetadata => PlaybackEventKind::MetadataLoaded,
                NativeEvent::Error(message) => PlaybackEventKind::Failed(message),
            };

            let forbidden = origin == EventOrigin::Local
                && !permission.can_control()
                && matches!(kind, PlaybackEventKind::Played | PlaybackEventKind::Paused);
            if forbidden {
                guard.mark_pending_remote_update(now, revert_window);
                let reverted = if kind == PlaybackEventKind::Played {
                    self.engine.pause()
                } else {
                    self.engine.play()
                };
                match reverted {
                    Ok(()) => debug!(event = ?kind, "Reverted local transport action without control rights"),
                    Err(e) => warn!(event = ?kind, error = %e, "Failed to revert local transport action"),
                }
                continue;
            }

            events.push(PlaybackEvent {
                kind,
                origin,
                state: self.state(),
            });
        }

        events
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineCommand, HeadlessEngine};

    fn viewer() -> SyncPermission {
        SyncPermission {
            is_connected: true,
            ..Default::default()
        }
    }

    fn controller() -> SyncPermission {
        SyncPermission {
            user_controls_allowed: true,
            is_connected: true,
            ..Default::default()
        }
    }

    fn loaded_adapter() -> EngineAdapter<HeadlessEngine> {
        let mut adapter = EngineAdapter::new(HeadlessEngine::new());
        adapter.load_source("https://cdn.example/a.mp4", Some("video/mp4")).unwrap();
        adapter.engine_mut().drain_events();
        adapter.engine_mut().take_commands();
        adapter
    }

    const WINDOW: Duration = Duration::from_millis(600);

    #[test]
    fn forbidden_local_play_is_reverted() {
        let mut adapter = loaded_adapter();
        let mut guard = UpdateDiscriminator::new();
        let now = Instant::now();

        adapter.engine_mut().user_play();
        let events = adapter.pump(&mut guard, &viewer(), now, WINDOW);

        assert!(events.is_empty());
        assert_eq!(adapter.engine_mut().take_commands(), vec![EngineCommand::Pause]);
        assert!(adapter.state().paused);
        assert!(guard.is_remote_update(now));

        // The compensating pause comes back as a remote event and is left alone.
        let events = adapter.pump(&mut guard, &viewer(), now, WINDOW);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, PlaybackEventKind::Paused);
        assert_eq!(events[0].origin, EventOrigin::Remote);
        assert!(adapter.engine_mut().take_commands().is_empty());
    }

    #[test]
    fn forbidden_local_pause_is_reverted() {
        let mut adapter = loaded_adapter();
        adapter.play().unwrap();
        adapter.engine_mut().drain_events();
        adapter.engine_mut().take_commands();

        let mut guard = UpdateDiscriminator::new();
        adapter.engine_mut().user_pause();
        adapter.pump(&mut guard, &viewer(), Instant::now(), WINDOW);

        assert_eq!(adapter.engine_mut().take_commands(), vec![EngineCommand::Play]);
        assert!(!adapter.state().paused);
    }

    #[test]
    fn permitted_local_play_passes_through() {
        let mut adapter = loaded_adapter();
        let mut guard = UpdateDiscriminator::new();

        adapter.engine_mut().user_play();
        let events = adapter.pump(&mut guard, &controller(), Instant::now(), WINDOW);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, PlaybackEventKind::Played);
        assert_eq!(events[0].origin, EventOrigin::Local);
        assert!(!events[0].state.paused);
        assert!(adapter.engine_mut().take_commands().is_empty());
    }

    #[test]
    fn guarded_events_are_remote() {
        let mut adapter = loaded_adapter();
        let mut guard = UpdateDiscriminator::new();
        let now = Instant::now();
        guard.mark_pending_remote_update(now, WINDOW);

        adapter.play().unwrap();
        adapter.seek(30.0).unwrap();
        let events = adapter.pump(&mut guard, &viewer(), now, WINDOW);

        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.origin == EventOrigin::Remote));
        assert!(!adapter.state().paused);
    }

    #[test]
    fn rate_is_tracked() {
        let mut adapter = loaded_adapter();
        adapter.set_rate(1.05).unwrap();
        assert_eq!(adapter.applied_rate(), 1.05);
        assert_eq!(adapter.state().playback_rate, 1.05);

        adapter.load_source("https://cdn.example/b.mp4", None).unwrap();
        assert_eq!(adapter.applied_rate(), 1.0);
    }

    #[test]
    fn subtitles_registered_inactive_once() {
        let mut adapter = loaded_adapter();
        let track = SubtitleTrack {
            label: "English".into(),
            language: Some("en".into()),
            src: "https://cdn.example/a.en.vtt".into(),
            kind: Default::default(),
        };
        assert_eq!(adapter.register_subtitles(&[track.clone(), track.clone()]), 1);
        assert_eq!(adapter.text_tracks().len(), 1);
        assert_eq!(
            adapter.engine_mut().take_commands(),
            vec![EngineCommand::AddTextTrack {
                src: track.src.clone(),
                active: false
            }]
        );
    }

    #[test]
    fn negative_seek_clamps_to_zero() {
        let mut adapter = loaded_adapter();
        adapter.seek(-4.0).unwrap();
        assert_eq!(adapter.engine_mut().take_commands(), vec![EngineCommand::Seek(0.0)]);
    }

    #[test]
    fn error_event_is_normalized() {
        let mut adapter = EngineAdapter::new(HeadlessEngine::new());
        adapter.engine_mut().fail_next_load("unsupported codec");
        adapter.load_source("https://cdn.example/x.avi", None).unwrap();
        let events = adapter.pump(
            &mut UpdateDiscriminator::new(),
            &controller(),
            Instant::now(),
            WINDOW,
        );
        assert_eq!(
            events[0].kind,
            PlaybackEventKind::Failed("unsupported codec".into())
        );
    }
}
