//! Client-side synchronization state machine.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use cowatch_core::config::SyncConfig;
use cowatch_core::{
    InboundMessage, LocalPlaybackState, OutboundMessage, PlaybackSnapshot, Result, SubtitleTrack,
    SyncPermission,
};
use tracing::{debug, info, warn};

use super::drift::{evaluate, DriftAction, DriftInput, DriftThresholds};
use super::guard::UpdateDiscriminator;
use crate::clock::Clock;
use crate::engine::{EngineAdapter, EventOrigin, PlaybackEngine, PlaybackEvent, PlaybackEventKind};
use crate::session::SessionLink;
use crate::source::{ResolvedSource, SourceLoader};

/// Where the machine is in a source's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// No source loaded.
    Idle,
    /// Source just changed; waiting for metadata before the first seek/play.
    InitialSync,
    /// Steady-state drift correction.
    Synced,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::InitialSync => write!(f, "initial_sync"),
            Self::Synced => write!(f, "synced"),
        }
    }
}

/// What the machine did with a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotOutcome {
    /// Drift was evaluated and the action (possibly `NoAction`) applied.
    Corrected(DriftAction),
    /// The snapshot names another source; it is being loaded.
    SourceSwitched,
    /// Kept as the start target until the pending source has metadata.
    Deferred,
    /// Arrived within the cooldown after a local interaction.
    Suppressed,
    /// Older than the maximum packet age.
    Stale,
    /// Nothing to apply it to.
    Ignored,
}

/// Owns the engine adapter and reconciles it with the room.
///
/// All handlers are synchronous and read the machine's own fields; the async
/// pieces (subtitle discovery, timers) live in [`crate::driver::SyncDriver`].
pub struct SyncMachine<E> {
    adapter: EngineAdapter<E>,
    discriminator: UpdateDiscriminator,
    phase: SyncPhase,
    pending_start: Option<PlaybackSnapshot>,
    loaded_source: Option<String>,
    permission: SyncPermission,
    config: SyncConfig,
    thresholds: DriftThresholds,
    clock: Arc<dyn Clock>,
    link: Arc<dyn SessionLink>,
    loader: Arc<SourceLoader>,
    subtitle_request: Option<ResolvedSource>,
    force_resync_at: Option<Instant>,
}

impl<E: PlaybackEngine> SyncMachine<E> {
    pub fn new(
        engine: E,
        config: SyncConfig,
        clock: Arc<dyn Clock>,
        link: Arc<dyn SessionLink>,
        loader: Arc<SourceLoader>,
    ) -> Self {
        Self {
            adapter: EngineAdapter::new(engine),
            discriminator: UpdateDiscriminator::new(),
            phase: SyncPhase::Idle,
            pending_start: None,
            loaded_source: None,
            permission: link.current_permissions(),
            thresholds: DriftThresholds::from(&config),
            config,
            clock,
            link,
            loader,
            subtitle_request: None,
            force_resync_at: None,
        }
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Dispatch a message from the server.
    pub fn handle_inbound(&mut self, message: InboundMessage) {
        if let Some(snapshot) = message.snapshot() {
            self.on_snapshot(snapshot);
            return;
        }
        match message {
            InboundMessage::Load { url } => self.on_load_command(&url),
            other => {
                if let Some((permission, proxy)) = other.permission(self.permission.is_connected) {
                    self.set_permissions(permission);
                    self.loader.set_proxy_enabled(proxy);
                }
            }
        }
    }

    /// Apply an authoritative snapshot.
    pub fn on_snapshot(&mut self, snapshot: PlaybackSnapshot) -> SnapshotOutcome {
        let now = self.clock.now();
        let wall = self.clock.wall_ms();

        if !snapshot.is_force
            && self
                .discriminator
                .in_local_cooldown(now, self.config.local_cooldown())
        {
            debug!("Snapshot arrived during local cooldown, ignoring");
            return SnapshotOutcome::Suppressed;
        }

        let same_source = match snapshot.url.as_deref() {
            None => true,
            Some(url) => self.loaded_source.as_deref() == Some(url),
        };

        if !same_source {
            let Some(url) = snapshot.url.clone() else {
                return SnapshotOutcome::Ignored;
            };
            return if self.switch_source(&url, Some(snapshot)) {
                SnapshotOutcome::SourceSwitched
            } else {
                SnapshotOutcome::Ignored
            };
        }

        if self.phase == SyncPhase::Idle {
            debug!("Snapshot without a loaded source, ignoring");
            return SnapshotOutcome::Ignored;
        }

        if !snapshot.is_force && snapshot.age_ms(wall) > self.config.max_packet_age_ms as i64 {
            debug!(age_ms = snapshot.age_ms(wall), "Discarding stale snapshot");
            return SnapshotOutcome::Stale;
        }

        if self.phase == SyncPhase::InitialSync {
            self.pending_start = Some(snapshot);
            return SnapshotOutcome::Deferred;
        }

        let target = snapshot.target_time(wall);
        let action = self.correct(target, snapshot.paused, snapshot.is_force, now);
        SnapshotOutcome::Corrected(action)
    }

    /// Unconditional source switch requested by the server.
    pub fn on_load_command(&mut self, url: &str) {
        self.switch_source(url, None);
    }

    // -----------------------------------------------------------------------
    // Local signals
    // -----------------------------------------------------------------------

    /// Admin action: make every receiver hard-sync to our state.
    pub fn request_force_sync(&mut self) -> bool {
        if !self.permission.can_administer() {
            debug!("Force sync requested without admin rights, ignoring");
            return false;
        }
        match self.phase {
            SyncPhase::Idle => {
                debug!("Force sync requested with no source loaded, ignoring");
                return false;
            }
            SyncPhase::InitialSync => {
                debug!("Force sync requested before the source finished loading, ignoring");
                return false;
            }
            SyncPhase::Synced => {}
        }
        let message =
            OutboundMessage::force_sync_from(&self.outgoing_state(), self.clock.wall_ms());
        self.send(message);
        true
    }

    /// The local user picked a new source.
    pub fn request_local_load(&mut self, url: &str) -> bool {
        if !self.permission.can_administer() {
            debug!(url, "Source change requested without admin rights, ignoring");
            return false;
        }
        if !self.switch_source(url, None) {
            return false;
        }
        self.send(OutboundMessage::Load {
            url: url.to_string(),
        });
        self.force_resync_at = Some(self.clock.now() + self.config.force_resync_delay());
        true
    }

    // -----------------------------------------------------------------------
    // Session state
    // -----------------------------------------------------------------------

    /// Replace rights, keeping the connection flag this machine tracks.
    pub fn set_permissions(&mut self, permission: SyncPermission) {
        let is_connected = self.permission.is_connected;
        self.permission = SyncPermission {
            is_connected,
            ..permission
        };
        debug!(
            is_admin = self.permission.is_admin,
            user_controls_allowed = self.permission.user_controls_allowed,
            "Permissions updated"
        );
    }

    pub fn set_proxy_enabled(&self, enabled: bool) {
        self.loader.set_proxy_enabled(enabled);
    }

    /// Follow the session's connection; losing it unloads the source.
    pub fn set_connected(&mut self, connected: bool) {
        self.permission.is_connected = connected;
        if !connected {
            self.unload();
        }
    }

    /// Drop the current source and return to `Idle`.
    pub fn unload(&mut self) {
        if let Err(e) = self.adapter.unload() {
            warn!(error = %e, "Failed to unload engine");
        }
        if let Some(source) = self.loaded_source.take() {
            info!(source = %source, "Source unloaded");
        }
        self.pending_start = None;
        self.subtitle_request = None;
        self.force_resync_at = None;
        self.discriminator.clear_remote_update();
        self.phase = SyncPhase::Idle;
    }

    // -----------------------------------------------------------------------
    // Engine events and timers
    // -----------------------------------------------------------------------

    /// Drain engine events and react to them.
    pub fn pump_engine(&mut self) -> Vec<PlaybackEvent> {
        let now = self.clock.now();
        let events = self.adapter.pump(
            &mut self.discriminator,
            &self.permission,
            now,
            self.config.remote_guard(),
        );

        for event in &events {
            match &event.kind {
                PlaybackEventKind::MetadataLoaded => {
                    if self.phase == SyncPhase::InitialSync {
                        self.complete_initial_sync(now);
                    }
                }
                PlaybackEventKind::Failed(message) => {
                    warn!(
                        source = self.loaded_source.as_deref().unwrap_or("-"),
                        phase = %self.phase,
                        error = %message,
                        "Playback engine error"
                    );
                }
                kind if kind.is_transport() => self.on_transport_event(event, now),
                _ => {}
            }
        }

        events
    }

    /// Periodic work: engine events, then the delayed force re-sync.
    ///
    /// The re-sync stays pending until the source has loaded.
    pub fn tick(&mut self) {
        self.pump_engine();

        let now = self.clock.now();
        if self.phase == SyncPhase::Synced && self.force_resync_at.is_some_and(|at| now >= at) {
            self.force_resync_at = None;
            self.request_force_sync();
        }
    }

    // -----------------------------------------------------------------------
    // Subtitles
    // -----------------------------------------------------------------------

    /// Source whose sidecar subtitles should be looked up next.
    pub fn take_subtitle_request(&mut self) -> Option<ResolvedSource> {
        self.subtitle_request.take()
    }

    /// Register tracks discovered for `source`, if it is still current.
    pub fn register_subtitles(&mut self, source: &str, tracks: &[SubtitleTrack]) -> usize {
        if self.loaded_source.as_deref() != Some(source) {
            debug!(source, "Subtitles arrived for a replaced source, dropping");
            return 0;
        }
        self.adapter.register_subtitles(tracks)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Source identity as the room knows it.
    pub fn loaded_source(&self) -> Option<&str> {
        self.loaded_source.as_deref()
    }

    pub fn permission(&self) -> SyncPermission {
        self.permission
    }

    pub fn discriminator(&self) -> &UpdateDiscriminator {
        &self.discriminator
    }

    pub fn adapter(&self) -> &EngineAdapter<E> {
        &self.adapter
    }

    pub fn engine(&self) -> &E {
        self.adapter.engine()
    }

    pub fn engine_mut(&mut self) -> &mut E {
        self.adapter.engine_mut()
    }

    pub fn force_resync_pending(&self) -> bool {
        self.force_resync_at.is_some()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn switch_source(&mut self, url: &str, start: Option<PlaybackSnapshot>) -> bool {
        let resolved = match self.loader.resolve(url) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(url, error = %e, "Cannot resolve source");
                return false;
            }
        };

        let now = self.clock.now();
        self.discriminator
            .mark_pending_remote_update(now, self.config.source_switch_guard());
        self.loaded_source = Some(url.to_string());
        self.pending_start = start;
        self.phase = SyncPhase::InitialSync;

        info!(
            source = url,
            kind = %resolved.kind,
            resolved = %resolved.url,
            "Switching source"
        );

        if let Err(e) = self
            .adapter
            .load_source(&resolved.url, resolved.mime_hint.as_deref())
        {
            warn!(source = url, error = %e, "Engine rejected source");
        }

        self.subtitle_request = resolved.subtitle_manifest.is_some().then_some(resolved);
        true
    }

    fn complete_initial_sync(&mut self, now: Instant) {
        let remaining = self.discriminator.remaining(now).unwrap_or_default();
        self.discriminator
            .mark_pending_remote_update(now, remaining.max(self.config.remote_guard()));

        match self.pending_start.take() {
            Some(snapshot) => {
                let target = snapshot.target_time(self.clock.wall_ms());
                log_failure("seek", self.adapter.seek(target));
                let started = if snapshot.paused {
                    self.adapter.pause()
                } else {
                    self.adapter.play()
                };
                log_failure("start", started);
            }
            None if self.config.autoplay_on_load => {
                let started = self.adapter.play();
                log_failure("play", started);
            }
            None => {}
        }

        self.phase = SyncPhase::Synced;
        info!(
            source = self.loaded_source.as_deref().unwrap_or("-"),
            "Initial sync complete"
        );
    }

    fn correct(
        &mut self,
        target: f64,
        target_paused: bool,
        is_force: bool,
        now: Instant,
    ) -> DriftAction {
        let state = self.adapter.state();
        let input = DriftInput {
            local_time: state.current_time,
            target_time: target,
            local_paused: state.paused,
            target_paused,
            is_force,
            current_rate: self.adapter.applied_rate(),
        };
        let action = evaluate(&input, &self.thresholds);
        if action.is_noop() {
            return action;
        }

        debug!(
            action = action.name(),
            drift = input.drift(),
            is_force,
            "Applying drift correction"
        );
        self.discriminator
            .mark_pending_remote_update(now, self.config.remote_guard());
        self.execute(&action);
        action
    }

    fn execute(&mut self, action: &DriftAction) {
        match *action {
            DriftAction::NoAction => {}
            DriftAction::HardSeek { to, paused } => {
                self.reset_rate();
                log_failure("seek", self.adapter.seek(to));
                match paused {
                    Some(true) => log_failure("pause", self.adapter.pause()),
                    Some(false) => log_failure("play", self.adapter.play()),
                    None => {}
                }
            }
            DriftAction::SoftSpeedUp { rate } | DriftAction::SoftSlowDown { rate } => {
                log_failure("set_rate", self.adapter.set_rate(rate));
            }
            DriftAction::RestoreRate => {
                log_failure("set_rate", self.adapter.set_rate(1.0));
            }
            DriftAction::TogglePause { paused, seek_to } => {
                self.reset_rate();
                if let Some(to) = seek_to {
                    log_failure("seek", self.adapter.seek(to));
                }
                if paused {
                    log_failure("pause", self.adapter.pause());
                } else {
                    log_failure("play", self.adapter.play());
                }
            }
        }
    }

    fn reset_rate(&mut self) {
        if (self.adapter.applied_rate() - 1.0).abs() > f64::EPSILON {
            log_failure("set_rate", self.adapter.set_rate(1.0));
        }
    }

    fn on_transport_event(&mut self, event: &PlaybackEvent, now: Instant) {
        if event.origin == EventOrigin::Remote || self.phase == SyncPhase::Idle {
            return;
        }
        if !self.permission.can_broadcast() {
            debug!(event = ?event.kind, "Local action not broadcast without control rights");
            return;
        }
        self.discriminator.record_local_interaction(now);
        let state = LocalPlaybackState {
            source_url: self.loaded_source.clone(),
            ..event.state.clone()
        };
        self.send(OutboundMessage::sync_from(&state, self.clock.wall_ms()));
    }

    fn outgoing_state(&self) -> LocalPlaybackState {
        LocalPlaybackState {
            source_url: self.loaded_source.clone(),
            ..self.adapter.state()
        }
    }

    fn send(&self, message: OutboundMessage) {
        let kind = message.kind();
        match self.link.send(message) {
            Ok(()) => {}
            Err(e) if e.is_transient() => debug!(kind, error = %e, "Message not sent"),
            Err(e) => warn!(kind, error = %e, "Failed to send message"),
        }
    }
}

fn log_failure(command: &'static str, result: Result<()>) {
    if let Err(e) = result {
        warn!(command, error = %e, "Engine command failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::{EngineCommand, HeadlessEngine};
    use crate::session::LocalSession;
    use cowatch_core::config::SourceConfig;

    const SOURCE: &str = "https://cdn.example/a.mp4";

    struct Fixture {
        clock: Arc<ManualClock>,
        session: Arc<LocalSession>,
        outgoing: tokio::sync::mpsc::UnboundedReceiver<OutboundMessage>,
        machine: SyncMachine<HeadlessEngine>,
    }

    fn fixture(is_admin: bool) -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let (session, outgoing) = LocalSession::new();
        session.connect();
        session.deliver(InboundMessage::Permissions {
            is_admin,
            user_controls_allowed: false,
            proxy_enabled: false,
        });
        let loader = Arc::new(SourceLoader::new(SourceConfig::default()).unwrap());
        let machine = SyncMachine::new(
            HeadlessEngine::new(),
            SyncConfig::default(),
            clock.clone(),
            session.clone(),
            loader,
        );
        Fixture {
            clock,
            session,
            outgoing,
            machine,
        }
    }

    fn snapshot(fx: &Fixture, time: f64, paused: bool) -> PlaybackSnapshot {
        PlaybackSnapshot {
            url: Some(SOURCE.into()),
            time,
            paused,
            timestamp: fx.clock.wall_ms(),
            is_force: false,
        }
    }

    #[test]
    fn starts_idle_with_session_permissions() {
        let fx = fixture(true);
        assert_eq!(fx.machine.phase(), SyncPhase::Idle);
        assert!(fx.machine.permission().can_administer());
        assert!(fx.session.is_connected());
    }

    #[test]
    fn snapshot_without_url_is_ignored_when_idle() {
        let mut fx = fixture(false);
        let mut snap = snapshot(&fx, 10.0, false);
        snap.url = None;
        assert_eq!(fx.machine.on_snapshot(snap), SnapshotOutcome::Ignored);
        assert!(fx.machine.engine().commands().is_empty());
    }

    #[test]
    fn first_snapshot_loads_and_starts() {
        let mut fx = fixture(false);
        let snap = snapshot(&fx, 30.0, false);
        assert_eq!(fx.machine.on_snapshot(snap), SnapshotOutcome::SourceSwitched);
        assert_eq!(fx.machine.phase(), SyncPhase::InitialSync);

        fx.machine.pump_engine();
        assert_eq!(fx.machine.phase(), SyncPhase::Synced);
        let commands = fx.machine.engine_mut().take_commands();
        assert_eq!(
            commands,
            vec![
                EngineCommand::Load {
                    url: SOURCE.into(),
                    mime_hint: Some("video/mp4".into())
                },
                EngineCommand::Seek(30.0),
                EngineCommand::Play,
            ]
        );
        assert!(fx.outgoing.try_recv().is_err());
    }

    #[test]
    fn load_command_autoplays_from_zero() {
        let mut fx = fixture(false);
        fx.machine.handle_inbound(InboundMessage::Load { url: SOURCE.into() });
        fx.machine.pump_engine();
        assert_eq!(fx.machine.loaded_source(), Some(SOURCE));
        assert_eq!(
            fx.machine.engine_mut().take_commands().last(),
            Some(&EngineCommand::Play)
        );
        assert!(!fx.machine.adapter().state().paused);
    }

    #[test]
    fn permissions_message_keeps_connection_flag() {
        let mut fx = fixture(false);
        fx.machine.handle_inbound(InboundMessage::Permissions {
            is_admin: true,
            user_controls_allowed: true,
            proxy_enabled: true,
        });
        assert!(fx.machine.permission().is_connected);
        assert!(fx.machine.permission().can_administer());
        assert!(fx.machine.loader.proxy_enabled());
    }

    #[test]
    fn disconnect_returns_to_idle() {
        let mut fx = fixture(true);
        fx.machine.on_load_command(SOURCE);
        fx.machine.pump_engine();
        fx.machine.set_connected(false);
        assert_eq!(fx.machine.phase(), SyncPhase::Idle);
        assert!(fx.machine.loaded_source().is_none());
        assert_eq!(
            fx.machine.engine().commands().last(),
            Some(&EngineCommand::Unload)
        );
        assert!(!fx.machine.request_force_sync());
    }
}
