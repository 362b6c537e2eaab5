//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which wires a [`SyncMachine`] to a
//! [`HeadlessEngine`], a [`ManualClock`] and a connected [`LocalSession`], so
//! scenario tests can script time, user actions and server messages.

#![allow(dead_code)]

use std::sync::Arc;

use cowatch::clock::{Clock, ManualClock};
use cowatch::engine::{EngineCommand, HeadlessEngine};
use cowatch::session::LocalSession;
use cowatch::source::SourceLoader;
use cowatch::sync::SyncMachine;
use cowatch_core::config::Config;
use cowatch_core::{InboundMessage, OutboundMessage, PlaybackSnapshot};
use tokio::sync::mpsc;

pub const SOURCE_A: &str = "https://cdn.example/a.mp4";
pub const SOURCE_B: &str = "https://cdn.example/b.mp4";

/// Rights a participant can hold.
#[derive(Debug, Clone, Copy)]
pub enum Role {
    Viewer,
    Controller,
    Admin,
}

pub struct TestHarness {
    pub clock: Arc<ManualClock>,
    pub session: Arc<LocalSession>,
    pub outgoing: mpsc::UnboundedReceiver<OutboundMessage>,
    pub machine: SyncMachine<HeadlessEngine>,
}

impl TestHarness {
    pub fn new(role: Role) -> Self {
        Self::with_engine(role, HeadlessEngine::new(), Config::default())
    }

    pub fn with_engine(role: Role, engine: HeadlessEngine, config: Config) -> Self {
        let clock = Arc::new(ManualClock::default());
        let (session, outgoing) = LocalSession::new();
        session.connect();
        let (is_admin, user_controls_allowed) = match role {
            Role::Viewer => (false, false),
            Role::Controller => (false, true),
            Role::Admin => (true, false),
        };
        session.deliver(InboundMessage::Permissions {
            is_admin,
            user_controls_allowed,
            proxy_enabled: config.source.proxy_enabled,
        });

        let loader =
            Arc::new(SourceLoader::new(config.source.clone()).expect("valid source config"));
        let machine = SyncMachine::new(
            engine,
            config.sync.clone(),
            clock.clone(),
            session.clone(),
            loader,
        );

        Self {
            clock,
            session,
            outgoing,
            machine,
        }
    }

    /// A harness already playing [`SOURCE_A`] from `time`, with the
    /// load-time guard expired and the command log cleared.
    pub fn synced(role: Role, time: f64, paused: bool) -> Self {
        let mut h = Self::new(role);
        let snap = h.snapshot(Some(SOURCE_A), time, paused);
        h.machine.on_snapshot(snap);
        h.machine.pump_engine();
        h.settle();
        h
    }

    /// A snapshot stamped with the current wall clock.
    pub fn snapshot(&self, url: Option<&str>, time: f64, paused: bool) -> PlaybackSnapshot {
        PlaybackSnapshot {
            url: url.map(str::to_string),
            time,
            paused,
            timestamp: self.clock.wall_ms(),
            is_force: false,
        }
    }

    /// Let every guard window pass and drop recorded commands and messages.
    pub fn settle(&mut self) {
        for _ in 0..4 {
            if self.machine.pump_engine().is_empty() {
                break;
            }
        }
        self.clock.advance_ms(5_000);
        self.machine.pump_engine();
        self.commands();
        self.sent();
    }

    /// Advance clock and engine together, pumping at 100 ms steps.
    pub fn run_for(&mut self, ms: u64) {
        let mut left = ms;
        while left > 0 {
            let step = left.min(100);
            self.clock.advance_ms(step);
            self.machine.engine_mut().advance(step as f64 / 1000.0);
            self.machine.tick();
            left -= step;
        }
    }

    pub fn commands(&mut self) -> Vec<EngineCommand> {
        self.machine.engine_mut().take_commands()
    }

    pub fn sent(&mut self) -> Vec<OutboundMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.outgoing.try_recv() {
            messages.push(message);
        }
        messages
    }

    pub fn local_time(&self) -> f64 {
        self.machine.adapter().state().current_time
    }
}
