//! Async event loop around a [`SyncMachine`].

use std::sync::Arc;
use std::time::Duration;

use cowatch_core::SubtitleTrack;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};

use crate::engine::PlaybackEngine;
use crate::session::{SessionEvent, SessionLink};
use crate::source::SourceLoader;
use crate::sync::SyncMachine;

const SIGNAL_CHANNEL_CAPACITY: usize = 32;

/// Fire-and-forget requests from the local UI.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalSignal {
    /// The user picked a new source.
    LoadRequested(String),
    /// An admin asked everyone to hard-sync to this client.
    ForceSyncRequested,
    /// The user closed the player.
    UnloadRequested,
}

/// Sends signals to a running [`SyncDriver`].
#[derive(Clone)]
pub struct DriverHandle {
    signals: mpsc::Sender<LocalSignal>,
    shutdown_tx: mpsc::Sender<()>,
}

impl DriverHandle {
    pub fn request_load(&self, url: impl Into<String>) {
        self.signal(LocalSignal::LoadRequested(url.into()));
    }

    pub fn request_force_sync(&self) {
        self.signal(LocalSignal::ForceSyncRequested);
    }

    pub fn request_unload(&self) {
        self.signal(LocalSignal::UnloadRequested);
    }

    pub fn signal(&self, signal: LocalSignal) {
        if let Err(e) = self.signals.try_send(signal) {
            tracing::warn!("Dropped local signal: {}", e);
        }
    }

    /// Stop the driver loop.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Drives a machine from session events, local signals, subtitle discovery
/// results and a periodic tick.
pub struct SyncDriver<E> {
    machine: SyncMachine<E>,
    loader: Arc<SourceLoader>,
    events: broadcast::Receiver<SessionEvent>,
    signals: mpsc::Receiver<LocalSignal>,
    shutdown_rx: mpsc::Receiver<()>,
    tick_interval: Duration,
}

impl<E: PlaybackEngine + 'static> SyncDriver<E> {
    pub fn new(
        machine: SyncMachine<E>,
        loader: Arc<SourceLoader>,
        link: &dyn SessionLink,
        tick_interval: Duration,
    ) -> (Self, DriverHandle) {
        let (signals_tx, signals) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let driver = Self {
            machine,
            loader,
            events: link.subscribe(),
            signals,
            shutdown_rx,
            tick_interval,
        };
        let handle = DriverHandle {
            signals: signals_tx,
            shutdown_tx,
        };
        (driver, handle)
    }

    /// Run until shutdown or until the session goes away. Returns the
    /// machine so callers can inspect its final state.
    pub async fn run(mut self) -> SyncMachine<E> {
        tracing::info!("Sync driver started");

        let (subtitles_tx, mut subtitles_rx) =
            mpsc::unbounded_channel::<(String, Vec<SubtitleTrack>)>();
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv() => {
                    tracing::info!("Sync driver shutting down");
                    break;
                }
                event = self.events.recv() => match event {
                    Ok(SessionEvent::Message(message)) => self.machine.handle_inbound(message),
                    Ok(SessionEvent::Connected) => self.machine.set_connected(true),
                    Ok(SessionEvent::Disconnected) => self.machine.set_connected(false),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Sync driver lagged, {} session events skipped", skipped);
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!("Session closed, stopping sync driver");
                        break;
                    }
                },
                Some(signal) = self.signals.recv() => match signal {
                    LocalSignal::LoadRequested(url) => {
                        self.machine.request_local_load(&url);
                    }
                    LocalSignal::ForceSyncRequested => {
                        self.machine.request_force_sync();
                    }
                    LocalSignal::UnloadRequested => self.machine.unload(),
                },
                Some((source, tracks)) = subtitles_rx.recv() => {
                    let added = self.machine.register_subtitles(&source, &tracks);
                    tracing::debug!("Registered {} subtitle tracks for {}", added, source);
                }
                _ = ticker.tick() => self.machine.tick(),
            }

            if let Some(resolved) = self.machine.take_subtitle_request() {
                let loader = self.loader.clone();
                let tx = subtitles_tx.clone();
                tokio::spawn(async move {
                    let tracks = loader.discover_subtitles(&resolved).await;
                    if !tracks.is_empty() {
                        let _ = tx.send((resolved.requested, tracks));
                    }
                });
            }
        }

        self.machine
    }
}
