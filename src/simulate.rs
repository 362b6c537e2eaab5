//! Scripted, deterministic runs of the sync engine.
//!
//! A script is a timeline of server messages and user actions. The runner
//! plays it against a [`HeadlessEngine`] with a [`ManualClock`], ticking the
//! machine at the configured interval in between steps, and records what the
//! engine was told to do and what was sent to the server.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cowatch_core::config::Config;
use cowatch_core::{InboundMessage, LocalPlaybackState, OutboundMessage, PlaybackSnapshot};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::clock::{Clock, ManualClock};
use crate::engine::{EngineCommand, HeadlessEngine};
use crate::session::LocalSession;
use crate::source::SourceLoader;
use crate::sync::{SnapshotOutcome, SyncMachine, SyncPhase};

fn default_wall_origin() -> i64 {
    1_700_000_000_000
}

/// A simulation script.
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    /// Wall-clock time at `at_ms = 0`.
    #[serde(default = "default_wall_origin")]
    pub wall_origin_ms: i64,
    /// Media length reported by the engine.
    #[serde(default)]
    pub duration_secs: Option<f64>,
    /// Hold metadata until a `finish_loading` step.
    #[serde(default)]
    pub deferred_metadata: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub user_controls_allowed: bool,
    pub steps: Vec<Step>,
}

impl Script {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script: {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse script: {:?}", path))
    }
}

/// One timeline entry.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Milliseconds since the start of the run.
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: StepAction,
}

/// What happens at a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    /// A raw server message.
    Inbound { message: InboundMessage },
    /// A snapshot whose send time is given relative to the run.
    Snapshot {
        time: f64,
        paused: bool,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        force: bool,
        /// Defaults to the step time.
        #[serde(default)]
        sent_at_ms: Option<u64>,
    },
    UserPlay,
    UserPause,
    UserSeek { time: f64 },
    FinishLoading,
    LocalLoad { url: String },
    ForceSync,
    Connect,
    Disconnect,
    Unload,
}

/// What one step caused.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub at_ms: u64,
    pub action: StepAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    pub phase: String,
    pub commands: Vec<EngineCommand>,
    pub outgoing: Vec<OutboundMessage>,
}

/// Full record of a run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub steps: Vec<StepReport>,
    pub final_phase: String,
    pub final_state: LocalPlaybackState,
}

/// Run `script` with the sync and source settings of `config`.
pub fn run(script: &Script, config: &Config) -> Result<SimulationReport> {
    let clock = Arc::new(ManualClock::new(script.wall_origin_ms));
    let (session, mut outgoing) = LocalSession::new();
    session.connect();
    session.deliver(InboundMessage::Permissions {
        is_admin: script.is_admin,
        user_controls_allowed: script.user_controls_allowed,
        proxy_enabled: config.source.proxy_enabled,
    });

    let loader = Arc::new(SourceLoader::new(config.source.clone())?);
    let mut engine = HeadlessEngine::new();
    if let Some(secs) = script.duration_secs {
        engine = engine.with_duration(secs);
    }
    if script.deferred_metadata {
        engine = engine.with_deferred_metadata();
    }

    let mut machine = SyncMachine::new(
        engine,
        config.sync.clone(),
        clock.clone(),
        session.clone(),
        loader,
    );
    let tick = config.sync.tick_interval();

    let mut steps = Vec::with_capacity(script.steps.len());
    let mut commands = Vec::new();
    let mut sent = Vec::new();

    for step in &script.steps {
        let target = Duration::from_millis(step.at_ms);
        while clock.elapsed() < target {
            let dt = tick.min(target - clock.elapsed());
            clock.advance(dt);
            machine.engine_mut().advance(dt.as_secs_f64());
            machine.tick();
            commands.extend(machine.engine_mut().take_commands());
            drain(&mut outgoing, &mut sent);
        }

        let outcome = apply(&mut machine, &session, &clock, script, &step.action);
        machine.pump_engine();
        commands.extend(machine.engine_mut().take_commands());
        drain(&mut outgoing, &mut sent);

        steps.push(StepReport {
            at_ms: step.at_ms,
            action: step.action.clone(),
            outcome,
            phase: machine.phase().to_string(),
            commands: std::mem::take(&mut commands),
            outgoing: std::mem::take(&mut sent),
        });
    }

    Ok(SimulationReport {
        steps,
        final_phase: machine.phase().to_string(),
        final_state: machine.adapter().state(),
    })
}

fn apply(
    machine: &mut SyncMachine<HeadlessEngine>,
    session: &LocalSession,
    clock: &ManualClock,
    script: &Script,
    action: &StepAction,
) -> Option<String> {
    match action {
        StepAction::Inbound { message } => {
            session.deliver(message.clone());
            match message.snapshot() {
                Some(snapshot) => return Some(describe(&machine.on_snapshot(snapshot))),
                None => machine.handle_inbound(message.clone()),
            }
        }
        StepAction::Snapshot {
            time,
            paused,
            url,
            force,
            sent_at_ms,
        } => {
            let sent_at =
                sent_at_ms.map_or(clock.wall_ms(), |ms| script.wall_origin_ms + ms as i64);
            let outcome = machine.on_snapshot(PlaybackSnapshot {
                url: url.clone(),
                time: *time,
                paused: *paused,
                timestamp: sent_at,
                is_force: *force,
            });
            return Some(describe(&outcome));
        }
        StepAction::UserPlay => machine.engine_mut().user_play(),
        StepAction::UserPause => machine.engine_mut().user_pause(),
        StepAction::UserSeek { time } => machine.engine_mut().user_seek(*time),
        StepAction::FinishLoading => machine.engine_mut().finish_loading(),
        StepAction::LocalLoad { url } => {
            return Some(accepted(machine.request_local_load(url)));
        }
        StepAction::ForceSync => return Some(accepted(machine.request_force_sync())),
        StepAction::Connect => {
            session.connect();
            machine.set_connected(true);
        }
        StepAction::Disconnect => {
            session.disconnect();
            machine.set_connected(false);
        }
        StepAction::Unload => machine.unload(),
    }
    None
}

fn describe(outcome: &SnapshotOutcome) -> String {
    match outcome {
        SnapshotOutcome::Corrected(action) => action.name().to_string(),
        SnapshotOutcome::SourceSwitched => "source_switched".into(),
        SnapshotOutcome::Deferred => "deferred".into(),
        SnapshotOutcome::Suppressed => "suppressed".into(),
        SnapshotOutcome::Stale => "stale".into(),
        SnapshotOutcome::Ignored => "ignored".into(),
    }
}

fn accepted(ok: bool) -> String {
    let verdict = if ok { "accepted" } else { "rejected" };
    verdict.to_string()
}

fn drain(rx: &mut mpsc::UnboundedReceiver<OutboundMessage>, into: &mut Vec<OutboundMessage>) {
    while let Ok(message) = rx.try_recv() {
        into.push(message);
    }
}

impl SimulationReport {
    /// Whether the run ended in steady state.
    pub fn is_synced(&self) -> bool {
        self.final_phase == SyncPhase::Synced.to_string()
    }
}
