//! Drift classification.
//!
//! [`evaluate`] is a pure function: it looks at where the local engine is and
//! where the room is, and names the single correction to apply. Pause-state
//! mismatches are resolved before time, because comparing positions while one
//! side is frozen is meaningless.

use cowatch_core::config::SyncConfig;

const RATE_EPSILON: f64 = 1e-6;

/// Thresholds that bound the evaluator's decisions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftThresholds {
    /// Seconds of drift beyond which playing media jumps.
    pub hard: f64,
    /// Seconds of drift beyond which playing media is rate-corrected.
    pub soft: f64,
    /// Seconds of drift tolerated while paused.
    pub pause: f64,
    /// Soft correction plays at `1 ± rate_step`.
    pub rate_step: f64,
}

impl DriftThresholds {
    pub fn speed_up_rate(&self) -> f64 {
        1.0 + self.rate_step
    }

    pub fn slow_down_rate(&self) -> f64 {
        1.0 - self.rate_step
    }
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for DriftThresholds {
    fn from(cfg: &SyncConfig) -> Self {
        Self {
            hard: cfg.hard_threshold_secs,
            soft: cfg.soft_threshold_secs,
            pause: cfg.pause_threshold_secs,
            rate_step: cfg.soft_rate_step,
        }
    }
}

/// Everything the evaluator needs to know.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftInput {
    pub local_time: f64,
    /// Latency-adjusted authoritative position.
    pub target_time: f64,
    pub local_paused: bool,
    pub target_paused: bool,
    pub is_force: bool,
    /// Rate currently applied to the engine.
    pub current_rate: f64,
}

impl DriftInput {
    /// Positive when the local playhead is behind the room.
    pub fn drift(&self) -> f64 {
        self.target_time - self.local_time
    }
}

/// The correction to apply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriftAction {
    NoAction,
    /// Jump to `to`, resetting the rate. `paused` also forces the pause state.
    HardSeek { to: f64, paused: Option<bool> },
    /// Local is behind; play faster.
    SoftSpeedUp { rate: f64 },
    /// Local is ahead; play slower.
    SoftSlowDown { rate: f64 },
    /// Drift is back under the soft threshold; return to normal speed.
    RestoreRate,
    /// Match the room's pause state, seeking first when drift is too large.
    TogglePause { paused: bool, seek_to: Option<f64> },
}

impl DriftAction {
    pub fn is_noop(&self) -> bool {
        matches!(self, DriftAction::NoAction)
    }

    /// Short name used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            DriftAction::NoAction => "none",
            DriftAction::HardSeek { .. } => "hard_seek",
            DriftAction::SoftSpeedUp { .. } => "soft_speed_up",
            DriftAction::SoftSlowDown { .. } => "soft_slow_down",
            DriftAction::RestoreRate => "restore_rate",
            DriftAction::TogglePause { .. } => "toggle_pause",
        }
    }
}

fn rate_differs(a: f64, b: f64) -> bool {
    (a - b).abs() > RATE_EPSILON
}

/// Classify drift and choose a correction.
pub fn evaluate(input: &DriftInput, thresholds: &DriftThresholds) -> DriftAction {
    if input.is_force {
        return DriftAction::HardSeek {
            to: input.target_time,
            paused: Some(input.target_paused),
        };
    }

    let drift = input.drift();
    let magnitude = drift.abs();

    if input.local_paused != input.target_paused {
        let limit = if input.target_paused {
            thresholds.pause
        } else {
            thresholds.hard
        };
        return DriftAction::TogglePause {
            paused: input.target_paused,
            seek_to: (magnitude > limit).then_some(input.target_time),
        };
    }

    if input.target_paused {
        // Nothing diverges further while paused, so only a sizeable offset
        // is worth a seek.
        return if magnitude > thresholds.pause {
            DriftAction::HardSeek {
                to: input.target_time,
                paused: None,
            }
        } else if rate_differs(input.current_rate, 1.0) {
            DriftAction::RestoreRate
        } else {
            DriftAction::NoAction
        };
    }

    if magnitude > thresholds.hard {
        DriftAction::HardSeek {
            to: input.target_time,
            paused: None,
        }
    } else if magnitude > thresholds.soft {
        let behind = drift > 0.0;
        let rate = if behind {
            thresholds.speed_up_rate()
        } else {
            thresholds.slow_down_rate()
        };
        if !rate_differs(rate, input.current_rate) {
            DriftAction::NoAction
        } else if behind {
            DriftAction::SoftSpeedUp { rate }
        } else {
            DriftAction::SoftSlowDown { rate }
        }
    } else if rate_differs(input.current_rate, 1.0) {
        DriftAction::RestoreRate
    } else {
        DriftAction::NoAction
    }
}
