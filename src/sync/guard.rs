//! Attribution of engine events to their cause.
//!
//! Every engine command issued in reaction to a snapshot arms a deadline;
//! engine events observed before it passes are ours and must not be echoed
//! back to the room. Genuine user actions stamp a separate instant so that
//! snapshots racing behind them can be ignored until the server catches up.

use std::time::{Duration, Instant};

/// Tracks remote-caused windows and the last local interaction.
#[derive(Debug, Clone, Default)]
pub struct UpdateDiscriminator {
    remote_until: Option<Instant>,
    last_local_interaction: Option<Instant>,
}

impl UpdateDiscriminator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the guard for `window` from `now`.
    ///
    /// A later call replaces the deadline rather than extending it.
    pub fn mark_pending_remote_update(&mut self, now: Instant, window: Duration) {
        self.remote_until = Some(now + window);
    }

    /// Whether an engine event observed at `now` was caused by our own command.
    pub fn is_remote_update(&self, now: Instant) -> bool {
        self.remote_until.is_some_and(|deadline| now < deadline)
    }

    /// Remaining guard time, if armed.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.remote_until
            .and_then(|deadline| deadline.checked_duration_since(now))
            .filter(|d| !d.is_zero())
    }

    pub fn clear_remote_update(&mut self) {
        self.remote_until = None;
    }

    /// Record a genuine user-initiated control action.
    pub fn record_local_interaction(&mut self, now: Instant) {
        self.last_local_interaction = Some(now);
        self.remote_until = None;
    }

    /// Whether a snapshot arriving at `now` lands inside the cooldown after
    /// the last local interaction.
    pub fn in_local_cooldown(&self, now: Instant, cooldown: Duration) -> bool {
        self.last_local_interaction
            .is_some_and(|at| now.saturating_duration_since(at) < cooldown)
    }
}
