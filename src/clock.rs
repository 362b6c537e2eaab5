//! Time sources for the sync engine.
//!
//! Guard windows and cooldowns are monotonic deadlines compared against
//! [`Clock::now`]; snapshot ages compare the sender's wall-clock timestamp
//! against [`Clock::wall_ms`].

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// A source of monotonic and wall-clock time.
pub trait Clock: Send + Sync {
    /// Monotonic instant used for deadlines.
    fn now(&self) -> Instant;

    /// Milliseconds since the Unix epoch.
    fn wall_ms(&self) -> i64;
}

/// The real clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
///
/// Both readings advance together, so a snapshot stamped with
/// [`ManualClock::wall_ms`] ages exactly as much as the monotonic deadlines.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    wall_origin_ms: i64,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    pub fn new(wall_origin_ms: i64) -> Self {
        Self {
            origin: Instant::now(),
            wall_origin_ms,
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock() += by;
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1_700_000_000_000)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn wall_ms(&self) -> i64 {
        self.wall_origin_ms + self.elapsed().as_millis() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_both_readings() {
        let clock = ManualClock::new(10_000);
        let start = clock.now();
        clock.advance_ms(250);
        assert_eq!(clock.now() - start, Duration::from_millis(250));
        assert_eq!(clock.wall_ms(), 10_250);
    }

    #[test]
    fn system_clock_wall_time_is_recent() {
        // 2023-11-14 in epoch ms; any real clock is past this.
        assert!(SystemClock.wall_ms() > 1_700_000_000_000);
    }
}
