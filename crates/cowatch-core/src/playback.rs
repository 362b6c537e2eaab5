//! Playback-domain types shared by the sync engine and its collaborators.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PlaybackSnapshot
// ---------------------------------------------------------------------------

/// The server's belief of the true playback state at the moment it was sent.
///
/// Snapshots are consumed once and superseded by the next one; they are never
/// merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    /// Source the snapshot refers to, if the server included one.
    pub url: Option<String>,
    /// Playback position in seconds.
    pub time: f64,
    /// Whether playback is paused.
    pub paused: bool,
    /// Wall-clock milliseconds since the Unix epoch at send time.
    pub timestamp: i64,
    /// Unconditional hard-sync request that bypasses drift thresholds.
    pub is_force: bool,
}

impl PlaybackSnapshot {
    /// Age of the snapshot relative to `now_ms`, clamped at zero so a sender
    /// clock running ahead of ours never produces a negative age.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        (now_ms - self.timestamp).max(0)
    }

    /// Position extrapolated to `now_ms`.
    ///
    /// Paused media does not advance. Playing media is pushed forward by the
    /// snapshot age, treating transit time as the one-way latency.
    pub fn target_time(&self, now_ms: i64) -> f64 {
        if self.paused {
            self.time
        } else {
            self.time + self.age_ms(now_ms) as f64 / 1000.0
        }
    }
}

// ---------------------------------------------------------------------------
// LocalPlaybackState
// ---------------------------------------------------------------------------

/// What the local playback engine is doing right now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalPlaybackState {
    pub current_time: f64,
    pub paused: bool,
    pub playback_rate: f64,
    /// End of the buffered range containing the playhead, in seconds.
    pub buffered_end: f64,
    pub source_url: Option<String>,
    /// Media duration once metadata has loaded.
    pub duration: Option<f64>,
}

impl Default for LocalPlaybackState {
    fn default() -> Self {
        Self {
            current_time: 0.0,
            paused: true,
            playback_rate: 1.0,
            buffered_end: 0.0,
            source_url: None,
            duration: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SyncPermission
// ---------------------------------------------------------------------------

/// Session-derived rights of the local participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPermission {
    pub is_admin: bool,
    pub user_controls_allowed: bool,
    pub is_connected: bool,
}

impl SyncPermission {
    /// Whether local transport actions (play/pause/seek) may stand.
    pub fn can_control(&self) -> bool {
        self.is_admin || self.user_controls_allowed
    }

    /// Whether local transport actions may be broadcast to the room.
    pub fn can_broadcast(&self) -> bool {
        self.can_control() && self.is_connected
    }

    /// Whether this participant may change the source or force a resync.
    pub fn can_administer(&self) -> bool {
        self.is_admin && self.is_connected
    }
}

// ---------------------------------------------------------------------------
// SubtitleTrack
// ---------------------------------------------------------------------------

/// Kind of a sidecar text track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    #[default]
    Subtitles,
    Captions,
}

/// A sidecar subtitle track listed in a subtitle manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub label: String,
    #[serde(default, alias = "srclang")]
    pub language: Option<String>,
    /// Absolute URL of the track file once resolved by the source loader.
    pub src: String,
    #[serde(default)]
    pub kind: TrackKind,
}
