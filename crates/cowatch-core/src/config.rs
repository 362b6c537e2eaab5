//! Sync engine configuration types.
//!
//! The top-level [`Config`] carries the drift thresholds, guard windows and
//! source-resolution settings. Every section defaults sensibly so an empty
//! document is valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub source: SourceConfig,
}

impl Config {
    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let sync = &self.sync;

        if sync.soft_threshold_secs <= 0.0 {
            warnings.push("sync.soft_threshold_secs must be positive".into());
        }
        if sync.soft_threshold_secs >= sync.hard_threshold_secs {
            warnings.push(format!(
                "sync.soft_threshold_secs ({}) should be below sync.hard_threshold_secs ({})",
                sync.soft_threshold_secs, sync.hard_threshold_secs
            ));
        }
        if sync.pause_threshold_secs < sync.soft_threshold_secs {
            warnings.push(
                "sync.pause_threshold_secs is tighter than sync.soft_threshold_secs".into(),
            );
        }
        if !(sync.soft_rate_step > 0.0 && sync.soft_rate_step < 0.5) {
            warnings.push(format!(
                "sync.soft_rate_step {} is outside (0, 0.5)",
                sync.soft_rate_step
            ));
        }
        if !(500..=800).contains(&sync.remote_guard_ms) {
            warnings.push(format!(
                "sync.remote_guard_ms {} is outside the 500-800 ms range engines need to settle",
                sync.remote_guard_ms
            ));
        }
        if sync.source_switch_guard_ms < sync.remote_guard_ms {
            warnings.push(
                "sync.source_switch_guard_ms is shorter than sync.remote_guard_ms".into(),
            );
        }
        if sync.max_packet_age_ms <= sync.local_cooldown_ms {
            warnings.push(
                "sync.max_packet_age_ms should exceed sync.local_cooldown_ms".into(),
            );
        }

        let base = self.source.base_url.as_str();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            warnings.push(format!(
                "source.base_url '{base}' is not an absolute http(s) URL"
            ));
        }
        for path in [
            &self.source.proxy_path,
            &self.source.hosted_manifest_path,
            &self.source.transcode_path,
        ] {
            if !path.starts_with('/') {
                warnings.push(format!("source endpoint '{path}' should start with '/'"));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// SyncConfig
// ---------------------------------------------------------------------------

/// Drift thresholds and timing windows for the sync state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Drift beyond which playing media is hard-seeked.
    pub hard_threshold_secs: f64,
    /// Drift beyond which playing media is rate-corrected.
    pub soft_threshold_secs: f64,
    /// Drift beyond which paused media (or a pause transition) is seeked.
    pub pause_threshold_secs: f64,
    /// Rate offset applied during soft correction (1 ± step).
    pub soft_rate_step: f64,
    /// Window during which engine events are attributed to our own commands.
    pub remote_guard_ms: u64,
    /// Longer attribution window used while a new source loads.
    pub source_switch_guard_ms: u64,
    /// Snapshots arriving this soon after a local action are ignored.
    pub local_cooldown_ms: u64,
    /// Non-force snapshots older than this are discarded.
    pub max_packet_age_ms: u64,
    /// Delay between an admin source change and the follow-up force sync.
    pub force_resync_delay_ms: u64,
    /// Start playing when a `load` command arrives.
    pub autoplay_on_load: bool,
    /// How often the driver pumps engine events and timers.
    pub tick_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            hard_threshold_secs: 3.0,
            soft_threshold_secs: 0.5,
            pause_threshold_secs: 1.0,
            soft_rate_step: 0.05,
            remote_guard_ms: 600,
            source_switch_guard_ms: 2_000,
            local_cooldown_ms: 500,
            max_packet_age_ms: 5_000,
            force_resync_delay_ms: 1_000,
            autoplay_on_load: true,
            tick_interval_ms: 100,
        }
    }
}

impl SyncConfig {
    pub fn remote_guard(&self) -> Duration {
        Duration::from_millis(self.remote_guard_ms)
    }

    pub fn source_switch_guard(&self) -> Duration {
        Duration::from_millis(self.source_switch_guard_ms)
    }

    pub fn local_cooldown(&self) -> Duration {
        Duration::from_millis(self.local_cooldown_ms)
    }

    pub fn force_resync_delay(&self) -> Duration {
        Duration::from_millis(self.force_resync_delay_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

// ---------------------------------------------------------------------------
// SourceConfig
// ---------------------------------------------------------------------------

/// Source resolution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Origin of the web app; relative URLs and endpoints resolve against it.
    pub base_url: String,
    /// Initial proxy switch; the server's permission broadcast overrides it.
    pub proxy_enabled: bool,
    /// Generic media proxy endpoint, receives `?url=<upstream>`.
    pub proxy_path: String,
    /// Pre-resolved adaptive manifest endpoint for hosted video pages,
    /// receives `?v=<video id>`.
    pub hosted_manifest_path: String,
    /// Transcoding manifest endpoint, receives `?url=<upstream>`.
    pub transcode_path: String,
    /// Extensions that engines cannot play directly and must be transcoded.
    pub transcode_extensions: Vec<String>,
    pub transcode_enabled: bool,
    /// Suffix replacing the media extension to find a subtitle manifest.
    pub subtitle_manifest_suffix: String,
    pub request_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            proxy_enabled: false,
            proxy_path: "/api/proxy".into(),
            hosted_manifest_path: "/api/hosted/manifest.m3u8".into(),
            transcode_path: "/api/transcode/manifest.m3u8".into(),
            transcode_extensions: vec!["mkv".into(), "avi".into(), "wmv".into()],
            transcode_enabled: false,
            subtitle_manifest_suffix: ".subtitles.json".into(),
            request_timeout_secs: 5,
        }
    }
}

impl SourceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
