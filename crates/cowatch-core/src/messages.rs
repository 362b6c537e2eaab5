//! Wire envelope exchanged with the session server.
//!
//! Messages are JSON objects discriminated by a `type` field with camelCase
//! names, e.g. `{"type":"forceSync","time":120,"paused":false,"timestamp":...}`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::playback::{LocalPlaybackState, PlaybackSnapshot, SyncPermission};

// ---------------------------------------------------------------------------
// InboundMessage
// ---------------------------------------------------------------------------

/// Messages received from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundMessage {
    /// Periodic authoritative state.
    Sync {
        time: f64,
        paused: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        timestamp: i64,
    },
    /// Admin-issued unconditional resynchronization.
    ForceSync {
        time: f64,
        paused: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        timestamp: i64,
    },
    /// Unconditional source switch without time negotiation.
    Load { url: String },
    /// Rights of the local participant.
    #[serde(rename_all = "camelCase")]
    Permissions {
        is_admin: bool,
        user_controls_allowed: bool,
        #[serde(default)]
        proxy_enabled: bool,
    },
}

impl InboundMessage {
    /// Parse a raw server frame.
    pub fn from_json(frame: &str) -> Result<Self> {
        serde_json::from_str(frame)
            .map_err(|e| Error::Validation(format!("inbound message parse error: {e}")))
    }

    /// Convert a `sync`/`forceSync` message into a snapshot.
    pub fn snapshot(&self) -> Option<PlaybackSnapshot> {
        match self {
            InboundMessage::Sync {
                time,
                paused,
                url,
                timestamp,
            } => Some(PlaybackSnapshot {
                url: url.clone(),
                time: *time,
                paused: *paused,
                timestamp: *timestamp,
                is_force: false,
            }),
            InboundMessage::ForceSync {
                time,
                paused,
                url,
                timestamp,
            } => Some(PlaybackSnapshot {
                url: url.clone(),
                time: *time,
                paused: *paused,
                timestamp: *timestamp,
                is_force: true,
            }),
            _ => None,
        }
    }

    /// Permission payload of a `permissions` message, merged with the
    /// connection flag the session tracks itself.
    pub fn permission(&self, is_connected: bool) -> Option<(SyncPermission, bool)> {
        match self {
            InboundMessage::Permissions {
                is_admin,
                user_controls_allowed,
                proxy_enabled,
            } => Some((
                SyncPermission {
                    is_admin: *is_admin,
                    user_controls_allowed: *user_controls_allowed,
                    is_connected,
                },
                *proxy_enabled,
            )),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// OutboundMessage
// ---------------------------------------------------------------------------

/// Messages sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    /// Locally measured state after a genuine user action.
    Sync {
        time: f64,
        paused: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        timestamp: i64,
    },
    /// Admin request that every receiver hard-syncs to this state.
    ForceSync {
        time: f64,
        paused: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        timestamp: i64,
    },
    /// Admin source change.
    Load { url: String },
}

impl OutboundMessage {
    /// Build a `sync` message from local state.
    pub fn sync_from(state: &LocalPlaybackState, timestamp: i64) -> Self {
        OutboundMessage::Sync {
            time: state.current_time,
            paused: state.paused,
            url: state.source_url.clone(),
            timestamp,
        }
    }

    /// Build a `forceSync` message from local state.
    pub fn force_sync_from(state: &LocalPlaybackState, timestamp: i64) -> Self {
        OutboundMessage::ForceSync {
            time: state.current_time,
            paused: state.paused,
            url: state.source_url.clone(),
            timestamp,
        }
    }

    /// Serialize to a wire frame.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Internal(e.to_string()))
    }

    /// Short name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Sync { .. } => "sync",
            OutboundMessage::ForceSync { .. } => "forceSync",
            OutboundMessage::Load { .. } => "load",
        }
    }
}
