//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::audio::VolumeError;
use crate::ducking::{DuckState, VolumeSnapshot};
use crate::events::VolumeEvent;

fn default_true() -> bool {
    true
}

/// Requests from UI to daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Read the default output device volume
    GetVolume,

    /// Set the default output device volume (clamped to [0, 1])
    SetVolume { volume: f32 },

    /// Read the default output device mute flag
    IsMuted,

    SetMuted { muted: bool },

    /// Save the current volume and lower it to `percentage` of itself
    DuckVolume {
        percentage: f32,
        #[serde(default = "default_true")]
        persistent: bool,
    },

    /// Put back the volume saved by the last duck
    RestoreVolume {
        #[serde(default = "default_true")]
        clear_persistent: bool,
    },

    /// Request current daemon status
    GetStatus,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to volume event notifications
    Subscribe,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Volume { volume: f32 },

    Muted { muted: bool },

    /// Command completed with nothing to report
    Ok,

    /// Current daemon status
    Status(DaemonStatus),

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Pushed to subscribed clients
    Event { event: VolumeEvent },

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<VolumeError> for Response {
    fn from(err: VolumeError) -> Self {
        Response::error(err.code(), err.to_string())
    }
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Current ducking state
    pub state: DuckState,

    /// Saved pre-duck state, when ducked
    pub snapshot: Option<VolumeSnapshot>,

    /// Audio binding in use
    pub backend: String,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: DuckState::default(),
            snapshot: None,
            backend: String::new(),
            uptime_secs: 0,
        }
    }
}
