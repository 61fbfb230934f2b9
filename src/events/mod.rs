//! Events module for ducking transitions
//!
//! Provides structured event types published by the ducking controller and
//! pushed to subscribed IPC clients.

use serde::{Deserialize, Serialize};

use crate::audio::DeviceId;

/// Events emitted by the ducking controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VolumeEvent {
    /// Volume lowered and the prior state saved
    Ducked {
        /// Volume before ducking
        from: f32,
        /// Volume after ducking
        to: f32,
        device: DeviceId,
    },

    /// Saved volume and mute state written back
    Restored {
        volume: f32,
        muted: bool,
        device: DeviceId,
    },

    /// Restore skipped because the volume was changed while ducked
    RestoreSkipped {
        current: f32,
        expected: f32,
    },

    /// Default output device differs from the one the snapshot was taken on
    DeviceChanged {
        saved: DeviceId,
        current: DeviceId,
    },

    /// Saved state dropped without being applied
    SnapshotDiscarded {
        reason: String,
    },
}

impl std::fmt::Display for VolumeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeEvent::Ducked { from, to, .. } => {
                write!(f, "DUCKED ({:.2} -> {:.2})", from, to)
            }
            VolumeEvent::Restored { volume, muted, .. } => {
                write!(f, "RESTORED ({:.2}, muted: {})", volume, muted)
            }
            VolumeEvent::RestoreSkipped { current, expected } => {
                write!(f, "RESTORE_SKIPPED (current {:.2}, expected {:.2})", current, expected)
            }
            VolumeEvent::DeviceChanged { saved, current } => {
                write!(f, "DEVICE_CHANGED ({} -> {})", saved, current)
            }
            VolumeEvent::SnapshotDiscarded { reason } => {
                write!(f, "SNAPSHOT_DISCARDED ({})", reason)
            }
        }
    }
}
