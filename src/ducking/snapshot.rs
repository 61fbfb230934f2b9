//! Pre-duck volume snapshot and its durable encoding
//!
//! A snapshot is stored as four independent entries under a common key
//! prefix rather than one blob. The timestamp entry doubles as the
//! presence marker: without it there is nothing to restore.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::audio::{clamp_volume, DeviceId};
use crate::store::{KeyValueStore, StoreError, StoredValue};

/// Key prefix used unless configured otherwise
pub const DEFAULT_KEY_PREFIX: &str = "com.ultrawhisper.savedVolume";

/// Maximum age in seconds of a snapshot that may still be applied
pub const STALENESS_WINDOW_SECS: i64 = 3600;

/// Output state captured right before ducking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSnapshot {
    /// Linear gain in [0, 1]
    pub volume: f32,
    pub is_muted: bool,
    pub device_id: DeviceId,
    pub captured_at: DateTime<Utc>,
}

impl VolumeSnapshot {
    pub fn new(
        volume: f32,
        is_muted: bool,
        device_id: DeviceId,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            volume: clamp_volume(volume),
            is_muted,
            device_id,
            captured_at,
        }
    }

    /// Whether the snapshot is too old to apply at `now`
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.captured_at) > Duration::seconds(STALENESS_WINDOW_SECS)
    }
}

/// Store keys for one snapshot namespace
#[derive(Debug, Clone)]
pub struct SnapshotKeys {
    volume: String,
    muted: String,
    device_id: String,
    timestamp: String,
}

impl SnapshotKeys {
    pub fn new(prefix: &str) -> Self {
        Self {
            volume: format!("{prefix}.volume"),
            muted: format!("{prefix}.muted"),
            device_id: format!("{prefix}.deviceID"),
            timestamp: format!("{prefix}.timestamp"),
        }
    }

    fn all(&self) -> [&str; 4] {
        [
            self.volume.as_str(),
            self.muted.as_str(),
            self.device_id.as_str(),
            self.timestamp.as_str(),
        ]
    }
}

impl Default for SnapshotKeys {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

/// Write all four snapshot entries
///
/// The old timestamp is removed first and the new one written last, so an
/// interrupted write leaves no presence marker and decodes as absent rather
/// than mixing fields from two captures.
pub fn encode(
    store: &mut dyn KeyValueStore,
    keys: &SnapshotKeys,
    snapshot: &VolumeSnapshot,
) -> Result<(), StoreError> {
    store.remove(&keys.timestamp)?;
    store.set(&keys.volume, StoredValue::Float(f64::from(snapshot.volume)))?;
    store.set(&keys.muted, StoredValue::Bool(snapshot.is_muted))?;
    store.set(&keys.device_id, StoredValue::Integer(i64::from(snapshot.device_id.0)))?;
    store.set(&keys.timestamp, StoredValue::Timestamp(snapshot.captured_at))?;
    Ok(())
}

/// Read the durable snapshot, if one exists and is fresh at `now`
///
/// A stale snapshot is removed from the store as a side effect and
/// reported as absent. Missing sibling fields read as their zero value.
pub fn decode(
    store: &mut dyn KeyValueStore,
    keys: &SnapshotKeys,
    now: DateTime<Utc>,
) -> Result<Option<VolumeSnapshot>, StoreError> {
    let Some(captured_at) = store
        .get(&keys.timestamp)?
        .and_then(|v| v.as_timestamp())
    else {
        return Ok(None);
    };

    let volume = store.get(&keys.volume)?.and_then(|v| v.as_f64()).unwrap_or(0.0);
    let is_muted = store.get(&keys.muted)?.and_then(|v| v.as_bool()).unwrap_or(false);
    let device_id = store
        .get(&keys.device_id)?
        .and_then(|v| v.as_i64())
        .and_then(|id| u32::try_from(id).ok())
        .unwrap_or(0);

    let snapshot = VolumeSnapshot::new(volume as f32, is_muted, DeviceId(device_id), captured_at);

    if snapshot.is_stale(now) {
        warn!(%captured_at, "saved volume state too old, discarding");
        clear(store, keys)?;
        return Ok(None);
    }

    Ok(Some(snapshot))
}

/// Remove all four snapshot entries
pub fn clear(store: &mut dyn KeyValueStore, keys: &SnapshotKeys) -> Result<(), StoreError> {
    for key in keys.all() {
        store.remove(key)?;
    }
    Ok(())
}
