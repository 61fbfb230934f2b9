//! Ducking state machine
//!
//! Two states, derived from whether a snapshot is held:
//! - Idle: nothing saved, volume untouched
//! - Ducked: pre-duck state saved, volume lowered
//!
//! Every snapshot-touching operation runs under one lock that covers both
//! the in-process snapshot and the durable store, so Duck, Restore and the
//! launch sweep never interleave.

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::audio::{clamp_volume, DeviceId, VolumeAccessor, VolumeError};
use crate::events::VolumeEvent;
use crate::store::KeyValueStore;

use super::snapshot::{self, SnapshotKeys, VolumeSnapshot};

/// Fraction assumed when checking the ducked level on restore. The
/// fraction actually used by Duck is not part of the snapshot.
pub const DEFAULT_DUCK_FRACTION: f32 = 0.1;

/// Largest difference from the expected ducked level that still counts as
/// untouched by the user
pub const CONFLICT_TOLERANCE: f32 = 0.05;

/// Ducking state as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuckState {
    /// No snapshot held
    #[default]
    Idle,
    /// Snapshot held, volume lowered
    Ducked,
}

impl std::fmt::Display for DuckState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuckState::Idle => write!(f, "Idle"),
            DuckState::Ducked => write!(f, "Ducked"),
        }
    }
}

/// What a successful restore did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Saved volume and mute written back
    Restored,
    /// Volume was changed while ducked; snapshot dropped, device untouched
    Skipped,
}

/// State guarded by the controller lock
struct Inner {
    /// Authoritative in-process copy
    snapshot: Option<VolumeSnapshot>,
    /// Durable copy, consulted only when `snapshot` is empty
    store: Box<dyn KeyValueStore>,
}

/// Lowers output volume around an event and puts it back afterwards
pub struct DuckingController {
    accessor: VolumeAccessor,
    keys: SnapshotKeys,
    inner: Mutex<Inner>,
    event_tx: Option<broadcast::Sender<VolumeEvent>>,
}

impl DuckingController {
    /// Create a controller with no snapshot held in process
    pub fn new(
        accessor: VolumeAccessor,
        store: Box<dyn KeyValueStore>,
        keys: SnapshotKeys,
    ) -> Self {
        Self {
            accessor,
            keys,
            inner: Mutex::new(Inner {
                snapshot: None,
                store,
            }),
            event_tx: None,
        }
    }

    /// Publish transition events on `event_tx`
    pub fn with_events(mut self, event_tx: broadcast::Sender<VolumeEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn accessor(&self) -> &VolumeAccessor {
        &self.accessor
    }

    pub fn state(&self) -> DuckState {
        if self.inner.lock().snapshot.is_some() {
            DuckState::Ducked
        } else {
            DuckState::Idle
        }
    }

    /// The in-process snapshot, if ducked
    pub fn snapshot(&self) -> Option<VolumeSnapshot> {
        self.inner.lock().snapshot.clone()
    }

    /// Save the current output state and lower volume to `target` of it
    ///
    /// Replaces any snapshot already held. With `persist`, the snapshot is
    /// also written to durable storage first; a storage failure is logged
    /// and does not stop the duck. If a device write fails, the snapshot
    /// taken by this call is dropped again before the error is returned.
    pub fn duck(&self, target: f32, persist: bool) -> Result<(), VolumeError> {
        let target = clamp_volume(target);
        let mut inner = self.inner.lock();

        let device = self.accessor.default_output_device()?;
        let volume = self.accessor.volume(device)?;
        let muted = self.accessor.is_muted(device)?;

        let snapshot = VolumeSnapshot::new(volume, muted, device, Utc::now());

        let persisted = persist && self.persist(&mut inner, &snapshot);
        inner.snapshot = Some(snapshot.clone());

        info!(
            volume = snapshot.volume,
            muted = snapshot.is_muted,
            %device,
            persisted,
            "saved volume state"
        );

        let ducked = snapshot.volume * target;
        if let Err(e) = self.lower(device, &snapshot, ducked) {
            warn!(%e, "duck failed, dropping saved state");
            inner.snapshot = None;
            if persisted {
                self.clear_durable(&mut inner);
            }
            return Err(e);
        }

        info!(from = snapshot.volume, to = ducked, "ducked volume");
        self.emit(VolumeEvent::Ducked {
            from: snapshot.volume,
            to: ducked,
            device,
        });

        Ok(())
    }

    /// Put back the saved volume and mute state
    ///
    /// Falls back to durable storage when nothing is held in process. If
    /// the current volume is no longer near the expected ducked level the
    /// user is assumed to have changed it: the snapshot is dropped and the
    /// device left alone.
    pub fn restore(&self, clear_persistent: bool) -> Result<RestoreOutcome, VolumeError> {
        let mut inner = self.inner.lock();
        self.restore_locked(&mut inner, clear_persistent)
    }

    /// Crash recovery sweep, run once at startup
    ///
    /// Restores a durable snapshot left behind by a previous process. No
    /// failure escapes: it is logged and the durable copy is cleared so a
    /// broken snapshot is not retried on the next launch.
    pub fn restore_on_launch(&self) -> Option<RestoreOutcome> {
        let mut inner = self.inner.lock();

        let saved = match snapshot::decode(inner.store.as_mut(), &self.keys, Utc::now()) {
            Ok(Some(saved)) => saved,
            Ok(None) => {
                debug!("no saved volume state to recover");
                return None;
            }
            Err(e) => {
                warn!(%e, store = inner.store.name(), "unreadable saved volume state, clearing");
                self.clear_durable(&mut inner);
                return None;
            }
        };

        info!(captured_at = %saved.captured_at, "found saved volume state from previous run");
        if inner.snapshot.is_none() {
            inner.snapshot = Some(saved);
        }

        match self.restore_locked(&mut inner, true) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(%e, "failed to restore volume on launch");
                inner.snapshot = None;
                self.clear_durable(&mut inner);
                None
            }
        }
    }

    /// Restore if a duck is still live, for use at shutdown
    pub fn restore_if_ducked(&self) -> Result<Option<RestoreOutcome>, VolumeError> {
        let mut inner = self.inner.lock();
        if inner.snapshot.is_none() {
            return Ok(None);
        }
        self.restore_locked(&mut inner, true).map(Some)
    }

    /// Volume of the current default output device
    pub fn volume(&self) -> Result<f32, VolumeError> {
        let device = self.accessor.default_output_device()?;
        self.accessor.volume(device)
    }

    pub fn set_volume(&self, volume: f32) -> Result<(), VolumeError> {
        let device = self.accessor.default_output_device()?;
        self.accessor.set_volume(device, volume)
    }

    pub fn is_muted(&self) -> Result<bool, VolumeError> {
        let device = self.accessor.default_output_device()?;
        self.accessor.is_muted(device)
    }

    pub fn set_muted(&self, muted: bool) -> Result<(), VolumeError> {
        let device = self.accessor.default_output_device()?;
        self.accessor.set_muted(device, muted)
    }

    fn restore_locked(
        &self,
        inner: &mut Inner,
        clear_persistent: bool,
    ) -> Result<RestoreOutcome, VolumeError> {
        let saved = match inner.snapshot.clone() {
            Some(saved) => saved,
            None => {
                let saved = self.load_durable(inner).ok_or(VolumeError::NoSavedState)?;
                inner.snapshot = Some(saved.clone());
                saved
            }
        };

        if saved.is_stale(Utc::now()) {
            warn!(captured_at = %saved.captured_at, "saved volume state too old, discarding");
            self.discard(inner, "stale");
            return Err(VolumeError::NoSavedState);
        }

        let device = self.accessor.default_output_device()?;
        if device != saved.device_id {
            warn!(
                saved = %saved.device_id,
                current = %device,
                "output device changed since save, restoring to new device"
            );
            self.emit(VolumeEvent::DeviceChanged {
                saved: saved.device_id,
                current: device,
            });
        }

        let current = self.accessor.volume(device)?;
        let expected = saved.volume * DEFAULT_DUCK_FRACTION;

        if (current - expected).abs() > CONFLICT_TOLERANCE {
            warn!(current, expected, "volume changed while ducked, skipping restore");
            self.discard(inner, "volume changed while ducked");
            self.emit(VolumeEvent::RestoreSkipped { current, expected });
            return Ok(RestoreOutcome::Skipped);
        }

        self.accessor.set_volume(device, saved.volume)?;
        self.accessor.set_muted(device, saved.is_muted)?;

        inner.snapshot = None;
        if clear_persistent {
            self.clear_durable(inner);
        }

        info!(volume = saved.volume, muted = saved.is_muted, %device, "restored volume");
        self.emit(VolumeEvent::Restored {
            volume: saved.volume,
            muted: saved.is_muted,
            device,
        });

        Ok(RestoreOutcome::Restored)
    }

    /// Unmute if needed, then lower the volume. A failed volume write after
    /// unmuting puts the mute flag back.
    fn lower(
        &self,
        device: DeviceId,
        saved: &VolumeSnapshot,
        ducked: f32,
    ) -> Result<(), VolumeError> {
        // Ducking a muted output would be inaudible and look untouched on restore
        if saved.is_muted {
            self.accessor.set_muted(device, false)?;
        }

        if let Err(e) = self.accessor.set_volume(device, ducked) {
            if saved.is_muted {
                if let Err(mute_err) = self.accessor.set_muted(device, true) {
                    warn!(%mute_err, "failed to re-mute after duck failure");
                }
            }
            return Err(e);
        }

        Ok(())
    }

    /// Best-effort durable write; returns whether it succeeded. A failed
    /// write leaves no durable copy at all.
    fn persist(&self, inner: &mut Inner, saved: &VolumeSnapshot) -> bool {
        match snapshot::encode(inner.store.as_mut(), &self.keys, saved) {
            Ok(()) => true,
            Err(e) => {
                warn!(%e, store = inner.store.name(), "failed to persist volume state");
                self.clear_durable(inner);
                false
            }
        }
    }

    /// Durable snapshot, if present and fresh; storage errors read as absent
    fn load_durable(&self, inner: &mut Inner) -> Option<VolumeSnapshot> {
        match snapshot::decode(inner.store.as_mut(), &self.keys, Utc::now()) {
            Ok(saved) => saved,
            Err(e) => {
                warn!(%e, store = inner.store.name(), "failed to load saved volume state");
                None
            }
        }
    }

    fn clear_durable(&self, inner: &mut Inner) {
        if let Err(e) = snapshot::clear(inner.store.as_mut(), &self.keys) {
            warn!(%e, store = inner.store.name(), "failed to clear saved volume state");
        }
    }

    /// Drop both copies without touching the device
    fn discard(&self, inner: &mut Inner, reason: &str) {
        inner.snapshot = None;
        self.clear_durable(inner);
        self.emit(VolumeEvent::SnapshotDiscarded {
            reason: reason.to_string(),
        });
    }

    fn emit(&self, event: VolumeEvent) {
        if let Some(tx) = &self.event_tx {
            debug!(%event, "emitting volume event");
            let _ = tx.send(event);
        }
    }
}
