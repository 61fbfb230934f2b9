//! Volume ducking with crash recovery
//!
//! Lowers output volume around an event, remembers what it was, and puts
//! it back afterwards. The saved state is mirrored to durable storage so a
//! crash while ducked is undone on the next launch.

mod controller;
mod snapshot;

pub use controller::{DuckState, DuckingController, RestoreOutcome};
pub use snapshot::{SnapshotKeys, VolumeSnapshot, DEFAULT_KEY_PREFIX};
