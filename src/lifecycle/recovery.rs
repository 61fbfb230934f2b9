//! Volume recovery at startup and shutdown
//!
//! Both run the blocking controller calls on the blocking pool and never
//! fail the daemon: problems are logged and startup or shutdown continues.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::ducking::{DuckingController, RestoreOutcome};

/// Undo a duck left behind by a previous process
pub async fn recover_on_launch(controller: Arc<DuckingController>) -> Option<RestoreOutcome> {
    match tokio::task::spawn_blocking(move || controller.restore_on_launch()).await {
        Ok(Some(outcome)) => {
            info!(?outcome, "recovered volume from previous run");
            Some(outcome)
        }
        Ok(None) => None,
        Err(e) => {
            error!(?e, "launch recovery task failed");
            None
        }
    }
}

/// Restore a duck that is still live when the daemon stops
pub async fn restore_before_exit(controller: Arc<DuckingController>) -> Option<RestoreOutcome> {
    match tokio::task::spawn_blocking(move || controller.restore_if_ducked()).await {
        Ok(Ok(Some(outcome))) => {
            info!(?outcome, "restored volume before exit");
            Some(outcome)
        }
        Ok(Ok(None)) => None,
        Ok(Err(e)) => {
            warn!(%e, "failed to restore volume before exit");
            None
        }
        Err(e) => {
            error!(?e, "exit restore task failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{SimulatedDevice, SimulatedHardware, VolumeAccessor};
    use crate::ducking::SnapshotKeys;
    use crate::store::MemoryStore;

    fn controller(hardware: Arc<SimulatedHardware>, store: MemoryStore) -> Arc<DuckingController> {
        Arc::new(DuckingController::new(
            VolumeAccessor::new(hardware),
            Box::new(store),
            SnapshotKeys::default(),
        ))
    }

    #[test]
    fn test_launch_recovery_restores_crashed_duck() {
        let hardware = Arc::new(SimulatedHardware::new(SimulatedDevice {
            volume: 0.6,
            ..SimulatedDevice::default()
        }));
        let store = MemoryStore::new();

        controller(hardware.clone(), store.clone()).duck(0.1, true).unwrap();

        let outcome = tokio_test::block_on(recover_on_launch(controller(hardware.clone(), store)));
        assert_eq!(outcome, Some(RestoreOutcome::Restored));
        assert_eq!(hardware.volume(), 0.6);
    }

    #[tokio::test]
    async fn test_exit_restore_only_when_ducked() {
        let hardware = Arc::new(SimulatedHardware::default());
        let ducker = controller(hardware.clone(), MemoryStore::new());

        assert_eq!(restore_before_exit(Arc::clone(&ducker)).await, None);

        ducker.duck(0.1, false).unwrap();
        assert_eq!(
            restore_before_exit(Arc::clone(&ducker)).await,
            Some(RestoreOutcome::Restored)
        );
        assert_eq!(hardware.volume(), SimulatedDevice::default().volume);
    }
}
