//! volume-duck-daemon: Background daemon that ducks system output volume
//!
//! This daemon runs as a LaunchAgent and provides:
//! - Ducking of the default output device around an event (e.g. recording)
//! - Restore with detection of manual volume changes made while ducked
//! - Crash recovery of a duck left behind by a previous process
//! - IPC server for the UI layer
//!
//! Scope:
//! - Default output device only, linear gain and mute flag
//! - NO device enumeration, volume curves, or UI

mod audio;
mod config;
mod ducking;
mod events;
mod ipc;
mod lifecycle;
mod store;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::audio::{AudioHardware, SimulatedHardware, VolumeAccessor};
use crate::config::{Config, HardwareBackend, StoreBackend};
use crate::ducking::{DuckingController, SnapshotKeys};
use crate::events::VolumeEvent;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::store::{FileStore, KeyValueStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "volume-duck-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.store, ?config.hardware, "configuration loaded");

    // Register signal handlers before any work that could be interrupted
    let mut shutdown = ShutdownSignal::new().context("failed to register signal handlers")?;

    let store = open_store(&config)?;
    let hardware = open_hardware(&config);

    // Controller -> IPC subscribers
    let (event_tx, _event_rx) = broadcast::channel::<VolumeEvent>(64);

    let controller = Arc::new(
        DuckingController::new(
            VolumeAccessor::new(hardware),
            store,
            SnapshotKeys::new(&config.key_prefix),
        )
        .with_events(event_tx.clone()),
    );

    if config.restore_on_launch {
        lifecycle::recover_on_launch(Arc::clone(&controller)).await;
    } else {
        info!("launch recovery disabled");
    }

    let server = Server::new(&config.socket_path, Arc::clone(&controller), event_tx)?;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Wait for shutdown signal
        reason = shutdown.wait() => {
            info!(%reason, "shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    server.shutdown().await;
    lifecycle::restore_before_exit(controller).await;

    info!("volume-duck-daemon stopped");

    Ok(())
}

/// Build the durable store selected by configuration
fn open_store(config: &Config) -> Result<Box<dyn KeyValueStore>> {
    match config.store {
        StoreBackend::File => {
            let store = FileStore::open(&config.state_file)
                .context("failed to open state file")?;
            info!(path = ?store.path(), "using file store");
            Ok(Box::new(store))
        }
        #[cfg(target_os = "macos")]
        StoreBackend::Preferences => {
            info!(domain = %config.preferences_domain, "using preferences store");
            Ok(Box::new(store::PreferencesStore::new(&config.preferences_domain)))
        }
        #[cfg(not(target_os = "macos"))]
        StoreBackend::Preferences => {
            warn!(
                domain = %config.preferences_domain,
                "preferences store requires macOS, falling back to file store"
            );
            Ok(Box::new(FileStore::open(&config.state_file)
                .context("failed to open state file")?))
        }
    }
}

/// Build the audio binding selected by configuration
fn open_hardware(config: &Config) -> Arc<dyn AudioHardware> {
    match config.hardware {
        #[cfg(target_os = "macos")]
        HardwareBackend::CoreAudio => Arc::new(audio::CoreAudioHardware::new()),
        #[cfg(not(target_os = "macos"))]
        HardwareBackend::CoreAudio => {
            warn!("CoreAudio requires macOS, using simulated output device");
            Arc::new(SimulatedHardware::default())
        }
        HardwareBackend::Simulated => {
            warn!("using simulated output device, system volume will not change");
            Arc::new(SimulatedHardware::default())
        }
    }
}
