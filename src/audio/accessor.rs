//! Device volume accessor
//!
//! Turns raw hardware statuses into [`VolumeError`]s. Holds no state of its
//! own: the default output device is resolved by the caller on every
//! operation, and nothing is retried.

use std::sync::Arc;

use tracing::{debug, info};

use super::error::VolumeError;
use super::hardware::{AudioHardware, DeviceId, UNKNOWN_PROPERTY};

/// Clamp a linear gain into the range devices accept
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        return 0.0;
    }
    volume.clamp(0.0, 1.0)
}

/// Typed access to the volume and mute properties of output devices
#[derive(Clone)]
pub struct VolumeAccessor {
    hardware: Arc<dyn AudioHardware>,
}

impl VolumeAccessor {
    pub fn new(hardware: Arc<dyn AudioHardware>) -> Self {
        Self { hardware }
    }

    /// Name of the backing hardware binding
    pub fn backend(&self) -> &'static str {
        self.hardware.name()
    }

    /// Resolve the current default output device
    pub fn default_output_device(&self) -> Result<DeviceId, VolumeError> {
        let device = self
            .hardware
            .default_output_device()
            .map_err(|status| VolumeError::QueryFailed {
                op: "output device",
                status,
            })?;

        if device.is_unknown() {
            return Err(VolumeError::DeviceUnavailable);
        }

        Ok(device)
    }

    /// Read the linear gain of `device`
    pub fn volume(&self, device: DeviceId) -> Result<f32, VolumeError> {
        self.hardware
            .read_volume(device)
            .map_err(|status| VolumeError::QueryFailed { op: "volume", status })
    }

    /// Write the linear gain of `device`, clamped to [0, 1]
    pub fn set_volume(&self, device: DeviceId, volume: f32) -> Result<(), VolumeError> {
        let volume = clamp_volume(volume);

        // A failed settable query is reported the same as a read-only property
        let settable = self.hardware.is_volume_settable(device).unwrap_or(false);
        if !settable {
            return Err(VolumeError::NotSettable(device));
        }

        self.hardware
            .write_volume(device, volume)
            .map_err(|status| VolumeError::WriteFailed { op: "volume", status })?;

        info!(%device, volume, "set volume");
        Ok(())
    }

    /// Read the mute flag of `device`; devices without one report unmuted
    pub fn is_muted(&self, device: DeviceId) -> Result<bool, VolumeError> {
        match self.hardware.read_mute(device) {
            Ok(value) => Ok(value != 0),
            Err(UNKNOWN_PROPERTY) => Ok(false),
            Err(status) => Err(VolumeError::QueryFailed { op: "mute state", status }),
        }
    }

    /// Write the mute flag of `device`; a no-op on devices without one
    pub fn set_muted(&self, device: DeviceId, muted: bool) -> Result<(), VolumeError> {
        match self.hardware.write_mute(device, u32::from(muted)) {
            Ok(()) => {
                info!(%device, muted, "set mute");
                Ok(())
            }
            Err(UNKNOWN_PROPERTY) => {
                debug!(%device, "device does not support mute property");
                Ok(())
            }
            Err(status) => Err(VolumeError::WriteFailed { op: "mute state", status }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::hardware::BAD_OBJECT;
    use crate::audio::simulated::{SimulatedDevice, SimulatedHardware};

    fn accessor_for(device: SimulatedDevice) -> (VolumeAccessor, Arc<SimulatedHardware>) {
        let hardware = Arc::new(SimulatedHardware::new(device));
        (VolumeAccessor::new(hardware.clone()), hardware)
    }

    #[test]
    fn test_clamp_volume() {
        assert_eq!(clamp_volume(1.5), 1.0);
        assert_eq!(clamp_volume(-0.3), 0.0);
        assert_eq!(clamp_volume(0.42), 0.42);
        assert_eq!(clamp_volume(f32::NAN), 0.0);
    }

    #[test]
    fn test_missing_default_device() {
        let (accessor, hardware) = accessor_for(SimulatedDevice::default());
        hardware.disconnect();
        assert_eq!(
            accessor.default_output_device(),
            Err(VolumeError::DeviceUnavailable)
        );
    }

    #[test]
    fn test_default_device_status_failure() {
        let (accessor, hardware) = accessor_for(SimulatedDevice::default());
        hardware.fail_default_device(BAD_OBJECT);
        assert_eq!(
            accessor.default_output_device(),
            Err(VolumeError::QueryFailed { op: "output device", status: BAD_OBJECT })
        );
    }

    #[test]
    fn test_set_volume_clamps_before_write() {
        let (accessor, hardware) = accessor_for(SimulatedDevice::default());
        let device = accessor.default_output_device().unwrap();

        accessor.set_volume(device, 1.5).unwrap();
        assert_eq!(hardware.volume(), 1.0);

        accessor.set_volume(device, -0.3).unwrap();
        assert_eq!(hardware.volume(), 0.0);
    }

    #[test]
    fn test_read_only_volume_is_not_settable() {
        let (accessor, hardware) = accessor_for(SimulatedDevice {
            volume_settable: false,
            ..SimulatedDevice::default()
        });
        let device = accessor.default_output_device().unwrap();

        assert_eq!(
            accessor.set_volume(device, 0.2),
            Err(VolumeError::NotSettable(device))
        );
        assert_eq!(hardware.volume(), SimulatedDevice::default().volume);
    }

    #[test]
    fn test_volume_status_failures() {
        let (accessor, hardware) = accessor_for(SimulatedDevice::default());
        let device = accessor.default_output_device().unwrap();

        hardware.fail_volume_reads(-50);
        assert_eq!(
            accessor.volume(device),
            Err(VolumeError::QueryFailed { op: "volume", status: -50 })
        );

        hardware.fail_volume_writes(-50);
        assert_eq!(
            accessor.set_volume(device, 0.3),
            Err(VolumeError::WriteFailed { op: "volume", status: -50 })
        );
    }

    #[test]
    fn test_device_without_mute_property() {
        let (accessor, hardware) = accessor_for(SimulatedDevice {
            has_mute: false,
            ..SimulatedDevice::default()
        });
        let device = accessor.default_output_device().unwrap();

        assert_eq!(accessor.set_muted(device, true), Ok(()));
        assert_eq!(accessor.is_muted(device), Ok(false));
        assert!(!hardware.muted());
    }

    #[test]
    fn test_mute_round_trip() {
        let (accessor, _) = accessor_for(SimulatedDevice::default());
        let device = accessor.default_output_device().unwrap();

        accessor.set_muted(device, true).unwrap();
        assert_eq!(accessor.is_muted(device), Ok(true));
        accessor.set_muted(device, false).unwrap();
        assert_eq!(accessor.is_muted(device), Ok(false));
    }
}
