//! In-memory output device
//!
//! Stands in for CoreAudio on platforms without it and in tests. Failures
//! can be injected per property to exercise error paths.

use parking_lot::Mutex;

use super::hardware::{AudioHardware, DeviceId, OsStatus, UNKNOWN_PROPERTY};

/// Observable state of the simulated default output device
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedDevice {
    pub id: DeviceId,
    pub volume: f32,
    pub muted: bool,
    /// Whether the device exposes a mute property at all
    pub has_mute: bool,
    pub volume_settable: bool,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self {
            id: DeviceId(73),
            volume: 0.5,
            muted: false,
            has_mute: true,
            volume_settable: true,
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    default_device: Option<OsStatus>,
    volume_read: Option<OsStatus>,
    volume_write: Option<OsStatus>,
    mute_read: Option<OsStatus>,
    mute_write: Option<OsStatus>,
}

#[derive(Debug)]
struct Inner {
    device: Option<SimulatedDevice>,
    faults: Faults,
}

/// Simulated audio hardware with a single default output device
#[derive(Debug)]
pub struct SimulatedHardware {
    inner: Mutex<Inner>,
}

impl SimulatedHardware {
    pub fn new(device: SimulatedDevice) -> Self {
        Self {
            inner: Mutex::new(Inner {
                device: Some(device),
                faults: Faults::default(),
            }),
        }
    }
}

#[cfg(test)]
impl SimulatedHardware {
    /// Current volume, as a user would see it (0.0 when disconnected)
    pub fn volume(&self) -> f32 {
        self.inner.lock().device.as_ref().map_or(0.0, |d| d.volume)
    }

    pub fn muted(&self) -> bool {
        self.inner.lock().device.as_ref().is_some_and(|d| d.muted)
    }

    /// Change volume from outside the daemon, like a user pressing a key
    pub fn set_volume_externally(&self, volume: f32) {
        if let Some(device) = self.inner.lock().device.as_mut() {
            device.volume = volume;
        }
    }

    pub fn set_muted_externally(&self, muted: bool) {
        if let Some(device) = self.inner.lock().device.as_mut() {
            device.muted = muted;
        }
    }

    /// Replace the default output device (e.g. headphones plugged in)
    pub fn switch_device(&self, device: SimulatedDevice) {
        self.inner.lock().device = Some(device);
    }

    /// Remove the default output device entirely
    pub fn disconnect(&self) {
        self.inner.lock().device = None;
    }

    pub fn fail_default_device(&self, status: OsStatus) {
        self.inner.lock().faults.default_device = Some(status);
    }

    pub fn fail_volume_reads(&self, status: OsStatus) {
        self.inner.lock().faults.volume_read = Some(status);
    }

    pub fn fail_volume_writes(&self, status: OsStatus) {
        self.inner.lock().faults.volume_write = Some(status);
    }

    pub fn fail_mute_reads(&self, status: OsStatus) {
        self.inner.lock().faults.mute_read = Some(status);
    }

    pub fn fail_mute_writes(&self, status: OsStatus) {
        self.inner.lock().faults.mute_write = Some(status);
    }

    pub fn clear_faults(&self) {
        self.inner.lock().faults = Faults::default();
    }
}

impl Default for SimulatedHardware {
    fn default() -> Self {
        Self::new(SimulatedDevice::default())
    }
}

/// Look up the addressed device, failing like CoreAudio on a stale id
fn addressed(inner: &mut Inner, device: DeviceId) -> Result<&mut SimulatedDevice, OsStatus> {
    match inner.device.as_mut() {
        Some(d) if d.id == device => Ok(d),
        _ => Err(super::hardware::BAD_OBJECT),
    }
}

impl AudioHardware for SimulatedHardware {
    fn default_output_device(&self) -> Result<DeviceId, OsStatus> {
        let inner = self.inner.lock();
        if let Some(status) = inner.faults.default_device {
            return Err(status);
        }
        Ok(inner.device.as_ref().map_or(DeviceId::UNKNOWN, |d| d.id))
    }

    fn read_volume(&self, device: DeviceId) -> Result<f32, OsStatus> {
        let mut inner = self.inner.lock();
        if let Some(status) = inner.faults.volume_read {
            return Err(status);
        }
        addressed(&mut inner, device).map(|d| d.volume)
    }

    fn write_volume(&self, device: DeviceId, volume: f32) -> Result<(), OsStatus> {
        let mut inner = self.inner.lock();
        if let Some(status) = inner.faults.volume_write {
            return Err(status);
        }
        addressed(&mut inner, device)?.volume = volume;
        Ok(())
    }

    fn is_volume_settable(&self, device: DeviceId) -> Result<bool, OsStatus> {
        let mut inner = self.inner.lock();
        addressed(&mut inner, device).map(|d| d.volume_settable)
    }

    fn read_mute(&self, device: DeviceId) -> Result<u32, OsStatus> {
        let mut inner = self.inner.lock();
        if let Some(status) = inner.faults.mute_read {
            return Err(status);
        }
        let device = addressed(&mut inner, device)?;
        if !device.has_mute {
            return Err(UNKNOWN_PROPERTY);
        }
        Ok(u32::from(device.muted))
    }

    fn write_mute(&self, device: DeviceId, muted: u32) -> Result<(), OsStatus> {
        let mut inner = self.inner.lock();
        if let Some(status) = inner.faults.mute_write {
            return Err(status);
        }
        let device = addressed(&mut inner, device)?;
        if !device.has_mute {
            return Err(UNKNOWN_PROPERTY);
        }
        device.muted = muted != 0;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::hardware::BAD_OBJECT;

    #[test]
    fn test_stale_device_id_is_bad_object() {
        let hardware = SimulatedHardware::default();
        assert_eq!(hardware.read_volume(DeviceId(1)), Err(BAD_OBJECT));
    }

    #[test]
    fn test_disconnected_reports_unknown_device() {
        let hardware = SimulatedHardware::default();
        hardware.disconnect();
        assert_eq!(hardware.default_output_device(), Ok(DeviceId::UNKNOWN));
    }
}
