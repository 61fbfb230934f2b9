//! Raw output-device binding
//!
//! The lowest layer: every call is one synchronous round trip to the OS
//! audio subsystem and reports failure as the OS status code it got back.

use serde::{Deserialize, Serialize};

/// Numeric status returned by the OS audio subsystem (zero means success)
pub type OsStatus = i32;

/// Successful status
pub const NO_ERR: OsStatus = 0;

/// `kAudioHardwareUnknownPropertyError` ('who?'): the device does not
/// expose the requested property
pub const UNKNOWN_PROPERTY: OsStatus = fourcc(b"who?") as OsStatus;

/// `kAudioHardwareBadObjectError` ('!obj')
pub const BAD_OBJECT: OsStatus = fourcc(b"!obj") as OsStatus;

/// Build a CoreAudio four-character code
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*code)
}

/// Opaque identifier of an audio device (CoreAudio `AudioDeviceID`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// `kAudioDeviceUnknown`
    pub const UNKNOWN: DeviceId = DeviceId(0);

    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Device-level property access as exposed by the OS
///
/// Implementations do no interpretation: clamping, fallbacks and error
/// mapping happen in [`super::VolumeAccessor`].
pub trait AudioHardware: Send + Sync {
    /// Current default output device, or [`DeviceId::UNKNOWN`] if none
    fn default_output_device(&self) -> Result<DeviceId, OsStatus>;

    /// Linear output gain of the device
    fn read_volume(&self, device: DeviceId) -> Result<f32, OsStatus>;

    fn write_volume(&self, device: DeviceId, volume: f32) -> Result<(), OsStatus>;

    /// Whether the volume property accepts writes on this device
    fn is_volume_settable(&self, device: DeviceId) -> Result<bool, OsStatus>;

    /// Raw mute flag (non-zero means muted)
    fn read_mute(&self, device: DeviceId) -> Result<u32, OsStatus>;

    fn write_mute(&self, device: DeviceId, muted: u32) -> Result<(), OsStatus>;

    /// Short backend name for logs and status output
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_matches_coreaudio_constants() {
        // kAudioHardwareUnknownPropertyError
        assert_eq!(UNKNOWN_PROPERTY, 2003332927);
        assert_eq!(fourcc(b"mute"), 0x6D75_7465);
    }

    #[test]
    fn test_device_id_serializes_as_integer() {
        let json = serde_json::to_string(&DeviceId(73)).unwrap();
        assert_eq!(json, "73");
        assert!(DeviceId(0).is_unknown());
    }
}
