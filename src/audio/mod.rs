//! Audio module for output device volume control
//!
//! Two layers:
//! - `AudioHardware`: raw OS binding returning status codes
//!   (CoreAudio on macOS, an in-memory device elsewhere)
//! - `VolumeAccessor`: the typed contract used by the ducking controller

mod accessor;
#[cfg(target_os = "macos")]
mod coreaudio;
mod error;
mod hardware;
mod simulated;

pub use accessor::{clamp_volume, VolumeAccessor};
#[cfg(target_os = "macos")]
pub use coreaudio::CoreAudioHardware;
pub use error::VolumeError;
pub use hardware::{AudioHardware, DeviceId};
pub use simulated::SimulatedHardware;
#[cfg(test)]
pub use simulated::SimulatedDevice;
