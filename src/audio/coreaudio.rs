//! CoreAudio binding for the default output device
//!
//! Addresses the virtual main volume and mute properties in the output
//! scope. Every call is a single synchronous `AudioObject*PropertyData`
//! round trip; statuses are passed through untouched.

use std::ffi::c_void;
use std::mem;
use std::ptr;

use coreaudio_sys::{
    AudioObjectGetPropertyData, AudioObjectID, AudioObjectIsPropertySettable,
    AudioObjectPropertyAddress, AudioObjectPropertyElement, AudioObjectPropertyScope,
    AudioObjectPropertySelector, AudioObjectSetPropertyData, Boolean,
};

use super::hardware::{fourcc, AudioHardware, DeviceId, OsStatus, NO_ERR};

/// `kAudioObjectSystemObject`
const SYSTEM_OBJECT: AudioObjectID = 1;

/// `kAudioHardwarePropertyDefaultOutputDevice`
const DEFAULT_OUTPUT_DEVICE: AudioObjectPropertySelector = fourcc(b"dOut");
/// `kAudioHardwareServiceDeviceProperty_VirtualMainVolume`
const VIRTUAL_MAIN_VOLUME: AudioObjectPropertySelector = fourcc(b"vmvc");
/// `kAudioDevicePropertyMute`
const MUTE: AudioObjectPropertySelector = fourcc(b"mute");

/// `kAudioObjectPropertyScopeGlobal`
const SCOPE_GLOBAL: AudioObjectPropertyScope = fourcc(b"glob");
/// `kAudioDevicePropertyScopeOutput`
const SCOPE_OUTPUT: AudioObjectPropertyScope = fourcc(b"outp");
/// `kAudioObjectPropertyElementMain`
const ELEMENT_MAIN: AudioObjectPropertyElement = 0;

fn address(
    selector: AudioObjectPropertySelector,
    scope: AudioObjectPropertyScope,
) -> AudioObjectPropertyAddress {
    AudioObjectPropertyAddress {
        mSelector: selector,
        mScope: scope,
        mElement: ELEMENT_MAIN,
    }
}

/// Read a plain-old-data property value
fn get_property<T: Copy + Default>(
    object: AudioObjectID,
    address: &AudioObjectPropertyAddress,
) -> Result<T, OsStatus> {
    let mut value = T::default();
    let mut size = mem::size_of::<T>() as u32;

    // SAFETY: `value` is a live, correctly sized buffer for `size` bytes and
    // `address` outlives the call.
    let status = unsafe {
        AudioObjectGetPropertyData(
            object,
            address,
            0,
            ptr::null(),
            &mut size,
            &mut value as *mut T as *mut c_void,
        )
    };

    if status != NO_ERR {
        return Err(status);
    }
    Ok(value)
}

/// Write a plain-old-data property value
fn set_property<T: Copy>(
    object: AudioObjectID,
    address: &AudioObjectPropertyAddress,
    value: T,
) -> Result<(), OsStatus> {
    let size = mem::size_of::<T>() as u32;

    // SAFETY: `value` lives on the stack for the duration of the call and
    // is exactly `size` bytes.
    let status = unsafe {
        AudioObjectSetPropertyData(
            object,
            address,
            0,
            ptr::null(),
            size,
            &value as *const T as *const c_void,
        )
    };

    if status != NO_ERR {
        return Err(status);
    }
    Ok(())
}

/// Output volume control through CoreAudio
#[derive(Debug, Default)]
pub struct CoreAudioHardware;

impl CoreAudioHardware {
    pub fn new() -> Self {
        Self
    }
}

impl AudioHardware for CoreAudioHardware {
    fn default_output_device(&self) -> Result<DeviceId, OsStatus> {
        let id: AudioObjectID =
            get_property(SYSTEM_OBJECT, &address(DEFAULT_OUTPUT_DEVICE, SCOPE_GLOBAL))?;
        Ok(DeviceId(id))
    }

    fn read_volume(&self, device: DeviceId) -> Result<f32, OsStatus> {
        get_property::<f32>(device.0, &address(VIRTUAL_MAIN_VOLUME, SCOPE_OUTPUT))
    }

    fn write_volume(&self, device: DeviceId, volume: f32) -> Result<(), OsStatus> {
        set_property(device.0, &address(VIRTUAL_MAIN_VOLUME, SCOPE_OUTPUT), volume)
    }

    fn is_volume_settable(&self, device: DeviceId) -> Result<bool, OsStatus> {
        let mut settable: Boolean = 0;
        let address = address(VIRTUAL_MAIN_VOLUME, SCOPE_OUTPUT);

        // SAFETY: `settable` is a valid out pointer for the call.
        let status = unsafe { AudioObjectIsPropertySettable(device.0, &address, &mut settable) };

        if status != NO_ERR {
            return Err(status);
        }
        Ok(settable != 0)
    }

    fn read_mute(&self, device: DeviceId) -> Result<u32, OsStatus> {
        get_property::<u32>(device.0, &address(MUTE, SCOPE_OUTPUT))
    }

    fn write_mute(&self, device: DeviceId, muted: u32) -> Result<(), OsStatus> {
        set_property(device.0, &address(MUTE, SCOPE_OUTPUT), muted)
    }

    fn name(&self) -> &'static str {
        "coreaudio"
    }
}
