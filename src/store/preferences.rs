//! macOS user defaults store
//!
//! Values live in the CFPreferences app domain given at construction, the
//! same place `defaults read <domain>` looks. Every mutation is followed by
//! a synchronize so it reaches disk before the call returns.

use chrono::{DateTime, TimeZone, Utc};
use core_foundation::base::{CFType, TCFType};
use core_foundation::boolean::CFBoolean;
use core_foundation::date::CFDate;
use core_foundation::number::CFNumber;
use core_foundation::string::CFString;
use core_foundation_sys::preferences::{
    CFPreferencesAppSynchronize, CFPreferencesCopyAppValue, CFPreferencesSetAppValue,
};
use tracing::debug;

use super::{KeyValueStore, StoreError, StoredValue};

/// Seconds between the Unix epoch and the CoreFoundation reference date
/// (2001-01-01T00:00:00Z)
const CF_EPOCH_OFFSET_SECS: f64 = 978_307_200.0;

fn to_absolute_time(timestamp: &DateTime<Utc>) -> f64 {
    timestamp.timestamp_micros() as f64 / 1_000_000.0 - CF_EPOCH_OFFSET_SECS
}

fn from_absolute_time(abs_time: f64) -> Option<DateTime<Utc>> {
    let micros = ((abs_time + CF_EPOCH_OFFSET_SECS) * 1_000_000.0).round() as i64;
    Utc.timestamp_micros(micros).single()
}

/// Key-value store backed by CFPreferences
pub struct PreferencesStore {
    domain: CFString,
}

impl PreferencesStore {
    pub fn new(domain: &str) -> Self {
        debug!(domain, "preferences store opened");
        Self {
            domain: CFString::new(domain),
        }
    }

    fn synchronize(&self) -> Result<(), StoreError> {
        // SAFETY: `domain` is a live CFString for the duration of the call.
        let ok = unsafe { CFPreferencesAppSynchronize(self.domain.as_concrete_TypeRef()) };
        if ok == 0 {
            return Err(StoreError::Preferences(format!(
                "failed to synchronize {}",
                self.domain
            )));
        }
        Ok(())
    }

    fn write(&mut self, key: &str, value: Option<CFType>) -> Result<(), StoreError> {
        let key = CFString::new(key);
        let value_ref = value
            .as_ref()
            .map_or(std::ptr::null(), |v| v.as_CFTypeRef());

        // SAFETY: key, value and domain are retained for the call; a null
        // value removes the key.
        unsafe {
            CFPreferencesSetAppValue(
                key.as_concrete_TypeRef(),
                value_ref,
                self.domain.as_concrete_TypeRef(),
            );
        }

        self.synchronize()
    }
}

// CFString is an immutable, thread-safe CoreFoundation object
unsafe impl Send for PreferencesStore {}

impl KeyValueStore for PreferencesStore {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
        let key = CFString::new(key);

        // SAFETY: follows the Copy rule; ownership of the returned
        // reference is taken by `wrap_under_create_rule`.
        let value = unsafe {
            let raw = CFPreferencesCopyAppValue(
                key.as_concrete_TypeRef(),
                self.domain.as_concrete_TypeRef(),
            );
            if raw.is_null() {
                return Ok(None);
            }
            CFType::wrap_under_create_rule(raw)
        };

        if let Some(flag) = value.downcast::<CFBoolean>() {
            return Ok(Some(StoredValue::Bool(flag.into())));
        }
        if let Some(date) = value.downcast::<CFDate>() {
            return Ok(from_absolute_time(date.abs_time()).map(StoredValue::Timestamp));
        }
        if let Some(number) = value.downcast::<CFNumber>() {
            // Lossless integer first; fractional values fall through to f64
            if let Some(int) = number.to_i64() {
                return Ok(Some(StoredValue::Integer(int)));
            }
            return Ok(number.to_f64().map(StoredValue::Float));
        }

        Err(StoreError::Preferences(format!(
            "unsupported value type for {}",
            key
        )))
    }

    fn set(&mut self, key: &str, value: StoredValue) -> Result<(), StoreError> {
        let value = match value {
            StoredValue::Float(v) => CFNumber::from(v).as_CFType(),
            StoredValue::Integer(v) => CFNumber::from(v).as_CFType(),
            StoredValue::Bool(v) => CFBoolean::from(v).as_CFType(),
            StoredValue::Timestamp(v) => CFDate::new(to_absolute_time(&v)).as_CFType(),
        };
        self.write(key, Some(value))
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.write(key, None)
    }

    fn name(&self) -> &'static str {
        "preferences"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_time_conversion() {
        let reference = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(to_absolute_time(&reference), 0.0);

        let later = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 15).unwrap();
        assert_eq!(from_absolute_time(to_absolute_time(&later)), Some(later));
    }
}
