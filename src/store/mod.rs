//! Durable key-value storage
//!
//! Scalar values survive a process restart. Backends:
//! - `FileStore`: JSON file under the daemon data directory
//! - `PreferencesStore`: macOS user defaults (CFPreferences)
//! - `MemoryStore`: in-process map for tests

mod file;
#[cfg(test)]
mod memory;
#[cfg(target_os = "macos")]
mod preferences;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use file::FileStore;
#[cfg(test)]
pub use memory::MemoryStore;
#[cfg(target_os = "macos")]
pub use preferences::PreferencesStore;

/// A single stored scalar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StoredValue {
    Float(f64),
    Bool(bool),
    Integer(i64),
    Timestamp(DateTime<Utc>),
}

impl StoredValue {
    /// Numeric value, accepting either number representation
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StoredValue::Float(v) => Some(*v),
            StoredValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Integer value; floats are truncated
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StoredValue::Integer(v) => Some(*v),
            StoredValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Boolean value; numbers are true when non-zero
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StoredValue::Bool(v) => Some(*v),
            StoredValue::Integer(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            StoredValue::Timestamp(v) => Some(*v),
            _ => None,
        }
    }
}

/// Errors from a storage backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("preferences error: {0}")]
    Preferences(String),
}

/// Key-value storage that survives a process restart
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError>;

    fn set(&mut self, key: &str, value: StoredValue) -> Result<(), StoreError>;

    /// Remove `key`; removing a missing key is not an error
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_serialization() {
        let json = serde_json::to_string(&StoredValue::Float(0.8)).unwrap();
        assert_eq!(json, r#"{"type":"float","value":0.8}"#);

        let value: StoredValue = serde_json::from_str(r#"{"type":"bool","value":true}"#).unwrap();
        assert_eq!(value, StoredValue::Bool(true));
    }

    #[test]
    fn test_lenient_accessors() {
        assert_eq!(StoredValue::Integer(1).as_f64(), Some(1.0));
        assert_eq!(StoredValue::Float(73.0).as_i64(), Some(73));
        assert_eq!(StoredValue::Integer(0).as_bool(), Some(false));
        assert_eq!(StoredValue::Bool(true).as_f64(), None);
        assert_eq!(StoredValue::Float(0.5).as_timestamp(), None);
    }
}
