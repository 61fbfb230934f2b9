//! In-process store used by tests

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{KeyValueStore, StoreError, StoredValue};

/// Map-backed store; clones share the same entries, which lets a test keep
/// a handle after moving the store into a controller
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, StoredValue>>>,
    fail_writes: Arc<Mutex<bool>>,
    fail_key_suffix: Arc<Mutex<Option<String>>>,
    fail_reads: Arc<Mutex<bool>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Make every subsequent `set` fail
    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }

    /// Make `set` fail only for keys ending in `suffix`
    pub fn fail_writes_to(&self, suffix: &str) {
        *self.fail_key_suffix.lock() = Some(suffix.to_string());
    }

    pub fn fail_reads(&self, fail: bool) {
        *self.fail_reads.lock() = fail;
    }

    fn denied(message: &str) -> StoreError {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            message.to_string(),
        ))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
        if *self.fail_reads.lock() {
            return Err(Self::denied("reads disabled"));
        }
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&mut self, key: &str, value: StoredValue) -> Result<(), StoreError> {
        let key_blocked = self
            .fail_key_suffix
            .lock()
            .as_deref()
            .is_some_and(|suffix| key.ends_with(suffix));
        if *self.fail_writes.lock() || key_blocked {
            return Err(Self::denied("writes disabled"));
        }
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
