use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use super::{KeyValueStore, StoreError};

/// Volatile store, used by the mock hardware mode and the tests.
///
/// Reads and writes can be made to fail to exercise the degraded paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    failing_keys: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        {
            let mut map = store.values.lock();
            for (k, v) in values {
                map.insert(k.into(), v.into());
            }
        }
        store
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail writes to `key` only; other keys keep working.
    pub fn fail_writes_for(&self, key: &str) {
        self.failing_keys.lock().insert(key.to_string());
    }

    pub fn clear_failing_keys(&self) {
        self.failing_keys.lock().clear();
    }

    fn check_write(&self, key: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) || self.failing_keys.lock().contains(key) {
            return Err(StoreError::Write {
                key: key.to_string(),
                reason: "injected write failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Read {
                key: key.to_string(),
                reason: "injected read failure".to_string(),
            });
        }
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_write(key)?;
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_many(&self, entries: &[(String, String)]) -> Result<(), StoreError> {
        for (key, _) in entries {
            self.check_write(key)?;
        }
        let mut values = self.values.lock();
        for (key, value) in entries {
            values.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}
