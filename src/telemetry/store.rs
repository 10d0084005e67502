//! Shared key-sectioned telemetry store
//!
//! Receivers publish into it, the forwarder and any display layer read from
//! it. It is injected where it is needed rather than living in a global.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};
use tracing::warn;

/// Shared telemetry document, one JSON value per top-level section
pub trait TelemetryStore: Send + Sync {
    /// Returns the named top-level section, or `Value::Null` if absent
    fn read_section(&self, name: &str) -> Value;

    /// Merges the top-level keys of `partial` into the store.
    ///
    /// Existing keys are replaced wholesale, like a dictionary update.
    fn update(&self, partial: Value);
}

/// In-process store backed by one JSON object
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: RwLock<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-filled with the keys of `initial` (ignored unless it is an object)
    pub fn with_document(initial: Value) -> Self {
        let store = Self::new();
        store.update(initial);
        store
    }

    /// Copy of the whole document
    pub fn snapshot(&self) -> Value {
        Value::Object(self.read().clone())
    }

    fn read(&self) -> RwLockReadGuard<'_, Map<String, Value>> {
        match self.document.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Map<String, Value>> {
        match self.document.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl TelemetryStore for MemoryStore {
    fn read_section(&self, name: &str) -> Value {
        self.read().get(name).cloned().unwrap_or(Value::Null)
    }

    fn update(&self, partial: Value) {
        match partial {
            Value::Object(entries) => {
                let mut document = self.write();
                for (key, value) in entries {
                    document.insert(key, value);
                }
            }
            other => warn!("Ignoring non-object store update: {}", other),
        }
    }
}
