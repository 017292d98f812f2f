//! The key/value contract of the trusted executor.
//!
//! Rollup records live under composite keys `"subject~bucket"`; the latest
//! raw event of a subject lives under the bare subject id.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;

use crate::error::{Result, RollupError};

/// Separator of composite keys. Forbidden inside subject ids.
pub const KEY_SEPARATOR: char = '~';

/// Build the composite key of a `(subject, bucket)` pair.
pub fn composite_key(subject: &str, bucket: &str) -> String {
    format!("{}{}{}", subject, KEY_SEPARATOR, bucket)
}

/// Split a composite key back into `(subject, bucket)`.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(KEY_SEPARATOR)
}

/// Storage the streaming engine is layered over.
pub trait StateStore: Send + Sync {
    /// Read a value, `None` if absent.
    fn get_state(&self, key: &str) -> Result<Option<Bytes>>;

    /// Write a value, replacing any previous one.
    fn put_state(&self, key: &str, value: Bytes) -> Result<()>;
}

/// In-memory state store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    inner: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> Result<usize> {
        Ok(self
            .inner
            .read()
            .map_err(|e| RollupError::State(e.to_string()))?
            .len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl StateStore for MemoryStateStore {
    fn get_state(&self, key: &str) -> Result<Option<Bytes>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| RollupError::State(e.to_string()))?;
        Ok(inner.get(key).cloned())
    }

    fn put_state(&self, key: &str, value: Bytes) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| RollupError::State(e.to_string()))?;
        inner.insert(key.to_string(), value);
        Ok(())
    }
}

impl<S: StateStore + ?Sized> StateStore for std::sync::Arc<S> {
    fn get_state(&self, key: &str) -> Result<Option<Bytes>> {
        (**self).get_state(key)
    }

    fn put_state(&self, key: &str, value: Bytes) -> Result<()> {
        (**self).put_state(key, value)
    }
}
