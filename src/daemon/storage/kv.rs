use std::{future::Future, ops::Deref, sync::Mutex};

use anyhow::{Result, anyhow};
use serde_json::{Map, Value};

/// Interface for abstracting the small key-value blob the tracker persists between runs. It
/// mirrors what a browser's extension storage offers: reading a set of keys and writing several
/// keys at once.
pub trait KeyValueStore {
    /// Returns values for the requested keys. Missing keys are simply absent from the result.
    fn get(&self, keys: &[&str]) -> impl Future<Output = Result<Map<String, Value>>>;

    /// Writes all entries in one go. Keys that aren't mentioned are left untouched.
    fn set(&self, entries: Map<String, Value>) -> impl Future<Output = Result<()>>;

    /// Read-modify-write of `keys` that no other writer can interleave with. `change` receives
    /// the present subset of `keys`; whatever it leaves in the map is written back, keys it
    /// removes are deleted.
    fn modify<T, F>(&self, keys: &[&str], change: F) -> impl Future<Output = Result<T>>
    where
        F: FnOnce(&mut Map<String, Value>) -> T;
}

impl<T: Deref> KeyValueStore for T
where
    T::Target: KeyValueStore,
{
    fn get(&self, keys: &[&str]) -> impl Future<Output = Result<Map<String, Value>>> {
        self.deref().get(keys)
    }

    fn set(&self, entries: Map<String, Value>) -> impl Future<Output = Result<()>> {
        self.deref().set(entries)
    }

    fn modify<R, F>(&self, keys: &[&str], change: F) -> impl Future<Output = Result<R>>
    where
        F: FnOnce(&mut Map<String, Value>) -> R,
    {
        self.deref().modify(keys, change)
    }
}

/// Moves `keys` out of `values`, skipping the ones that aren't there.
pub(super) fn take_keys(values: &mut Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    keys.iter()
        .filter_map(|key| values.remove(*key).map(|v| (key.to_string(), v)))
        .collect()
}

/// Volatile store. Used by tests and by anything that doesn't need to survive a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow!("Memory store lock is poisoned"))?;
        Ok(keys
            .iter()
            .filter_map(|key| values.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, entries: Map<String, Value>) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow!("Memory store lock is poisoned"))?;
        values.extend(entries);
        Ok(())
    }

    async fn modify<T, F>(&self, keys: &[&str], change: F) -> Result<T>
    where
        F: FnOnce(&mut Map<String, Value>) -> T,
    {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow!("Memory store lock is poisoned"))?;
        let mut selected = take_keys(&mut values, keys);
        let output = change(&mut selected);
        values.extend(selected);
        Ok(output)
    }
}
