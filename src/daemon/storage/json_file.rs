use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use fs4::tokio::AsyncFileExt;
use serde_json::{Map, Value};
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::{debug, warn};

use super::kv::{KeyValueStore, take_keys};

/// The main realization of [KeyValueStore]. All keys live in one JSON object on disk.
///
/// Readers and writers coordinate through an advisory lock on a sibling `.lock` file, so the
/// cli and a running host can share the same store. Writes go through a temporary file that is
/// renamed over the original, which means a crash mid-write leaves the previous state intact.
pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Result<Self, std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let lock_path = sibling_with_extension(&path, "lock");

        Ok(Self { path, lock_path })
    }

    async fn open_lock(&self) -> Result<File> {
        let file = File::options()
            .write(true)
            .create(true)
            .read(true)
            .truncate(false)
            .open(&self.lock_path)
            .await
            .with_context(|| format!("Failed to open lock file {:?}", self.lock_path))?;
        Ok(file)
    }

    async fn read_all(&self) -> Result<Map<String, Value>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Map<String, Value>>(&contents) {
            Ok(v) => Ok(v),
            Err(e) => {
                // Only happens if someone edited the file by hand.
                warn!("Store {:?} is corrupted, starting from scratch: {e}", self.path);
                Ok(Map::new())
            }
        }
    }

    async fn write_all(&self, values: &Map<String, Value>) -> Result<()> {
        let temporary = sibling_with_extension(&self.path, "tmp");
        let buffer = serde_json::to_vec_pretty(values)?;

        let mut file = File::create(&temporary).await?;
        file.write_all(&buffer).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temporary, &self.path).await?;
        debug!("Wrote {} keys into {:?}", values.len(), self.path);
        Ok(())
    }

    async fn merge_inner(&self, entries: Map<String, Value>) -> Result<()> {
        let mut values = self.read_all().await?;
        values.extend(entries);
        self.write_all(&values).await
    }

    async fn modify_inner<T>(
        &self,
        keys: &[&str],
        change: impl FnOnce(&mut Map<String, Value>) -> T,
    ) -> Result<T> {
        let mut values = self.read_all().await?;
        let mut selected = take_keys(&mut values, keys);
        let output = change(&mut selected);
        values.extend(selected);
        self.write_all(&values).await?;
        Ok(output)
    }
}

impl KeyValueStore for JsonFileStore {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>> {
        let lock = self.open_lock().await?;
        lock.lock_shared()?;
        let result = self.read_all().await;
        lock.unlock_async().await?;

        Ok(take_keys(&mut result?, keys))
    }

    async fn set(&self, entries: Map<String, Value>) -> Result<()> {
        // Semi-safe acquire-release for the store
        let lock = self.open_lock().await?;
        lock.lock_exclusive()?;
        let result = self.merge_inner(entries).await;
        lock.unlock_async().await?;
        result
    }

    async fn modify<T, F>(&self, keys: &[&str], change: F) -> Result<T>
    where
        F: FnOnce(&mut Map<String, Value>) -> T,
    {
        let lock = self.open_lock().await?;
        lock.lock_exclusive()?;
        let result = self.modify_inner(keys, change).await;
        lock.unlock_async().await?;
        result
    }
}

fn sibling_with_extension(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.file_name().map(|v| v.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(extension);
    path.with_file_name(name)
}
