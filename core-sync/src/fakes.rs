//! In-memory collaborator fakes shared by the unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use bridge_traits::error::{BridgeError, Result};
use bridge_traits::{FileStorage, RemoteEntry, SettingsStore};

/// In-memory `FileStorage` with version counters standing in for ETags.
///
/// Every mutation bumps a global revision; directory tags embed the revision
/// so they change whenever any contained file changes.
pub struct InMemoryFileStorage {
    dirs: Mutex<HashMap<String, HashMap<String, (Bytes, String)>>>,
    revision: AtomicU64,
    unreachable: AtomicBool,
}

impl InMemoryFileStorage {
    pub fn new() -> Self {
        Self {
            dirs: Mutex::new(HashMap::new()),
            revision: AtomicU64::new(0),
            unreachable: AtomicBool::new(false),
        }
    }

    /// Simulate the store becoming unreachable.
    pub fn set_unreachable(&self, value: bool) {
        self.unreachable.store(value, Ordering::SeqCst);
    }

    /// Remove a file behind the adapter's back (a "remote edit").
    pub fn remove_file(&self, dir: &str, name: &str) {
        let mut dirs = self.dirs.lock().unwrap();
        if let Some(files) = dirs.get_mut(dir) {
            files.remove(name);
        }
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    /// Count of files in a directory.
    pub fn file_count(&self, dir: &str) -> usize {
        self.dirs
            .lock()
            .unwrap()
            .get(dir)
            .map(|files| files.len())
            .unwrap_or(0)
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(BridgeError::Network("storage unreachable".to_string()));
        }
        Ok(())
    }

    fn next_etag(&self) -> String {
        format!("e{}", self.revision.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl Default for InMemoryFileStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileStorage for InMemoryFileStorage {
    async fn directory_etag(&self, dir: &str) -> Result<String> {
        self.check_reachable()?;
        self.dirs.lock().unwrap().entry(dir.to_string()).or_default();
        Ok(format!("dir-{}-{}", dir, self.revision.load(Ordering::SeqCst)))
    }

    async fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>> {
        self.check_reachable()?;
        let dirs = self.dirs.lock().unwrap();
        Ok(dirs
            .get(dir)
            .map(|files| {
                files
                    .iter()
                    .map(|(name, (_, etag))| RemoteEntry {
                        name: name.clone(),
                        etag: etag.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get(&self, dir: &str, name: &str) -> Result<(Bytes, String)> {
        self.check_reachable()?;
        let dirs = self.dirs.lock().unwrap();
        dirs.get(dir)
            .and_then(|files| files.get(name))
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(format!("{}/{}", dir, name)))
    }

    async fn put(&self, dir: &str, name: &str, body: Bytes) -> Result<String> {
        self.check_reachable()?;
        let etag = self.next_etag();
        let mut dirs = self.dirs.lock().unwrap();
        dirs.entry(dir.to_string())
            .or_default()
            .insert(name.to_string(), (body, etag.clone()));
        Ok(etag)
    }

    async fn delete(&self, dir: &str, name: &str) -> Result<()> {
        self.check_reachable()?;
        let mut dirs = self.dirs.lock().unwrap();
        let removed = dirs
            .get_mut(dir)
            .and_then(|files| files.remove(name))
            .is_some();

        if !removed {
            return Err(BridgeError::NotFound(format!("{}/{}", dir, name)));
        }

        self.revision.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory `SettingsStore`.
pub struct MemorySettingsStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set_string(key, if value { "true" } else { "false" }).await
    }

    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        Ok(self
            .get_string(key)
            .await?
            .map(|v| v == "true"))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.values.lock().unwrap().contains_key(key))
    }
}
