//! Pluggable key-value storage.
//!
//! Used for two things: API-key style secrets for the single-shot cloud
//! backend, and the best-effort path -> content mirror the orchestrator
//! writes through on every file update. Both callers treat the store as
//! localStorage: set/get/remove on string keys, no error surface.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// String key-value store with interior mutability.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// Process-lifetime in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

/// Write-through store backed by a single JSON file.
///
/// Best-effort by contract: a missing or unreadable file opens as an empty
/// store, and write failures are logged and swallowed. Nothing in the core
/// reads the file back automatically; recovery is an external action.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_entries(&path) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("could not load store at {:?}, starting empty: {}", path, err);
                HashMap::new()
            }
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn flush(&self, entries: &HashMap<String, String>) {
        match serde_json::to_string_pretty(entries) {
            Ok(json) => {
                if let Err(err) = fs::write(&self.path, json) {
                    warn!("failed to write store at {:?}: {}", self.path, err);
                }
            }
            Err(err) => warn!("failed to serialize store: {}", err),
        }
    }
}

fn read_entries(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let text = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {:?}", path))
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.lock();
        entries.remove(key);
        self.flush(&entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k"), None);
        store.set("k", "v");
        assert_eq!(store.get("k"), Some("v".to_string()));
        store.remove("k");
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn test_file_store_persists_across_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mirror.json");

        let store = FileStore::open(&path);
        store.set("index.html", "<html></html>");
        drop(store);

        let reopened = FileStore::open(&path);
        assert_eq!(reopened.get("index.html"), Some("<html></html>".to_string()));
    }

    #[test]
    fn test_file_store_opens_empty_on_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mirror.json");
        fs::write(&path, "not json at all").unwrap();

        let store = FileStore::open(&path);
        assert_eq!(store.get("anything"), None);
    }

    #[test]
    fn test_file_store_remove_writes_through() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mirror.json");

        let store = FileStore::open(&path);
        store.set("a.css", "body {}");
        store.remove("a.css");
        drop(store);

        let reopened = FileStore::open(&path);
        assert_eq!(reopened.get("a.css"), None);
    }
}
