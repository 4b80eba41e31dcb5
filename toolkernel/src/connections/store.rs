//! Persistence for connection records.

use super::record::ConnectionRecord;
use crate::errors::ConnectionError;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Loads and saves the full set of connection records.
///
/// Implementations store records keyed by server id. Callers serialise access,
/// so a `load` followed by `save` is not raced by another writer.
pub trait ConnectionStore: Send + Sync {
    /// Returns every stored record.
    fn load(&self) -> Result<Vec<ConnectionRecord>, ConnectionError>;

    /// Replaces the stored records.
    fn save(&self, records: &[ConnectionRecord]) -> Result<(), ConnectionError>;
}

/// Keeps records in memory only.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Mutex<BTreeMap<String, ConnectionRecord>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConnectionStore for InMemoryStore {
    fn load(&self) -> Result<Vec<ConnectionRecord>, ConnectionError> {
        Ok(self.records.lock().values().cloned().collect())
    }

    fn save(&self, records: &[ConnectionRecord]) -> Result<(), ConnectionError> {
        *self.records.lock() = records
            .iter()
            .map(|r| (r.server_id.clone(), r.clone()))
            .collect();
        Ok(())
    }
}

/// Stores records as a pretty-printed JSON object keyed by server id.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Creates a store backed by `path`. The file is created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConnectionStore for JsonFileStore {
    fn load(&self) -> Result<Vec<ConnectionRecord>, ConnectionError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let value: serde_json::Value = serde_json::from_str(&text)?;
        let records = match value {
            // Older registries were written as a plain list.
            serde_json::Value::Array(_) => serde_json::from_value::<Vec<ConnectionRecord>>(value)?,
            serde_json::Value::Object(_) => {
                serde_json::from_value::<BTreeMap<String, ConnectionRecord>>(value)?
                    .into_values()
                    .collect()
            }
            other => {
                warn!(path = %self.path.display(), "Unexpected registry format");
                return Err(ConnectionError::Store(format!(
                    "expected object or array, found {other}"
                )));
            }
        };
        debug!(path = %self.path.display(), count = records.len(), "Loaded connection registry");
        Ok(records)
    }

    fn save(&self, records: &[ConnectionRecord]) -> Result<(), ConnectionError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let keyed: BTreeMap<&str, &ConnectionRecord> = records
            .iter()
            .map(|r| (r.server_id.as_str(), r))
            .collect();
        let text = serde_json::to_string_pretty(&keyed)?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::record::{ConnectionParams, ConnectionStatus};
    use pretty_assertions::assert_eq;

    fn record(url: &str, name: &str) -> ConnectionRecord {
        ConnectionRecord::new(&ConnectionParams::new(url, name), vec![])
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = InMemoryStore::new();
        assert!(store.load().unwrap().is_empty());

        store.save(&[record("http://a", "A"), record("http://b", "B")]).unwrap();
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("servers.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_file_store_keyed_by_server_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("servers.json");
        let store = JsonFileStore::new(&path);

        let a = record("http://a", "A");
        store.save(&[a.clone()]).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[&a.server_id]["name"], "A");

        let loaded = store.load().unwrap();
        assert_eq!(loaded, vec![a]);
    }

    #[test]
    fn test_file_store_reads_list_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");
        std::fs::write(
            &path,
            r#"[{"server_id": "x", "server_url": "http://x", "name": "X",
                 "last_connected": "2024-01-01T00:00:00+00:00", "status": "error"}]"#,
        )
        .unwrap();

        let loaded = JsonFileStore::new(&path).load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].status, ConnectionStatus::Error);
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");
        std::fs::write(&path, "42").unwrap();
        assert!(matches!(
            JsonFileStore::new(&path).load(),
            Err(ConnectionError::Store(_))
        ));
    }
}
