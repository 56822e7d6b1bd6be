use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Text key-value store the task collection is persisted into.
pub trait KeyValueStore {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn write(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let mut storage = Self::default();
        storage.entries.insert(key.to_string(), value.to_string());
        storage
    }
}

impl KeyValueStore for MemoryStorage {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key under `data_dir`, replaced atomically.
#[derive(Debug, Clone)]
pub struct FileStorage {
    pub data_dir: PathBuf,
}

impl FileStorage {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened file storage");
        Ok(Self { data_dir })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.data_dir.join(format!("{name}.json"))
    }
}

impl KeyValueStore for FileStorage {
    #[tracing::instrument(skip(self))]
    fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            debug!(file = %path.display(), "no stored value");
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        Ok(Some(raw))
    }

    #[tracing::instrument(skip(self, value))]
    fn write(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key);
        debug!(file = %path.display(), bytes = value.len(), "writing atomically");

        let mut temp = NamedTempFile::new_in(&self.data_dir)?;
        temp.write_all(value.as_bytes())?;
        temp.flush()?;
        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn file_storage_roundtrip() {
        let temp = tempdir().expect("tempdir");
        let mut storage = FileStorage::open(&temp.path().join("nested")).expect("open storage");

        assert_eq!(storage.read("tasks").expect("read"), None);
        storage.write("tasks", "[]").expect("write");
        storage.write("tasks", "[1]").expect("overwrite");
        assert_eq!(storage.read("tasks").expect("read"), Some("[1]".to_string()));
        assert!(storage.path_for("tasks").ends_with("tasks.json"));
    }

    #[test]
    fn keys_cannot_escape_the_data_dir() {
        let temp = tempdir().expect("tempdir");
        let storage = FileStorage::open(temp.path()).expect("open storage");
        let path = storage.path_for("../etc/passwd");

        assert_eq!(path.parent(), Some(temp.path()));
    }

    #[test]
    fn memory_storage_roundtrip() {
        let mut storage = MemoryStorage::with_entry("tasks", "[]");
        assert_eq!(storage.read("tasks").expect("read"), Some("[]".to_string()));
        assert_eq!(storage.read("other").expect("read"), None);
        storage.write("other", "x").expect("write");
        assert_eq!(storage.read("other").expect("read"), Some("x".to_string()));
    }
}
