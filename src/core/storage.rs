//! Client-local durable key-value storage.
//!
//! Records are plain strings addressed by a key. The file-backed store keeps
//! one file per key and replaces it atomically, so a crash mid-write leaves
//! either the previous record or the new one on disk, never a torn file.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::core::config::data::path_display;

pub const SESSIONS_KEY: &str = "omnichat_chats";
pub const THEME_KEY: &str = "omnichat_theme";

/// Errors raised by a [`KeyValueStore`].
#[derive(Debug)]
pub enum StorageError {
    /// The record exists but could not be read.
    Read {
        path: PathBuf,
        source: io::Error,
    },

    /// The record could not be written durably.
    Write {
        path: PathBuf,
        source: io::Error,
    },

    /// The value could not be encoded before writing.
    Encode {
        key: String,
        source: serde_json::Error,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Read { path, source } => {
                write!(f, "Failed to read {}: {}", path_display(path), source)
            }
            StorageError::Write { path, source } => {
                write!(f, "Failed to write {}: {}", path_display(path), source)
            }
            StorageError::Encode { key, source } => {
                write!(f, "Failed to encode record '{}': {}", key, source)
            }
        }
    }
}

impl StdError for StorageError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StorageError::Read { source, .. } => Some(source),
            StorageError::Write { source, .. } => Some(source),
            StorageError::Encode { source, .. } => Some(source),
        }
    }
}

pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`. Returns only after the write is durable.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Directory-backed store: `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn write_atomically(&self, path: &Path, contents: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut temp_file = NamedTempFile::new_in(&self.dir)?;
        temp_file.write_all(contents.as_bytes())?;
        temp_file.as_file_mut().sync_all()?;
        temp_file.persist(path).map_err(|err| err.error)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.record_path(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read { path, source }),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.record_path(key);
        self.write_atomically(&path, value)
            .map_err(|source| StorageError::Write { path, source })
    }
}

/// In-memory store used by tests and `--ephemeral` runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, key: &str, value: &str) -> Self {
        self.records.insert(key.to_string(), value.to_string());
        self
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.records.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.records.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_store_returns_none_for_missing_records() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::new(temp_dir.path());
        assert!(store.get(SESSIONS_KEY).expect("get").is_none());
    }

    #[test]
    fn file_store_creates_directory_and_overwrites() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut store = FileStore::new(temp_dir.path().join("nested").join("data"));

        store.set(THEME_KEY, "dark").expect("first write");
        store.set(THEME_KEY, "light").expect("second write");

        assert_eq!(store.get(THEME_KEY).expect("get").as_deref(), Some("light"));
        assert!(store.dir().join("omnichat_theme.json").exists());
    }

    #[test]
    fn file_store_reports_unreadable_records() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        // A directory where the record file should be cannot be read as a string.
        fs::create_dir_all(temp_dir.path().join("omnichat_chats.json")).expect("mkdir");
        let store = FileStore::new(temp_dir.path());

        let err = store.get(SESSIONS_KEY).expect_err("read should fail");
        assert!(matches!(err, StorageError::Read { .. }));
        assert!(err.to_string().starts_with("Failed to read"));
    }

    #[test]
    fn memory_store_keeps_records_in_process() {
        let mut store = MemoryStore::new().with_record(THEME_KEY, "dark");
        assert_eq!(store.get(THEME_KEY).expect("get").as_deref(), Some("dark"));
        store.set(SESSIONS_KEY, "[]").expect("set");
        assert_eq!(store.get(SESSIONS_KEY).expect("get").as_deref(), Some("[]"));
    }
}
