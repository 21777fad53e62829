use anyhow::Context;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const RUNS_KEY: &str = "deepracer-training-runs";
pub const STATS_KEY: &str = "deepracer-stats";
pub const MAX_SPEED_KEY: &str = "deepracer-max-speed";

/// StorageError is returned by storage backends when a value could not be written.
#[derive(Debug)]
pub enum StorageError {
    /// Writing the value would exceed the storage quota (bytes).
    QuotaExceeded { requested: usize, available: usize },
    Io(std::io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StorageError::QuotaExceeded {
                requested,
                available,
            } => write!(
                f,
                "Storage quota exceeded: {} bytes requested, {} bytes available",
                requested, available
            ),
            StorageError::Io(e) => write!(f, "Storage I/O error: {}", e),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            StorageError::QuotaExceeded { .. } => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

/// Keyed string storage with a single writer. Reads never fail, a missing or unreadable key
/// is reported as None.
pub trait StorageBackend {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// check_quota returns an error if replacing a value of len_old bytes by len_new bytes would
/// push the used bytes over the quota.
fn check_quota(
    quota: Option<usize>,
    used: usize,
    len_old: usize,
    len_new: usize,
) -> Result<(), StorageError> {
    if let Some(quota) = quota {
        let used_without = used.saturating_sub(len_old);
        if used_without + len_new > quota {
            return Err(StorageError::QuotaExceeded {
                requested: len_new,
                available: quota.saturating_sub(used_without),
            });
        }
    }
    Ok(())
}

// -------------------------------------------------------------------------------------------------
// IN-MEMORY STORAGE -------------------------------------------------------------------------------
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> MemoryStorage {
        MemoryStorage::default()
    }

    /// with_quota creates a storage that refuses writes once the sum of all value lengths
    /// would exceed quota_bytes.
    pub fn with_quota(quota_bytes: usize) -> MemoryStorage {
        MemoryStorage {
            entries: HashMap::new(),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn used_bytes(&self) -> usize {
        self.entries.values().map(|v| v.len()).sum()
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let len_old = self.entries.get(key).map_or(0, |v| v.len());
        check_quota(self.quota_bytes, self.used_bytes(), len_old, value.len())?;
        self.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------
// FILE STORAGE ------------------------------------------------------------------------------------
// -------------------------------------------------------------------------------------------------

/// FileStorage keeps every key in its own JSON file inside a data directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
    quota_bytes: Option<usize>,
}

impl FileStorage {
    /// The method creates the data directory if necessary.
    pub fn new(dir: &Path) -> anyhow::Result<FileStorage> {
        std::fs::create_dir_all(dir).context(format!(
            "Failed to create data directory {}!",
            dir.display()
        ))?;
        Ok(FileStorage {
            dir: dir.to_path_buf(),
            quota_bytes: None,
        })
    }

    pub fn with_quota(dir: &Path, quota_bytes: usize) -> anyhow::Result<FileStorage> {
        let mut storage = FileStorage::new(dir)?;
        storage.quota_bytes = Some(quota_bytes);
        Ok(storage)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let mut path = self.dir.join(key);
        path.set_extension("json");
        path
    }

    fn file_len(path: &Path) -> usize {
        std::fs::metadata(path).map_or(0, |m| m.len() as usize)
    }

    fn used_bytes(&self) -> usize {
        match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
                .map(|e| FileStorage::file_len(&e.path()))
                .sum(),
            Err(_) => 0,
        }
    }
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let mut fh = OpenOptions::new().read(true).open(self.key_path(key)).ok()?;
        let mut content = String::new();
        fh.read_to_string(&mut content).ok()?;
        Some(content)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.key_path(key);

        if self.quota_bytes.is_some() {
            check_quota(
                self.quota_bytes,
                self.used_bytes(),
                FileStorage::file_len(&path),
                value.len(),
            )?;
        }

        let mut fh = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&path)?;
        fh.write_all(value.as_bytes())?;
        fh.flush()?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("drivesim-storage-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_memory_roundtrip_and_remove() {
        let mut storage = MemoryStorage::new();
        assert_eq!(storage.get(RUNS_KEY), None);
        storage.set(RUNS_KEY, "[]").unwrap();
        assert_eq!(storage.get(RUNS_KEY).as_deref(), Some("[]"));
        storage.remove(RUNS_KEY).unwrap();
        assert_eq!(storage.get(RUNS_KEY), None);
    }

    #[test]
    fn test_memory_quota_counts_replaced_value_once() {
        let mut storage = MemoryStorage::with_quota(10);
        storage.set("a", "12345678").unwrap();
        // replacing "a" frees its 8 bytes first
        storage.set("a", "1234567890").unwrap();
        match storage.set("b", "x") {
            Err(StorageError::QuotaExceeded {
                requested,
                available,
            }) => {
                assert_eq!(requested, 1);
                assert_eq!(available, 0);
            }
            other => panic!("expected quota error, got {:?}", other),
        }
        assert_eq!(storage.get("a").as_deref(), Some("1234567890"));
    }

    #[test]
    fn test_file_storage_roundtrip() {
        let dir = temp_dir();
        let mut storage = FileStorage::new(&dir).unwrap();
        storage.set(STATS_KEY, "{\"totalRuns\":1}").unwrap();
        assert!(dir.join("deepracer-stats.json").exists());
        assert_eq!(
            storage.get(STATS_KEY).as_deref(),
            Some("{\"totalRuns\":1}")
        );
        storage.remove(STATS_KEY).unwrap();
        storage.remove(STATS_KEY).unwrap();
        assert_eq!(storage.get(STATS_KEY), None);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_file_storage_quota() {
        let dir = temp_dir();
        let mut storage = FileStorage::with_quota(&dir, 16).unwrap();
        storage.set("a", "0123456789").unwrap();
        assert!(matches!(
            storage.set("b", "0123456789"),
            Err(StorageError::QuotaExceeded { .. })
        ));
        storage.set("a", "0123456789abcdef").unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
