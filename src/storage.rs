//! String key-value stores the SDK persists its state in.
//!
//! Mobile apps usually back [`KeyValueStore`] with the platform preferences store
//! (`SharedPreferences`, `UserDefaults`). Two implementations are provided: [`InMemoryStore`] for
//! tests and short-lived processes, and [`FileStore`] keeping all entries in one JSON file.
use std::{
    collections::HashMap,
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, RwLock},
};

/// Error reported by a [`KeyValueStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct StorageError {
    /// Kind of failure.
    pub code: StorageErrorCode,
    /// Human-readable details.
    pub message: String,
}

impl StorageError {
    /// Create a new storage error.
    pub fn new(code: StorageErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn lock_poisoned() -> Self {
        Self::new(StorageErrorCode::Unknown, "lock poisoned")
    }
}

/// Storage error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    /// Reading or writing the backing medium failed.
    Io,
    /// The backing medium holds data that is not a valid store.
    Corrupted,
    /// Platform-specific error.
    PlatformError,
    /// Unknown error.
    Unknown,
}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        StorageError::new(StorageErrorCode::Io, value.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// A string-keyed, string-valued store shared by all SDK instances of an app.
///
/// Implementations must be thread-safe and a write must be durable when it returns.
pub trait KeyValueStore: Send + Sync {
    /// Get the value stored under `key`, or `None` if there is none.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;
}

/// In-memory store. Its content is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStore {
    data: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let data = self.data.read().map_err(|_| StorageError::lock_poisoned())?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut data = self.data.write().map_err(|_| StorageError::lock_poisoned())?;
        data.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut data = self.data.write().map_err(|_| StorageError::lock_poisoned())?;
        data.remove(key);
        Ok(())
    }
}

/// Store persisting all entries in a single JSON file.
///
/// The file is the only copy of the data: every read loads it and every write replaces it through
/// a uniquely named temporary sibling and a rename. Handles on one path within a process see each
/// other's writes. Readers in any process never observe a partial file.
pub struct FileStore {
    path: PathBuf,
}

// Serializes read-modify-write cycles of all `FileStore` handles in the process.
static WRITE_LOCK: Mutex<()> = Mutex::new(());

impl FileStore {
    /// Open the store at `path`, creating parent directories. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Fails with [`StorageErrorCode::Corrupted`] if the file exists but is not a store.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<FileStore> {
        let store = FileStore {
            path: path.as_ref().to_path_buf(),
        };
        std::fs::create_dir_all(store.dir())?;

        store.load()?;
        Ok(store)
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn load(&self) -> StorageResult<HashMap<String, String>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                StorageError::new(
                    StorageErrorCode::Corrupted,
                    format!("{}: {}", self.path.display(), err),
                )
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Apply `f` to the current file content. `f` returns whether it changed anything; unchanged
    /// content is not written back.
    fn update(&self, f: impl FnOnce(&mut HashMap<String, String>) -> bool) -> StorageResult<()> {
        let _guard = WRITE_LOCK.lock().map_err(|_| StorageError::lock_poisoned())?;

        let mut data = self.load()?;
        if f(&mut data) {
            self.persist(&data)?;
        }
        Ok(())
    }

    fn persist(&self, data: &HashMap<String, String>) -> StorageResult<()> {
        let json = serde_json::to_vec(data)
            .map_err(|err| StorageError::new(StorageErrorCode::Unknown, err.to_string()))?;

        let mut file = tempfile::NamedTempFile::new_in(self.dir())?;
        file.write_all(&json)?;
        file.as_file().sync_all()?;
        file.persist(&self.path)
            .map_err(|err| StorageError::from(err.error))?;

        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.update(|data| {
            let previous = data.insert(key.to_owned(), value.to_owned());
            previous.as_deref() != Some(value)
        })
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.update(|data| data.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn in_memory_store_get_set_remove() {
        let store = InMemoryStore::new();

        assert_eq!(store.get("key").unwrap(), None);

        store.set("key", "value").unwrap();
        assert_eq!(store.get("key").unwrap().as_deref(), Some("value"));

        store.set("key", "other").unwrap();
        assert_eq!(store.get("key").unwrap().as_deref(), Some("other"));

        store.remove("key").unwrap();
        assert_eq!(store.get("key").unwrap(), None);

        // Removing twice is fine.
        store.remove("key").unwrap();
    }

    #[test]
    fn can_write_from_another_thread() {
        let store = Arc::new(InMemoryStore::new());

        {
            let store = store.clone();
            let _ = std::thread::spawn(move || {
                store.set("key", "value").unwrap();
            })
            .join();
        }

        assert!(store.get("key").unwrap().is_some());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("optable.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.set("a", "1").unwrap();
            store.set("b", "2").unwrap();
            store.remove("a").unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(store.get("b").unwrap().as_deref(), Some("2"));

        // No temporary file is left behind.
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn file_store_handles_on_one_path_share_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("optable.json");

        let a = FileStore::open(&path).unwrap();
        let b = FileStore::open(&path).unwrap();

        a.set("OPTABLE_PASS_x", "pa").unwrap();
        b.set("OPTABLE_PASS_y", "pb").unwrap();
        assert_eq!(b.get("OPTABLE_PASS_x").unwrap().as_deref(), Some("pa"));

        a.remove("OPTABLE_PASS_y").unwrap();
        assert_eq!(b.get("OPTABLE_PASS_y").unwrap(), None);
        b.set("OPTABLE_PASS_y", "pb").unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("OPTABLE_PASS_x").unwrap().as_deref(), Some("pa"));
        assert_eq!(reopened.get("OPTABLE_PASS_y").unwrap().as_deref(), Some("pb"));
    }

    #[test]
    fn file_store_concurrent_writers_keep_every_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("optable.json");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let store = FileStore::open(&path).unwrap();
                    store.set(&format!("key-{}", i), "value").unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        for i in 0..8 {
            assert!(store.get(&format!("key-{}", i)).unwrap().is_some());
        }
    }

    #[test]
    fn file_store_reports_corrupted_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("optable.json");
        std::fs::write(&path, b"not json").unwrap();

        let err = FileStore::open(&path).err().unwrap();
        assert_eq!(err.code, StorageErrorCode::Corrupted);
    }
}
