/// A single named, durable text slot.
///
/// Backends:
/// - `Memory`: process-local, used in tests and when nothing durable is configured
/// - `File`: one file on disk, replaced atomically on write
/// - `Redis`: one key, no expiry
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::CommonError;
use crate::redis::RedisStore;

#[derive(Clone)]
pub enum KvSlot {
    Memory(Arc<Mutex<Option<String>>>),
    File(PathBuf),
    Redis { store: RedisStore, key: String },
}

impl KvSlot {
    pub fn memory() -> Self {
        Self::Memory(Arc::new(Mutex::new(None)))
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn redis(store: RedisStore, key: impl Into<String>) -> Self {
        Self::Redis {
            store,
            key: key.into(),
        }
    }

    /// Human-readable location, for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Memory(_) => "memory".to_string(),
            Self::File(path) => format!("file:{}", path.display()),
            Self::Redis { key, .. } => format!("redis:{key}"),
        }
    }

    /// Current value, or `None` if the slot has never been written. An error means the
    /// backend could not be read, not that the slot is empty.
    pub async fn read(&self) -> Result<Option<String>, CommonError> {
        match self {
            Self::Memory(cell) => Ok(lock(cell).clone()),
            // Invalid UTF-8 is content, not an I/O failure; callers see it as corrupt data.
            Self::File(path) => match tokio::fs::read(path).await {
                Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            },
            Self::Redis { store, key } => store.get(key).await,
        }
    }

    /// Replace the slot's value.
    pub async fn write(&self, value: &str) -> Result<(), CommonError> {
        match self {
            Self::Memory(cell) => {
                *lock(cell) = Some(value.to_string());
                Ok(())
            }
            Self::File(path) => write_file_atomic(path, value).await,
            Self::Redis { store, key } => store.set(key, value).await,
        }
    }
}

fn lock(cell: &Mutex<Option<String>>) -> std::sync::MutexGuard<'_, Option<String>> {
    // A poisoned cell still holds a complete value; writes are single assignments.
    cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn write_file_atomic(path: &Path, value: &str) -> Result<(), CommonError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, value).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
