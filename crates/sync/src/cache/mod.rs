//! Durable client-side cache for guest carts and wishlists.
//!
//! # Architecture
//!
//! - [`LocalCache`] is a small string key/value store, the moral equivalent of
//!   browser local storage
//! - [`persisted`] owns the JSON layout stored under [`LOCAL_CART_KEY`] and
//!   [`LOCAL_WISHLIST_KEY`] and drops malformed entries on load
//! - Only the synchronizer writes to the cache
//!
//! Cache access is synchronous: hydration at startup must finish before the
//! first mutation is accepted.

pub mod persisted;

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

/// Cache key holding the guest cart.
pub const LOCAL_CART_KEY: &str = "localCart";

/// Cache key holding the guest wishlist.
pub const LOCAL_WISHLIST_KEY: &str = "localWishlist";

/// Errors that can occur when reading or writing the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing the backing store failed.
    #[error("cache I/O error for '{key}': {source}")]
    Io {
        /// Cache key being accessed.
        key: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A collection could not be encoded.
    #[error("cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Abstraction for durable cache backends.
pub trait LocalCache: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn write(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Remove `key`. Succeeds if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be modified.
    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

// =============================================================================
// MemoryCache
// =============================================================================

/// In-process cache. Survives a simulated reload as long as the same instance
/// is handed to the next synchronizer.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LocalCache for MemoryCache {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries().remove(key);
        Ok(())
    }
}

impl<T: LocalCache + ?Sized> LocalCache for std::sync::Arc<T> {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        (**self).write(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        (**self).remove(key)
    }
}

// =============================================================================
// FileCache
// =============================================================================

/// File-backed cache storing each key as `<dir>/<key>.json`.
///
/// Writes go to a temporary file that is renamed into place, so a crash never
/// leaves a half-written collection behind.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Create a cache rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory holding the cache files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

fn io_error(key: &str) -> impl FnOnce(io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        key: key.to_string(),
        source,
    }
}

impl LocalCache for FileCache {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(key)(e)),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(io_error(key))?;

        let path = self.path_for(key);
        let tmp_path = self.dir.join(format!(".{key}.json.tmp"));

        let mut file = fs::File::create(&tmp_path).map_err(io_error(key))?;
        file.write_all(value.as_bytes()).map_err(io_error(key))?;
        file.sync_all().map_err(io_error(key))?;
        drop(file);

        fs::rename(&tmp_path, &path).map_err(io_error(key))
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(key)(e)),
        }
    }
}
