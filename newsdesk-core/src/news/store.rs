//! Key-value persistence for cache records.
//!
//! Layout of the file backend: `{cache_dir}/{stem}.json`, one file per
//! security. Plain identifiers (`600519`, `AAPL`, `BRK-B`) are their own
//! stem; anything else is sanitized and suffixed with a blake3 digest so two
//! identifiers never share a file.
//!
//! Writes are atomic (write to `.tmp`, rename into place) and always replace
//! the whole record.

use super::item::CacheRecord;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Failures of the cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read cache file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt cache record for '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode cache record for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write cache file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    /// True for failures on the write path.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Encode { .. } | Self::Write { .. })
    }
}

/// Storage backend for cache records, keyed by security identifier.
pub trait NewsStore: Send + Sync {
    fn name(&self) -> &str;

    /// Read the record for `key`. `Ok(None)` when nothing is stored.
    fn read(&self, key: &str) -> Result<Option<CacheRecord>, CacheError>;

    /// Replace the record for `key`.
    fn write(&self, key: &str, record: &CacheRecord) -> Result<(), CacheError>;
}

/// File stem for a key.
pub fn key_file_stem(key: &str) -> String {
    let plain = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if plain {
        return key.to_string();
    }

    let sanitized: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(32)
        .collect();
    let digest = blake3::hash(key.as_bytes()).to_hex();
    format!("{sanitized}~{}", &digest[..12])
}

/// One pretty-printed JSON file per key.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    cache_dir: PathBuf,
}

impl JsonFileStore {
    /// The directory is created on first write.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path of the file holding `key`.
    pub fn record_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key_file_stem(key)))
    }

    /// Every `*.json` file in the cache directory with its parse result.
    ///
    /// Sorted by path. A missing directory yields an empty list.
    pub fn entries(&self) -> Result<Vec<StoredEntry>, CacheError> {
        let dir = match fs::read_dir(&self.cache_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(CacheError::Read {
                    path: self.cache_dir.clone(),
                    source,
                })
            }
        };

        let mut entries = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|source| CacheError::Read {
                path: self.cache_dir.clone(),
                source,
            })?;
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let record = read_record(&path, &stem);
            let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
            entries.push(StoredEntry {
                stem,
                path,
                size_bytes,
                record,
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Delete the record for `key`. Returns whether a file was removed.
    pub fn remove(&self, key: &str) -> Result<bool, CacheError> {
        remove_file(&self.record_path(key))
    }
}

/// Delete a cache file. Returns whether it existed.
pub fn remove_file(path: &Path) -> Result<bool, CacheError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(CacheError::Write {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// A file found in the cache directory.
#[derive(Debug)]
pub struct StoredEntry {
    pub stem: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub record: Result<CacheRecord, CacheError>,
}

fn read_record(path: &Path, key: &str) -> Result<CacheRecord, CacheError> {
    let json = fs::read_to_string(path).map_err(|source| CacheError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&json).map_err(|source| CacheError::Corrupt {
        key: key.to_string(),
        source,
    })
}

impl NewsStore for JsonFileStore {
    fn name(&self) -> &str {
        "json_file"
    }

    fn read(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        let path = self.record_path(key);
        if !path.exists() {
            return Ok(None);
        }
        read_record(&path, key).map(Some)
    }

    fn write(&self, key: &str, record: &CacheRecord) -> Result<(), CacheError> {
        fs::create_dir_all(&self.cache_dir).map_err(|source| CacheError::Write {
            path: self.cache_dir.clone(),
            source,
        })?;

        let json = serde_json::to_string_pretty(record).map_err(|source| CacheError::Encode {
            key: key.to_string(),
            source,
        })?;

        let path = self.record_path(key);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|source| CacheError::Write {
            path: tmp_path.clone(),
            source,
        })?;

        fs::rename(&tmp_path, &path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            CacheError::Write {
                path: path.clone(),
                source,
            }
        })
    }
}

/// In-process store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, CacheRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing the cache policy.
    pub fn insert(&self, key: impl Into<String>, record: CacheRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), record);
    }

    pub fn get(&self, key: &str) -> Option<CacheRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NewsStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn read(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        Ok(self.get(key))
    }

    fn write(&self, key: &str, record: &CacheRecord) -> Result<(), CacheError> {
        self.insert(key, record.clone());
        Ok(())
    }
}

impl<S: NewsStore + ?Sized> NewsStore for std::sync::Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn read(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        (**self).read(key)
    }

    fn write(&self, key: &str, record: &CacheRecord) -> Result<(), CacheError> {
        (**self).write(key, record)
    }
}
