//! Offline source: raw records read from `{dir}/{stem}.json`.
//!
//! Each file holds a JSON array of [`RawRecord`]. File stems follow the same
//! key derivation as the cache, so `600519` reads `600519.json`.

use super::provider::{decode_each, NewsSource, RawRecord, SourceError};
use super::store::key_file_stem;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FileSource {
    dir: PathBuf,
}

impl FileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, security_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key_file_stem(security_id)))
    }
}

impl NewsSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    fn fetch(&self, security_id: &str) -> Result<Vec<RawRecord>, SourceError> {
        let path = self.path_for(security_id);
        let json = match std::fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound {
                    security_id: security_id.to_string(),
                })
            }
            Err(source) => return Err(SourceError::Io { path, source }),
        };

        let values: Vec<serde_json::Value> = serde_json::from_str(&json).map_err(|e| {
            SourceError::ResponseFormatChanged(format!("{}: {e}", path.display()))
        })?;
        Ok(decode_each(security_id, values))
    }
}
