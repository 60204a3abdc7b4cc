//! News source trait and structured error types.
//!
//! The NewsSource trait abstracts over where raw news comes from (Eastmoney,
//! a directory of JSON files, test doubles). Sources know nothing about the
//! cache; the service sits above them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

/// A news record as delivered by a source, before validation.
///
/// `publish_time` stays a string here; the normalizer owns parsing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub publish_time: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub url: String,
}

/// Structured error types for source fetches.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("no news available for '{security_id}'")]
    NotFound { security_id: String },

    #[error("hard stop: news provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source error: {0}")]
    Other(String),
}

/// Trait for news sources.
pub trait NewsSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch raw records for a security, in the order the source ranks them.
    fn fetch(&self, security_id: &str) -> Result<Vec<RawRecord>, SourceError>;
}

/// Decode a payload's elements one at a time.
///
/// A malformed element is logged and skipped; the rest still come through.
pub(crate) fn decode_each<T: DeserializeOwned>(
    security_id: &str,
    values: Vec<serde_json::Value>,
) -> Vec<T> {
    values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(security_id, index, error = %e, "skipping malformed news record");
                None
            }
        })
        .collect()
}

impl<S: NewsSource + ?Sized> NewsSource for std::sync::Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(&self, security_id: &str) -> Result<Vec<RawRecord>, SourceError> {
        (**self).fetch(security_id)
    }
}

impl<S: NewsSource + ?Sized> NewsSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(&self, security_id: &str) -> Result<Vec<RawRecord>, SourceError> {
        (**self).fetch(security_id)
    }
}
