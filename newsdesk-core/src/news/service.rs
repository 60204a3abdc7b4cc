//! News service: cache-or-fetch orchestration.
//!
//! ```text
//! lookup(cache) ── fresh and len >= max_items ──> first max_items cached items
//!       │
//!       └─ otherwise ─> source.fetch ─> Normalizer ─> sort newest first
//!                         ─> save ─> items
//! ```
//!
//! A cache hit returns the snapshot as it was filtered when fetched; the
//! caller's lookback window is not re-applied to it.
//!
//! Soft failures (source down, unreadable cache, failed write) never fail a
//! request. They are logged here and reported on [`NewsReport`].

use super::cache::{CacheLookup, NewsCache};
use super::item::{sort_newest_first, NewsItem};
use super::normalize::Normalizer;
use super::provider::{NewsSource, SourceError};
use super::store::{CacheError, NewsStore};
use crate::config::NewsConfig;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Misuse of the query API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("security id is empty")]
    EmptySecurityId,

    #[error("lookback_days must be greater than zero")]
    ZeroLookback,

    #[error("max_items must be greater than zero")]
    ZeroMaxItems,
}

/// A validated news request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsQuery {
    security_id: String,
    lookback_days: u32,
    max_items: usize,
}

impl NewsQuery {
    pub fn new(
        security_id: impl Into<String>,
        lookback_days: u32,
        max_items: usize,
    ) -> Result<Self, QueryError> {
        let security_id = security_id.into().trim().to_string();
        if security_id.is_empty() {
            return Err(QueryError::EmptySecurityId);
        }
        if lookback_days == 0 {
            return Err(QueryError::ZeroLookback);
        }
        if max_items == 0 {
            return Err(QueryError::ZeroMaxItems);
        }
        Ok(Self {
            security_id,
            lookback_days,
            max_items,
        })
    }

    pub fn security_id(&self) -> &str {
        &self.security_id
    }

    pub fn lookback_days(&self) -> u32 {
        self.lookback_days
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }
}

/// Where the returned items came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewsOrigin {
    Cache,
    Source,
    /// The source failed; items is empty.
    SourceFailed,
}

/// Items plus everything that went softly wrong producing them.
#[derive(Debug)]
pub struct NewsReport {
    pub security_id: String,
    pub items: Vec<NewsItem>,
    pub origin: NewsOrigin,
    /// Raw records skipped by the normalizer.
    pub rejected: usize,
    pub source_error: Option<SourceError>,
    pub cache_read_error: Option<CacheError>,
    pub cache_write_error: Option<CacheError>,
}

impl NewsReport {
    fn new(security_id: &str, origin: NewsOrigin) -> Self {
        Self {
            security_id: security_id.to_string(),
            items: Vec::new(),
            origin,
            rejected: 0,
            source_error: None,
            cache_read_error: None,
            cache_write_error: None,
        }
    }

    pub fn from_cache(&self) -> bool {
        self.origin == NewsOrigin::Cache
    }
}

/// Per-key mutexes serializing load → fetch → save for one security.
///
/// An entry lives only while some request for its key holds or waits on it.
#[derive(Default)]
struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    fn table(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn acquire(&self, key: &str) -> Arc<Mutex<()>> {
        self.table().entry(key.to_string()).or_default().clone()
    }

    /// Drop the table entry once no other request shares `lock`.
    fn release(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut table = self.table();
        // one count for the table, one for `lock`
        if Arc::strong_count(&lock) == 2 {
            table.remove(key);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table().len()
    }
}

/// Cache-or-fetch news service for one source and one cache.
pub struct NewsService {
    source: Box<dyn NewsSource>,
    cache: NewsCache,
    default_lookback_days: u32,
    default_max_items: usize,
    locks: KeyLocks,
}

impl NewsService {
    pub fn new(
        source: impl NewsSource + 'static,
        store: impl NewsStore + 'static,
        config: &NewsConfig,
    ) -> Self {
        Self {
            source: Box::new(source),
            cache: NewsCache::new(store, config.cache_valid_days),
            default_lookback_days: config.default_lookback_days,
            default_max_items: config.default_max_items,
            locks: KeyLocks::default(),
        }
    }

    pub fn cache(&self) -> &NewsCache {
        &self.cache
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Query for `security_id` using the configured defaults.
    pub fn default_query(&self, security_id: &str) -> Result<NewsQuery, QueryError> {
        NewsQuery::new(security_id, self.default_lookback_days, self.default_max_items)
    }

    /// Recent news for a security, newest first when freshly fetched.
    ///
    /// Only query misuse fails; source and cache problems yield a (possibly
    /// empty) list.
    pub fn get_news(
        &self,
        security_id: &str,
        lookback_days: u32,
        max_items: usize,
    ) -> Result<Vec<NewsItem>, QueryError> {
        let query = NewsQuery::new(security_id, lookback_days, max_items)?;
        Ok(self.get_news_at(&query, chrono::Local::now().naive_local()).items)
    }

    /// Run `query` as of `now`, reporting the origin and any soft failures.
    pub fn get_news_at(&self, query: &NewsQuery, now: NaiveDateTime) -> NewsReport {
        let key = query.security_id();
        let lock = self.locks.acquire(key);
        let report = {
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            self.cache_or_fetch(query, now)
        };
        self.locks.release(key, lock);
        report
    }

    fn cache_or_fetch(&self, query: &NewsQuery, now: NaiveDateTime) -> NewsReport {
        let key = query.security_id();
        let today = now.date();
        let mut cache_read_error = None;

        match self.cache.lookup(key, today) {
            CacheLookup::Fresh(record) if record.items.len() >= query.max_items() => {
                debug!(security_id = key, cached = record.items.len(), "using cached news");
                let mut report = NewsReport::new(key, NewsOrigin::Cache);
                report.items = record.items;
                report.items.truncate(query.max_items());
                return report;
            }
            CacheLookup::Fresh(record) => {
                info!(
                    security_id = key,
                    cached = record.items.len(),
                    requested = query.max_items(),
                    "cached news insufficient, refetching"
                );
            }
            CacheLookup::Stale { cached_at } => {
                debug!(security_id = key, %cached_at, "cached news is stale");
            }
            CacheLookup::Missing => {}
            CacheLookup::Unreadable(e) => {
                warn!(security_id = key, error = %e, "failed to read news cache, treating as miss");
                cache_read_error = Some(e);
            }
        }

        let records = match self.source.fetch(key) {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    security_id = key,
                    source = self.source.name(),
                    error = %e,
                    "news fetch failed"
                );
                let mut report = NewsReport::new(key, NewsOrigin::SourceFailed);
                report.source_error = Some(e);
                report.cache_read_error = cache_read_error;
                return report;
            }
        };
        info!(security_id = key, fetched = records.len(), "fetched news");

        let normalizer = Normalizer::new(now, query.lookback_days(), query.max_items());
        let outcome = normalizer.run(records);
        for (index, reason) in &outcome.rejected {
            debug!(security_id = key, index, %reason, "skipped news record");
        }

        let mut items = outcome.items;
        sort_newest_first(&mut items);

        let mut report = NewsReport::new(key, NewsOrigin::Source);
        if let Err(e) = self.cache.try_save(key, &items, today) {
            warn!(security_id = key, error = %e, "failed to save news cache");
            report.cache_write_error = Some(e);
        }

        report.items = items;
        report.rejected = outcome.rejected.len();
        report.cache_read_error = cache_read_error;
        report
    }
}
