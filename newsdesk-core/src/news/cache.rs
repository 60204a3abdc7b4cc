//! Staleness policy on top of a [`NewsStore`].
//!
//! A record is fresh while `today - cached_at <= valid_days`. Staleness is
//! judged at read time; stale records are left on disk.

use super::item::{CacheRecord, NewsItem};
use super::store::{CacheError, NewsStore};
use chrono::NaiveDate;
use tracing::{debug, warn};

/// What a cache read found.
#[derive(Debug)]
pub enum CacheLookup {
    Fresh(CacheRecord),
    Stale { cached_at: NaiveDate },
    Missing,
    Unreadable(CacheError),
}

impl CacheLookup {
    pub fn into_fresh(self) -> Option<CacheRecord> {
        match self {
            Self::Fresh(record) => Some(record),
            _ => None,
        }
    }
}

/// Dated news snapshots per security.
pub struct NewsCache {
    store: Box<dyn NewsStore>,
    valid_days: u32,
}

impl NewsCache {
    pub fn new(store: impl NewsStore + 'static, valid_days: u32) -> Self {
        Self {
            store: Box::new(store),
            valid_days,
        }
    }

    pub fn valid_days(&self) -> u32 {
        self.valid_days
    }

    pub fn store(&self) -> &dyn NewsStore {
        self.store.as_ref()
    }

    /// Whether a record dated `cached_at` is still usable on `today`.
    pub fn is_fresh(&self, cached_at: NaiveDate, today: NaiveDate) -> bool {
        (today - cached_at).num_days() <= i64::from(self.valid_days)
    }

    /// Read `key` and classify the result.
    pub fn lookup(&self, key: &str, today: NaiveDate) -> CacheLookup {
        match self.store.read(key) {
            Ok(None) => CacheLookup::Missing,
            Ok(Some(record)) if self.is_fresh(record.cached_at, today) => {
                CacheLookup::Fresh(record)
            }
            Ok(Some(record)) => CacheLookup::Stale {
                cached_at: record.cached_at,
            },
            Err(e) => CacheLookup::Unreadable(e),
        }
    }

    /// Fresh record for `key`, or `None`. Read failures are logged as misses.
    pub fn load(&self, key: &str, today: NaiveDate) -> Option<CacheRecord> {
        match self.lookup(key, today) {
            CacheLookup::Fresh(record) => Some(record),
            CacheLookup::Stale { cached_at } => {
                debug!(key, %cached_at, "cached news is stale");
                None
            }
            CacheLookup::Missing => None,
            CacheLookup::Unreadable(e) => {
                warn!(key, error = %e, "failed to read news cache, treating as miss");
                None
            }
        }
    }

    /// Replace the record for `key` with `items` dated `today`.
    pub fn try_save(
        &self,
        key: &str,
        items: &[NewsItem],
        today: NaiveDate,
    ) -> Result<(), CacheError> {
        let record = CacheRecord::new(today, items.to_vec());
        self.store.write(key, &record)
    }

    /// Best-effort [`try_save`](Self::try_save); failures are logged.
    pub fn save(&self, key: &str, items: &[NewsItem], today: NaiveDate) {
        if let Err(e) = self.try_save(key, items, today) {
            warn!(key, error = %e, "failed to save news cache");
        }
    }
}
