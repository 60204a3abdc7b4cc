//! Raw record → [`NewsItem`] conversion with recency and content filtering.
//!
//! Per record, in order:
//! 1. parse `publish_time` ([`PUBLISH_TIME_FORMAT`])
//! 2. drop anything published before the cutoff
//! 3. take the body as content, falling back to the title
//! 4. trim every text field
//! 5. drop content shorter than [`MIN_CONTENT_CHARS`]
//!
//! Collection stops as soon as `max_items` items are accepted; the remaining
//! records are not looked at.

use super::item::{parse_publish_time, NewsItem, PUBLISH_TIME_FORMAT};
use super::provider::RawRecord;
use chrono::{Duration, NaiveDateTime};
use thiserror::Error;

/// Minimum trimmed content length, in characters.
pub const MIN_CONTENT_CHARS: usize = 10;

/// Why a single record was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("unparsable publish time '{raw}'")]
    BadTimestamp { raw: String },

    #[error("published {published} before cutoff {cutoff}")]
    Expired {
        published: NaiveDateTime,
        cutoff: NaiveDateTime,
    },

    #[error("record has neither body nor title")]
    MissingContent,

    #[error("content too short ({chars} chars)")]
    ContentTooShort { chars: usize },
}

/// Result of normalizing a batch.
#[derive(Debug, Clone, Default)]
pub struct NormalizeOutcome {
    /// Accepted items, in consumption order.
    pub items: Vec<NewsItem>,
    /// Skipped records as (index in the source batch, reason).
    pub rejected: Vec<(usize, RecordError)>,
    /// How many records were looked at before stopping.
    pub consumed: usize,
}

/// Filter parameters for one fetch.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    cutoff: NaiveDateTime,
    max_items: usize,
}

impl Normalizer {
    /// A lookback reaching past the earliest representable date accepts
    /// every publish time.
    pub fn new(now: NaiveDateTime, lookback_days: u32, max_items: usize) -> Self {
        let cutoff = Duration::try_days(i64::from(lookback_days))
            .and_then(|lookback| now.checked_sub_signed(lookback))
            .unwrap_or(NaiveDateTime::MIN);
        Self { cutoff, max_items }
    }

    /// Oldest publish time still accepted.
    pub fn cutoff(&self) -> NaiveDateTime {
        self.cutoff
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Validate one record.
    pub fn normalize_record(&self, raw: &RawRecord) -> Result<NewsItem, RecordError> {
        let publish_time =
            parse_publish_time(&raw.publish_time).ok_or_else(|| RecordError::BadTimestamp {
                raw: raw.publish_time.clone(),
            })?;

        if publish_time < self.cutoff {
            return Err(RecordError::Expired {
                published: publish_time,
                cutoff: self.cutoff,
            });
        }

        let title = raw.title.trim();
        let content = match raw.body.as_deref().map(str::trim) {
            Some(body) if !body.is_empty() => body,
            _ => title,
        };
        if content.is_empty() {
            return Err(RecordError::MissingContent);
        }

        let chars = content.chars().count();
        if chars < MIN_CONTENT_CHARS {
            return Err(RecordError::ContentTooShort { chars });
        }

        Ok(NewsItem {
            title: title.to_string(),
            content: content.to_string(),
            publish_time,
            source: raw.source.trim().to_string(),
            url: raw.url.trim().to_string(),
        })
    }

    /// Normalize records until `max_items` are accepted.
    pub fn run<I>(&self, records: I) -> NormalizeOutcome
    where
        I: IntoIterator<Item = RawRecord>,
    {
        let mut outcome = NormalizeOutcome::default();
        if self.max_items == 0 {
            return outcome;
        }

        for (index, raw) in records.into_iter().enumerate() {
            outcome.consumed = index + 1;
            match self.normalize_record(&raw) {
                Ok(item) => {
                    outcome.items.push(item);
                    if outcome.items.len() >= self.max_items {
                        break;
                    }
                }
                Err(reason) => outcome.rejected.push((index, reason)),
            }
        }

        outcome
    }
}

/// Render a timestamp the way sources and the cache write it.
pub fn format_publish_time(ts: &NaiveDateTime) -> String {
    ts.format(PUBLISH_TIME_FORMAT).to_string()
}
