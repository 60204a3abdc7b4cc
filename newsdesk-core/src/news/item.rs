//! News items and the dated cache snapshot that holds them.
//!
//! The serialized shape of [`CacheRecord`] is a durable contract: other tools
//! read the cache files directly.
//!
//! ```json
//! {
//!   "date": "2024-06-10",
//!   "news": [
//!     { "title": "...", "content": "...", "publish_time": "2024-06-10 09:30:00",
//!       "source": "...", "url": "..." }
//!   ]
//! }
//! ```

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// The one timestamp format accepted from sources and written to the cache.
///
/// Parsing tolerates unpadded fields (`2024-6-9 1:2:3`); the cache always
/// gets the zero-padded form.
pub const PUBLISH_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A validated news item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    /// Article body, or the title when the source had no body.
    pub content: String,
    #[serde(with = "publish_time")]
    pub publish_time: NaiveDateTime,
    pub source: String,
    pub url: String,
}

/// Snapshot of the items fetched for one security on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    #[serde(rename = "date")]
    pub cached_at: NaiveDate,
    #[serde(rename = "news")]
    pub items: Vec<NewsItem>,
}

impl CacheRecord {
    pub fn new(cached_at: NaiveDate, items: Vec<NewsItem>) -> Self {
        Self { cached_at, items }
    }

    /// Whole days elapsed between `cached_at` and `today`.
    ///
    /// Negative when the record is dated in the future.
    pub fn age_days(&self, today: NaiveDate) -> i64 {
        (today - self.cached_at).num_days()
    }
}

/// Sort newest first. Stable, so items sharing a timestamp keep their order.
pub fn sort_newest_first(items: &mut [NewsItem]) {
    items.sort_by(|a, b| b.publish_time.cmp(&a.publish_time));
}

/// Parse a source timestamp in [`PUBLISH_TIME_FORMAT`].
pub fn parse_publish_time(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), PUBLISH_TIME_FORMAT).ok()
}

mod publish_time {
    use super::PUBLISH_TIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&ts.format(PUBLISH_TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, PUBLISH_TIME_FORMAT).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, PUBLISH_TIME_FORMAT).unwrap()
    }

    fn item(title: &str, at: &str) -> NewsItem {
        NewsItem {
            title: title.into(),
            content: format!("{title} full article body"),
            publish_time: ts(at),
            source: "Wire".into(),
            url: format!("https://example.com/{title}"),
        }
    }

    #[test]
    fn record_serializes_to_date_and_news_fields() {
        let record = CacheRecord::new(
            NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            vec![item("a", "2024-06-10 09:30:00")],
        );
        let value = serde_json::to_value(&record).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(obj.len(), 2);
        assert_eq!(obj["date"], "2024-06-10");
        assert_eq!(obj["news"][0]["publish_time"], "2024-06-10 09:30:00");
        assert_eq!(obj["news"][0].as_object().unwrap().len(), 5);
    }

    #[test]
    fn record_rejects_unparsable_date() {
        let json = r#"{"date": "10/06/2024", "news": []}"#;
        assert!(serde_json::from_str::<CacheRecord>(json).is_err());
    }

    #[test]
    fn record_rejects_iso_t_separator_in_publish_time() {
        let json = r#"{"date": "2024-06-10", "news": [{"title": "t", "content": "c",
            "publish_time": "2024-06-10T09:30:00", "source": "s", "url": "u"}]}"#;
        assert!(serde_json::from_str::<CacheRecord>(json).is_err());
    }

    #[test]
    fn sort_is_newest_first_and_stable() {
        let mut items = vec![
            item("old", "2024-06-01 08:00:00"),
            item("tie-1", "2024-06-05 08:00:00"),
            item("new", "2024-06-09 08:00:00"),
            item("tie-2", "2024-06-05 08:00:00"),
        ];
        sort_newest_first(&mut items);
        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, ["new", "tie-1", "tie-2", "old"]);
    }

    #[test]
    fn age_counts_calendar_days() {
        let record = CacheRecord::new(NaiveDate::from_ymd_opt(2024, 6, 8).unwrap(), vec![]);
        assert_eq!(record.age_days(NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()), 2);
        assert_eq!(record.age_days(NaiveDate::from_ymd_opt(2024, 6, 7).unwrap()), -1);
    }

    #[test]
    fn parse_publish_time_trims_and_rejects_other_formats() {
        assert_eq!(
            parse_publish_time(" 2024-06-10 09:30:00 "),
            Some(ts("2024-06-10 09:30:00"))
        );
        assert_eq!(parse_publish_time("2024-06-10"), None);
        assert_eq!(parse_publish_time("2024/06/10 09:30:00"), None);
    }
}
