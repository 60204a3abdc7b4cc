//! End-to-end behavior of the cache-or-fetch news service.

use chrono::{NaiveDate, NaiveDateTime};
use newsdesk_core::news::{
    CacheError, CacheRecord, FileSource, JsonFileStore, MemoryStore, NewsItem, NewsOrigin,
    NewsQuery, NewsSource, NewsStore, RawRecord, SourceError, PUBLISH_TIME_FORMAT,
};
use newsdesk_core::{NewsConfig, NewsService, QueryError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Helpers ──────────────────────────────────────────────────────────

fn now() -> NaiveDateTime {
    ts("2024-06-10 12:00:00")
}

fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, PUBLISH_TIME_FORMAT).unwrap()
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

fn raw(title: &str, body: Option<&str>, at: &str) -> RawRecord {
    RawRecord {
        title: title.into(),
        body: body.map(String::from),
        publish_time: at.into(),
        source: "Securities Daily".into(),
        url: format!("https://news.example.com/{}", title.replace(' ', "-")),
    }
}

fn valid_records(n: usize) -> Vec<RawRecord> {
    (0..n)
        .map(|i| {
            raw(
                &format!("Headline number {i}"),
                Some(&format!("Body text of article {i}")),
                &format!("2024-06-{:02} 0{}:00:00", 9 - (i % 5), i % 10),
            )
        })
        .collect()
}

fn cached_item(title: &str, at: &str) -> NewsItem {
    NewsItem {
        title: title.into(),
        content: format!("{title} with enough body"),
        publish_time: ts(at),
        source: "Cache".into(),
        url: String::new(),
    }
}

fn config(valid_days: u32) -> NewsConfig {
    NewsConfig {
        cache_valid_days: valid_days,
        ..NewsConfig::default()
    }
}

/// Source replaying a fixed answer and counting calls.
struct ScriptedSource {
    answer: Mutex<Result<Vec<RawRecord>, String>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedSource {
    fn ok(records: Vec<RawRecord>) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Ok(records)),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Err(message.to_string())),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        })
    }

    fn slow(records: Vec<RawRecord>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Ok(records)),
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl NewsSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch(&self, _security_id: &str) -> Result<Vec<RawRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        match &*self.answer.lock().unwrap() {
            Ok(records) => Ok(records.clone()),
            Err(message) => Err(SourceError::NetworkUnreachable(message.clone())),
        }
    }
}

/// Store whose writes always fail.
struct ReadOnlyStore(MemoryStore);

impl NewsStore for ReadOnlyStore {
    fn name(&self) -> &str {
        "read_only"
    }

    fn read(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        self.0.read(key)
    }

    fn write(&self, _key: &str, _record: &CacheRecord) -> Result<(), CacheError> {
        Err(CacheError::Write {
            path: "/read-only/600519.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "read-only filesystem"),
        })
    }
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn empty_source_writes_empty_record_and_always_refetches() {
    let source = ScriptedSource::ok(vec![]);
    let store = Arc::new(MemoryStore::new());
    let service = NewsService::new(source.clone(), store.clone(), &config(7));
    let query = NewsQuery::new("600519", 7, 5).unwrap();

    let first = service.get_news_at(&query, now());
    assert!(first.items.is_empty());
    assert_eq!(first.origin, NewsOrigin::Source);
    assert_eq!(store.get("600519"), Some(CacheRecord::new(day(10), vec![])));

    let second = service.get_news_at(&query, now());
    assert!(second.items.is_empty());
    assert_eq!(source.calls(), 2, "an empty snapshot never satisfies a query");
}

#[test]
fn records_older_than_lookback_are_all_discarded() {
    let source = ScriptedSource::ok(vec![
        raw("Old headline number one", None, "2024-05-01 10:00:00"),
        raw("Old headline number two", None, "2024-05-20 10:00:00"),
        raw("Old headline number three", None, "2024-06-02 10:00:00"),
    ]);
    let service = NewsService::new(source, MemoryStore::new(), &config(7));

    let report = service.get_news_at(&NewsQuery::new("600519", 7, 10).unwrap(), now());
    assert!(report.items.is_empty());
    assert_eq!(report.rejected, 3);
}

#[test]
fn empty_body_falls_back_to_title() {
    let source = ScriptedSource::ok(vec![raw("Twelve chars", Some(""), "2024-06-09 10:00:00")]);
    let service = NewsService::new(source, MemoryStore::new(), &config(7));

    let report = service.get_news_at(&NewsQuery::new("600519", 7, 10).unwrap(), now());
    assert_eq!(report.items.len(), 1);
    assert_eq!(report.items[0].content, "Twelve chars");
}

#[test]
fn cap_stops_early_then_sorts_newest_first() {
    let source = ScriptedSource::ok(vec![
        raw("Older of the first two", None, "2024-06-05 10:00:00"),
        raw("Newer of the first two", None, "2024-06-09 10:00:00"),
        raw("Newest overall but third", None, "2024-06-10 11:00:00"),
        raw("Fourth record in the batch", None, "2024-06-08 10:00:00"),
        raw("Fifth record in the batch", None, "2024-06-07 10:00:00"),
    ]);
    let service = NewsService::new(source, MemoryStore::new(), &config(7));

    let report = service.get_news_at(&NewsQuery::new("600519", 7, 2).unwrap(), now());
    let titles: Vec<&str> = report.items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, ["Newer of the first two", "Older of the first two"]);
}

#[test]
fn sufficient_cache_hit_skips_source_and_lookback() {
    let source = ScriptedSource::ok(valid_records(5));
    let store = Arc::new(MemoryStore::new());
    let cached = vec![
        cached_item("Cached one", "2024-05-05 10:00:00"),
        cached_item("Cached two", "2024-05-04 10:00:00"),
        cached_item("Cached three", "2024-05-03 10:00:00"),
        cached_item("Cached four", "2024-05-02 10:00:00"),
        cached_item("Cached five", "2024-05-01 10:00:00"),
    ];
    store.insert("600519", CacheRecord::new(day(8), cached.clone()));
    let service = NewsService::new(source.clone(), store, &config(7));

    // lookback of 1 day would reject every cached item on a fresh fetch
    let report = service.get_news_at(&NewsQuery::new("600519", 1, 3).unwrap(), now());

    assert_eq!(report.origin, NewsOrigin::Cache);
    assert_eq!(report.items, cached[..3].to_vec());
    assert_eq!(source.calls(), 0);
}

#[test]
fn repeated_query_hits_cache_and_is_identical() {
    let source = ScriptedSource::ok(valid_records(5));
    let service = NewsService::new(source.clone(), MemoryStore::new(), &config(1));
    let query = NewsQuery::new("600519", 7, 3).unwrap();

    let first = service.get_news_at(&query, now());
    let second = service.get_news_at(&query, now());

    assert_eq!(first.origin, NewsOrigin::Source);
    assert_eq!(second.origin, NewsOrigin::Cache);
    assert_eq!(first.items, second.items);
    assert_eq!(first.items.len(), 3);
    assert_eq!(source.calls(), 1);
}

#[test]
fn insufficient_cache_refetches() {
    let source = ScriptedSource::ok(valid_records(5));
    let store = Arc::new(MemoryStore::new());
    store.insert(
        "600519",
        CacheRecord::new(
            day(10),
            vec![
                cached_item("Cached one", "2024-06-09 10:00:00"),
                cached_item("Cached two", "2024-06-08 10:00:00"),
            ],
        ),
    );
    let service = NewsService::new(source.clone(), store.clone(), &config(7));

    let report = service.get_news_at(&NewsQuery::new("600519", 7, 3).unwrap(), now());

    assert_eq!(report.origin, NewsOrigin::Source);
    assert_eq!(report.items.len(), 3);
    assert_eq!(source.calls(), 1);
    assert_eq!(store.get("600519").unwrap().items, report.items);
}

#[test]
fn stale_cache_refetches() {
    let source = ScriptedSource::ok(valid_records(5));
    let store = Arc::new(MemoryStore::new());
    store.insert(
        "600519",
        CacheRecord::new(
            day(1),
            (0..5)
                .map(|i| cached_item(&format!("Cached {i}"), "2024-05-30 10:00:00"))
                .collect(),
        ),
    );
    let service = NewsService::new(source.clone(), store.clone(), &config(7));

    let report = service.get_news_at(&NewsQuery::new("600519", 7, 3).unwrap(), now());

    assert_eq!(report.origin, NewsOrigin::Source);
    assert_eq!(source.calls(), 1);
    assert_eq!(store.get("600519").unwrap().cached_at, day(10));
}

#[test]
fn source_failure_returns_empty_and_leaves_cache_alone() {
    let source = ScriptedSource::failing("connection refused");
    let store = Arc::new(MemoryStore::new());
    let stale = CacheRecord::new(day(1), vec![cached_item("Cached one", "2024-05-30 10:00:00")]);
    store.insert("600519", stale.clone());
    let service = NewsService::new(source, store.clone(), &config(1));

    let report = service.get_news_at(&NewsQuery::new("600519", 7, 3).unwrap(), now());

    assert!(report.items.is_empty());
    assert_eq!(report.origin, NewsOrigin::SourceFailed);
    assert!(matches!(
        report.source_error,
        Some(SourceError::NetworkUnreachable(_))
    ));
    assert_eq!(store.get("600519"), Some(stale));
}

#[test]
fn corrupt_cache_file_is_refetched_and_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    std::fs::write(store.record_path("600519"), r#"{"date": "2024-06-10", "news": [{"title": 1}]}"#)
        .unwrap();
    let source = ScriptedSource::ok(valid_records(4));
    let service = NewsService::new(source.clone(), store.clone(), &config(7));

    let report = service.get_news_at(&NewsQuery::new("600519", 7, 3).unwrap(), now());

    assert_eq!(report.items.len(), 3);
    assert!(matches!(report.cache_read_error, Some(CacheError::Corrupt { .. })));
    assert!(report.cache_write_error.is_none());
    assert_eq!(store.read("600519").unwrap().unwrap().items, report.items);
}

#[test]
fn cache_write_failure_still_returns_items() {
    let source = ScriptedSource::ok(valid_records(4));
    let service = NewsService::new(source, ReadOnlyStore(MemoryStore::new()), &config(7));

    let report = service.get_news_at(&NewsQuery::new("600519", 7, 3).unwrap(), now());

    assert_eq!(report.items.len(), 3);
    assert_eq!(report.origin, NewsOrigin::Source);
    assert!(report.cache_write_error.as_ref().is_some_and(CacheError::is_write));
}

#[test]
fn invalid_queries_fail_fast() {
    let source = ScriptedSource::ok(valid_records(3));
    let service = NewsService::new(source.clone(), MemoryStore::new(), &config(7));

    assert_eq!(service.get_news("600519", 7, 0), Err(QueryError::ZeroMaxItems));
    assert_eq!(service.get_news("600519", 0, 5), Err(QueryError::ZeroLookback));
    assert_eq!(service.get_news("   ", 7, 5), Err(QueryError::EmptySecurityId));
    assert_eq!(source.calls(), 0);
}

#[test]
fn default_query_uses_configured_thresholds() {
    let cfg = NewsConfig {
        default_lookback_days: 3,
        default_max_items: 4,
        ..NewsConfig::default()
    };
    let service = NewsService::new(ScriptedSource::ok(vec![]), MemoryStore::new(), &cfg);

    let query = service.default_query(" 600519 ").unwrap();
    assert_eq!(query.security_id(), "600519");
    assert_eq!(query.lookback_days(), 3);
    assert_eq!(query.max_items(), 4);
}

#[test]
fn get_news_uses_wall_clock() {
    let recent = (chrono::Local::now().naive_local() - chrono::Duration::hours(1))
        .format(PUBLISH_TIME_FORMAT)
        .to_string();
    let ancient = "2001-01-01 00:00:00";
    let source = ScriptedSource::ok(vec![
        raw("Posted an hour ago today", None, &recent),
        raw("Posted a long time ago", None, ancient),
    ]);
    let service = NewsService::new(source, MemoryStore::new(), &config(1));

    let items = service.get_news("600519", 2, 5).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Posted an hour ago today");
}

#[test]
fn concurrent_misses_for_one_key_fetch_once() {
    let source = ScriptedSource::slow(valid_records(5), Duration::from_millis(50));
    let service = Arc::new(NewsService::new(source.clone(), MemoryStore::new(), &config(1)));
    let query = NewsQuery::new("600519", 7, 3).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            let query = query.clone();
            std::thread::spawn(move || service.get_news_at(&query, now()).items)
        })
        .collect();
    let results: Vec<Vec<NewsItem>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(source.calls(), 1);
    for items in &results {
        assert_eq!(items, &results[0]);
    }
}

#[test]
fn distinct_keys_do_not_share_cache() {
    let source = ScriptedSource::ok(valid_records(5));
    let service = NewsService::new(source.clone(), MemoryStore::new(), &config(1));

    service.get_news_at(&NewsQuery::new("600519", 7, 3).unwrap(), now());
    service.get_news_at(&NewsQuery::new("000858", 7, 3).unwrap(), now());

    assert_eq!(source.calls(), 2);
}

#[test]
fn file_backed_pipeline_writes_durable_layout() {
    let dir = tempfile::tempdir().unwrap();
    let feed_dir = dir.path().join("feed");
    let cache_dir = dir.path().join("cache");
    std::fs::create_dir_all(&feed_dir).unwrap();
    std::fs::write(
        feed_dir.join("600519.json"),
        serde_json::to_string(&vec![
            raw("Annual report published today", None, "2024-06-10 08:00:00"),
            raw(
                "Dividend plan announced",
                Some("Board proposes a cash dividend"),
                "2024-06-09 15:30:00",
            ),
            raw("tiny", None, "2024-06-09 15:00:00"),
        ])
        .unwrap(),
    )
    .unwrap();

    let cfg = NewsConfig {
        cache_dir: cache_dir.clone(),
        ..config(1)
    };
    let store = JsonFileStore::new(&cfg.cache_dir);
    let service = NewsService::new(FileSource::new(&feed_dir), store, &cfg);
    let report = service.get_news_at(&NewsQuery::new("600519", 7, 10).unwrap(), now());
    assert_eq!(report.items.len(), 2);
    assert_eq!(report.rejected, 1);

    let text = std::fs::read_to_string(cache_dir.join("600519.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    let obj = value.as_object().unwrap();
    assert_eq!(obj.len(), 2);
    assert_eq!(obj["date"], "2024-06-10");
    assert_eq!(obj["news"][0]["publish_time"], "2024-06-10 08:00:00");
    assert_eq!(obj["news"][1]["content"], "Board proposes a cash dividend");
}

#[test]
fn unknown_security_in_file_source_is_soft_failure() {
    let dir = tempfile::tempdir().unwrap();
    let service = NewsService::new(FileSource::new(dir.path()), MemoryStore::new(), &config(1));

    let report = service.get_news_at(&NewsQuery::new("999999", 7, 3).unwrap(), now());
    assert!(report.items.is_empty());
    assert!(matches!(report.source_error, Some(SourceError::NotFound { .. })));
}

#[test]
fn malformed_feed_entry_skips_only_that_entry() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("600519.json"),
        r#"[
            {"title": "Annual report published today", "publish_time": "2024-06-10 08:00:00"},
            {"title": "Entry without a timestamp", "body": "Should not sink the batch"},
            {"title": "Dividend plan announced", "publish_time": 20240609}
        ]"#,
    )
    .unwrap();
    let service = NewsService::new(FileSource::new(dir.path()), MemoryStore::new(), &config(1));

    let report = service.get_news_at(&NewsQuery::new("600519", 7, 10).unwrap(), now());
    assert_eq!(report.origin, NewsOrigin::Source);
    assert!(report.source_error.is_none());
    assert_eq!(report.items.len(), 1);
    assert_eq!(report.items[0].title, "Annual report published today");
}

#[test]
fn unbounded_lookback_accepts_old_news() {
    let source = ScriptedSource::ok(vec![raw(
        "Listing day announcement",
        None,
        "2001-08-27 09:30:00",
    )]);
    let service = NewsService::new(source, MemoryStore::new(), &config(1));

    let report = service.get_news_at(&NewsQuery::new("600519", u32::MAX, 5).unwrap(), now());
    assert_eq!(report.items.len(), 1);
    assert_eq!(report.items[0].title, "Listing day announcement");
}
