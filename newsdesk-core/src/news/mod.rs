//! News retrieval and caching.

pub mod cache;
pub mod circuit_breaker;
pub mod eastmoney;
pub mod file_source;
pub mod item;
pub mod normalize;
pub mod provider;
pub mod service;
pub mod store;

pub use cache::{CacheLookup, NewsCache};
pub use circuit_breaker::CircuitBreaker;
pub use eastmoney::EastmoneySource;
pub use file_source::FileSource;
pub use item::{sort_newest_first, CacheRecord, NewsItem, PUBLISH_TIME_FORMAT};
pub use normalize::{
    format_publish_time, NormalizeOutcome, Normalizer, RecordError, MIN_CONTENT_CHARS,
};
pub use provider::{NewsSource, RawRecord, SourceError};
pub use service::{NewsOrigin, NewsQuery, NewsReport, NewsService, QueryError};
pub use store::{CacheError, JsonFileStore, MemoryStore, NewsStore, StoredEntry};
