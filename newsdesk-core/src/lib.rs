//! Newsdesk Core: per-security news retrieval with a dated local cache.
//!
//! - News sources behind the [`NewsSource`](news::NewsSource) trait
//!   (Eastmoney over HTTP, JSON files for offline use)
//! - Normalization: recency cutoff, body/title fallback, minimum content
//!   length, early stop at the item cap
//! - Cache: one JSON snapshot per security, judged stale by its date
//! - [`NewsService`](news::NewsService): cache-or-fetch orchestration

pub mod config;
pub mod news;

pub use config::{ConfigError, NewsConfig, SourceConfig};
pub use news::{NewsItem, NewsQuery, NewsReport, NewsService, QueryError};
