//! Eastmoney stock news source.
//!
//! Queries the Eastmoney article search (a JSONP endpoint) with the security
//! code as keyword. Handles retries with exponential backoff and jitter, and
//! shares a circuit breaker across calls.
//!
//! The endpoint is undocumented. Highlight markup (`<em>`) and full-width
//! spaces are stripped here so the normalizer sees plain text.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{decode_each, NewsSource, RawRecord, SourceError};
use crate::config::SourceConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const ARTICLE_TYPE: &str = "cmsArticleWebOld";
const CALLBACK: &str = "jQuery_newsdesk";
const ARTICLE_URL_PREFIX: &str = "http://finance.eastmoney.com/a/";
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    result: Option<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(rename = "cmsArticleWebOld", default)]
    articles: Vec<serde_json::Value>,
}

/// One search hit. Any field may be absent or `null`.
#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    date: Option<String>,
    #[serde(rename = "mediaName", default)]
    media_name: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Serialize)]
struct SearchParam<'a> {
    uid: &'a str,
    keyword: &'a str,
    #[serde(rename = "type")]
    kinds: [&'a str; 1],
    client: &'a str,
    #[serde(rename = "clientType")]
    client_type: &'a str,
    #[serde(rename = "clientVersion")]
    client_version: &'a str,
    param: ArticleParam,
}

#[derive(Serialize)]
struct ArticleParam {
    #[serde(rename = "cmsArticleWebOld")]
    articles: ArticleQuery,
}

#[derive(Serialize)]
struct ArticleQuery {
    #[serde(rename = "searchScope")]
    search_scope: &'static str,
    sort: &'static str,
    #[serde(rename = "pageIndex")]
    page_index: u32,
    #[serde(rename = "pageSize")]
    page_size: u32,
    #[serde(rename = "preTag")]
    pre_tag: &'static str,
    #[serde(rename = "postTag")]
    post_tag: &'static str,
}

/// Eastmoney news source.
pub struct EastmoneySource {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    endpoint: String,
    page_size: u32,
    max_retries: u32,
    base_delay: Duration,
}

impl EastmoneySource {
    pub fn new(
        config: &SourceConfig,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| SourceError::Client(e.to_string()))?;

        Ok(Self::with_client(config, circuit_breaker, client))
    }

    fn with_client(
        config: &SourceConfig,
        circuit_breaker: Arc<CircuitBreaker>,
        client: reqwest::blocking::Client,
    ) -> Self {
        Self {
            client,
            circuit_breaker,
            endpoint: config.endpoint.clone(),
            page_size: config.page_size,
            max_retries: config.max_retries,
            base_delay: config.base_delay(),
        }
    }

    /// JSON value of the `param` query parameter.
    fn search_param(security_id: &str, page_size: u32) -> Result<String, SourceError> {
        let param = SearchParam {
            uid: "",
            keyword: security_id,
            kinds: [ARTICLE_TYPE],
            client: "web",
            client_type: "web",
            client_version: "curr",
            param: ArticleParam {
                articles: ArticleQuery {
                    search_scope: "default",
                    sort: "default",
                    page_index: 1,
                    page_size,
                    pre_tag: "<em>",
                    post_tag: "</em>",
                },
            },
        };
        serde_json::to_string(&param)
            .map_err(|e| SourceError::Other(format!("encode search param: {e}")))
    }

    /// Parse a JSONP response body into raw records.
    fn parse_response(security_id: &str, body: &str) -> Result<Vec<RawRecord>, SourceError> {
        let json = strip_jsonp(body).ok_or_else(|| {
            SourceError::ResponseFormatChanged(format!("response for {security_id} is not JSONP"))
        })?;

        let envelope: SearchEnvelope = serde_json::from_str(json).map_err(|e| {
            SourceError::ResponseFormatChanged(format!(
                "failed to parse response for {security_id}: {e}"
            ))
        })?;

        let values = envelope.result.map(|r| r.articles).unwrap_or_default();
        let articles: Vec<Article> = decode_each(security_id, values);
        Ok(articles.into_iter().map(to_raw_record).collect())
    }

    /// Delay before retry `attempt` (1-based), capped at [`MAX_BACKOFF`]
    /// plus up to a quarter of jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let base = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF);
        let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 4);
        base + Duration::from_millis(jitter_ms)
    }

    fn fetch_with_retry(&self, security_id: &str) -> Result<Vec<RawRecord>, SourceError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(SourceError::CircuitBreakerTripped);
        }

        let param = Self::search_param(security_id, self.page_size)?;
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff(attempt);
                debug!(security_id, attempt, ?delay, "retrying news request");
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(SourceError::CircuitBreakerTripped);
            }

            let request = self
                .client
                .get(&self.endpoint)
                .query(&[("cb", CALLBACK), ("param", param.as_str())]);

            match request.send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::FORBIDDEN {
                        self.circuit_breaker.trip();
                        return Err(SourceError::CircuitBreakerTripped);
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        self.circuit_breaker.record_failure();
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        last_error = Some(SourceError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if !status.is_success() {
                        self.circuit_breaker.record_failure();
                        last_error =
                            Some(SourceError::Other(format!("HTTP {status} for {security_id}")));
                        if status.is_server_error() {
                            continue;
                        }
                        break;
                    }

                    let body = resp
                        .text()
                        .map_err(|e| SourceError::NetworkUnreachable(e.to_string()))?;
                    let records = Self::parse_response(security_id, &body)?;
                    self.circuit_breaker.record_success();
                    return Ok(records);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        self.circuit_breaker.record_failure();
                        last_error = Some(SourceError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(SourceError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SourceError::Other("max retries exceeded".into())))
    }
}

impl NewsSource for EastmoneySource {
    fn name(&self) -> &str {
        "eastmoney"
    }

    fn fetch(&self, security_id: &str) -> Result<Vec<RawRecord>, SourceError> {
        self.fetch_with_retry(security_id)
    }
}

/// The JSON between the callback's parentheses.
fn strip_jsonp(body: &str) -> Option<&str> {
    let body = body.trim().trim_end_matches(';');
    let start = body.find('(')?;
    let end = body.rfind(')')?;
    (start < end).then(|| &body[start + 1..end])
}

fn strip_markup(text: &str) -> String {
    text.replace("(<em>", "")
        .replace("</em>)", "")
        .replace("<em>", "")
        .replace("</em>", "")
        .replace('\u{3000}', "")
        .replace("\r\n", "")
}

fn to_raw_record(article: Article) -> RawRecord {
    let code = article.code.unwrap_or_default();
    let url = match article.url.filter(|u| !u.trim().is_empty()) {
        Some(url) => url,
        None if !code.is_empty() => format!("{ARTICLE_URL_PREFIX}{code}.html"),
        None => String::new(),
    };

    RawRecord {
        title: strip_markup(&article.title.unwrap_or_default()),
        body: article.content.map(|c| strip_markup(&c)),
        publish_time: article.date.unwrap_or_default(),
        source: article.media_name.unwrap_or_default(),
        url,
    }
}
