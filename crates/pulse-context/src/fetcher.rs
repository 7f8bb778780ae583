//! Source fetchers.
//!
//! A fetcher performs one bounded-time retrieval for one source. The
//! deadline is enforced with `tokio::time::timeout`, which drops the
//! in-flight future on expiry: the HTTP request (or cache read) is cancelled
//! and its connection released without affecting sibling fetches.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use pulse_core::{CallerIdentity, Record, SourceKind, SourceResult};
use pulse_storage::CacheStore;

use crate::error::SourceError;

/// One business-data source.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Which snapshot slot this source fills.
    fn kind(&self) -> SourceKind;

    /// Upper bound on how long a single load may take.
    fn deadline(&self) -> Duration;

    /// Retrieve every record the source holds for `caller`.
    async fn load(&self, caller: &CallerIdentity) -> Result<Vec<Record>, SourceError>;
}

/// Run one fetch attempt under the source's deadline.
///
/// Never fails: timeouts and errors are logged and reported as
/// [`SourceResult::failed`].
pub async fn fetch(source: &dyn SourceFetcher, caller: &CallerIdentity) -> SourceResult {
    let kind = source.kind();
    let deadline = source.deadline();
    let started = Instant::now();

    let outcome = match tokio::time::timeout(deadline, source.load(caller)).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout {
            kind,
            after_ms: deadline.as_millis(),
        }),
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(items) => {
            debug!(source = %kind, count = items.len(), elapsed_ms, "Source fetched");
            SourceResult::from_items(items)
        }
        Err(e) => {
            warn!(
                source = %kind,
                timeout = e.is_timeout(),
                elapsed_ms,
                error = %e,
                "Source fetch failed"
            );
            SourceResult::failed()
        }
    }
}

/// Parse an upstream payload into records.
///
/// Accepts a JSON array, an empty body, or an object carrying the array
/// under `data` or `items`. Array elements that are not objects are skipped.
pub(crate) fn parse_records(kind: SourceKind, body: &[u8]) -> Result<Vec<Record>, SourceError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| SourceError::unavailable(kind, format!("invalid JSON: {}", e)))?;

    let array = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data").or_else(|| map.remove("items")) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(SourceError::unavailable(
                    kind,
                    "expected a JSON array of records",
                ))
            }
        },
        Value::Null => Vec::new(),
        _ => {
            return Err(SourceError::unavailable(
                kind,
                "expected a JSON array of records",
            ))
        }
    };

    let total = array.len();
    let records: Vec<Record> = array.into_iter().filter_map(Record::from_value).collect();
    if records.len() < total {
        debug!(source = %kind, skipped = total - records.len(), "Skipped non-object records");
    }
    Ok(records)
}

// =============================================================================
// HttpSource
// =============================================================================

/// Network-backed source: `GET <endpoint>?callerId=<id>`.
pub struct HttpSource {
    kind: SourceKind,
    client: reqwest::Client,
    endpoint: String,
    deadline: Duration,
}

impl HttpSource {
    pub fn new(
        kind: SourceKind,
        client: reqwest::Client,
        endpoint: impl Into<String>,
        deadline: Duration,
    ) -> Self {
        Self {
            kind,
            client,
            endpoint: endpoint.into(),
            deadline,
        }
    }
}

#[async_trait]
impl SourceFetcher for HttpSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn deadline(&self) -> Duration {
        self.deadline
    }

    async fn load(&self, caller: &CallerIdentity) -> Result<Vec<Record>, SourceError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("callerId", caller.id)])
            .send()
            .await
            .map_err(|e| SourceError::unavailable(self.kind, format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::unavailable(
                self.kind,
                format!("HTTP {}", status.as_u16()),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::unavailable(self.kind, format!("body read failed: {}", e)))?;

        parse_records(self.kind, &body)
    }
}

// =============================================================================
// CacheSource
// =============================================================================

/// Cache-backed source reading a pre-computed listing by key.
///
/// A missing key is an empty listing, not a failure.
pub struct CacheSource {
    kind: SourceKind,
    cache: Arc<dyn CacheStore>,
    key: String,
    deadline: Duration,
}

impl CacheSource {
    pub fn new(
        kind: SourceKind,
        cache: Arc<dyn CacheStore>,
        key: impl Into<String>,
        deadline: Duration,
    ) -> Self {
        Self {
            kind,
            cache,
            key: key.into(),
            deadline,
        }
    }
}

#[async_trait]
impl SourceFetcher for CacheSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn deadline(&self) -> Duration {
        self.deadline
    }

    async fn load(&self, _caller: &CallerIdentity) -> Result<Vec<Record>, SourceError> {
        let value = self
            .cache
            .get(&self.key)
            .await
            .map_err(|e| SourceError::unavailable(self.kind, e.to_string()))?;

        match value {
            Some(raw) => parse_records(self.kind, raw.as_bytes()),
            None => {
                debug!(source = %self.kind, key = %self.key, "Cache miss");
                Ok(Vec::new())
            }
        }
    }
}
