//! Aggregation engine.
//!
//! Runs every source concurrently and merges whatever settles into one
//! [`ContextSnapshot`]. The join waits for all fetches rather than stopping at
//! the first failure; each fetch carries its own deadline, so the whole call
//! is bounded by the largest deadline across sources.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{info, warn};

use pulse_core::config::{DisplayCaps, SourcesConfig};
use pulse_core::{CallerIdentity, ContextSnapshot, SourceKind};
use pulse_storage::CacheStore;

use crate::fetcher::{fetch, CacheSource, HttpSource, SourceFetcher};

pub struct Aggregator {
    sources: Vec<Arc<dyn SourceFetcher>>,
    caps: DisplayCaps,
}

impl Aggregator {
    pub fn new(sources: Vec<Arc<dyn SourceFetcher>>, caps: DisplayCaps) -> Self {
        Self { sources, caps }
    }

    /// Wire the four standard sources: leads and orders over HTTP, partners
    /// and products from the cache.
    pub fn from_config(
        config: &SourcesConfig,
        cache: Arc<dyn CacheStore>,
        client: reqwest::Client,
    ) -> Self {
        let sources: Vec<Arc<dyn SourceFetcher>> = vec![
            Arc::new(HttpSource::new(
                SourceKind::Leads,
                client.clone(),
                config.leads_url.clone(),
                config.timeout(),
            )),
            Arc::new(CacheSource::new(
                SourceKind::Partners,
                cache.clone(),
                config.partners_cache_key.clone(),
                config.cache_timeout(),
            )),
            Arc::new(CacheSource::new(
                SourceKind::Products,
                cache,
                config.products_cache_key.clone(),
                config.cache_timeout(),
            )),
            Arc::new(HttpSource::new(
                SourceKind::Orders,
                client,
                config.orders_url.clone(),
                config.timeout(),
            )),
        ];
        Self::new(sources, config.caps.clone())
    }

    /// Largest deadline across sources; an upper bound for [`aggregate`](Self::aggregate).
    pub fn max_deadline(&self) -> Duration {
        self.sources
            .iter()
            .map(|s| s.deadline())
            .max()
            .unwrap_or_default()
    }

    /// Collect a snapshot for `caller`. Never fails.
    ///
    /// Slots without a configured source stay at their default (`ok = false`).
    pub async fn aggregate(&self, caller: &CallerIdentity) -> ContextSnapshot {
        let started = Instant::now();

        let fetches = self.sources.iter().map(|source| {
            let source = Arc::clone(source);
            async move {
                let result = fetch(source.as_ref(), caller).await;
                (source.kind(), result)
            }
        });
        let settled = join_all(fetches).await;

        let mut snapshot = ContextSnapshot::default();
        for (kind, mut result) in settled {
            result.truncate(self.caps.cap(kind));
            snapshot.set(kind, result);
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let failed = snapshot.failed_sources();
        if snapshot.has_any_data() {
            info!(
                caller_id = caller.id,
                leads = snapshot.leads.total,
                partners = snapshot.partners.total,
                products = snapshot.products.total,
                orders = snapshot.orders.total,
                failed,
                elapsed_ms,
                "Context aggregated"
            );
        } else {
            warn!(
                caller_id = caller.id,
                failed, elapsed_ms, "Context aggregated without any data"
            );
        }

        snapshot
    }
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<SourceKind> = self.sources.iter().map(|s| s.kind()).collect();
        f.debug_struct("Aggregator")
            .field("sources", &kinds)
            .field("caps", &self.caps)
            .finish()
    }
}
