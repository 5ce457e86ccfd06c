use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use crate::api::{ExplorerClient, OracleClient, ReferenceClient};
use crate::error::{Error, Result};
use crate::models::{NetworkStats, PriceQuote};
use crate::utils::TtlCache;

// Symbols quoted natively by the W-Chain oracle; everything else goes to the
// reference feed.
const ORACLE_SYMBOLS: &[&str] = &["WCO", "WAVE"];

const STATS_CACHE_KEY: &str = "network:stats";

/// Best-effort price access for alert enrichment; a miss degrades the alert
/// text, it never fails the caller.
#[async_trait]
pub trait PriceLookup: Send + Sync {
    async fn usd_price(&self, symbol: &str) -> Option<f64>;
}

/// Command-facing reads: per-symbol price quotes and the network stats
/// snapshot, each memoized through the coalescing cache so a burst of
/// concurrent commands costs one upstream call per key.
pub struct AnalyticsService {
    oracle: OracleClient,
    reference: ReferenceClient,
    explorer: ExplorerClient,
    price_cache: TtlCache<PriceQuote>,
    stats_cache: TtlCache<NetworkStats>,
    price_ttl: Duration,
    stats_ttl: Duration,
}

impl AnalyticsService {
    pub fn new(
        oracle: OracleClient,
        reference: ReferenceClient,
        explorer: ExplorerClient,
        price_ttl: Duration,
        stats_ttl: Duration,
    ) -> Self {
        Self {
            oracle,
            reference,
            explorer,
            price_cache: TtlCache::new(),
            stats_cache: TtlCache::new(),
            price_ttl,
            stats_ttl,
        }
    }

    pub async fn get_price(&self, symbol: &str) -> Result<PriceQuote> {
        let symbol = symbol.to_uppercase();
        let key = format!("price:{}", symbol);

        if ORACLE_SYMBOLS.contains(&symbol.as_str()) {
            let oracle = self.oracle.clone();
            self.price_cache
                .get_or_fetch(&key, self.price_ttl, move || async move {
                    oracle.get_price(&symbol).await
                })
                .await
        } else if self.reference.knows(&symbol) {
            let reference = self.reference.clone();
            self.price_cache
                .get_or_fetch(&key, self.price_ttl, move || async move {
                    reference.get_price(&symbol).await
                })
                .await
        } else {
            Err(Error::InvalidResponse(format!("unknown token symbol: {}", symbol)))
        }
    }

    pub async fn get_stats(&self) -> Result<NetworkStats> {
        let explorer = self.explorer.clone();
        self.stats_cache
            .get_or_fetch(STATS_CACHE_KEY, self.stats_ttl, move || async move {
                explorer.network_stats().await
            })
            .await
    }
}

#[async_trait]
impl PriceLookup for AnalyticsService {
    async fn usd_price(&self, symbol: &str) -> Option<f64> {
        match self.get_price(symbol).await {
            Ok(quote) => Some(quote.price_usd),
            Err(e) => {
                debug!("price lookup for {} failed: {}", symbol, e);
                None
            }
        }
    }
}
