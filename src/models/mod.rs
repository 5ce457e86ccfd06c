use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Spot quote for a single token symbol, in USD.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub symbol: String,
    pub price_usd: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Supply components in token base units, derived from one multicall batch.
/// `circulating = total - locked - burned`; construction goes through
/// `services::supply::derive_snapshot` which enforces the invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplySnapshot {
    pub total: u128,
    pub locked: u128,
    pub burned: u128,
    pub circulating: u128,
    pub fetched_at: DateTime<Utc>,
}

/// Supply split as percentages of total, for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distribution {
    pub circulating_pct: f64,
    pub locked_pct: f64,
    pub burned_pct: f64,
}

/// Chain-global ordering key for a log event. Ordering is lexicographic on
/// `(block_number, log_index)`, which matches on-chain emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct EventPosition {
    pub block_number: u64,
    pub log_index: u64,
}

impl EventPosition {
    pub fn new(block_number: u64, log_index: u64) -> Self {
        Self { block_number, log_index }
    }

    /// Position after every log of `block_number`; used to express
    /// "start strictly after this block".
    pub fn end_of_block(block_number: u64) -> Self {
        Self { block_number, log_index: u64::MAX }
    }
}

/// A token transfer observed on chain, identified by `(tx_hash, log_index)`.
/// Amounts stay in integer base units until formatting time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub tx_hash: String,
    pub block_number: u64,
    pub log_index: u64,
    pub token_address: String,
    pub from: String,
    pub to: String,
    pub amount: u128,
    pub timestamp: Option<DateTime<Utc>>,
}

impl TransferEvent {
    pub fn position(&self) -> EventPosition {
        EventPosition::new(self.block_number, self.log_index)
    }
}

/// Subset of the explorer's network stats that the bot reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkStats {
    pub total_blocks: Option<u64>,
    pub total_transactions: Option<u64>,
    pub total_addresses: Option<u64>,
    pub average_block_time_ms: Option<f64>,
    pub gas_price_gwei: Option<GasPrices>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GasPrices {
    pub slow: Option<f64>,
    pub average: Option<f64>,
    pub fast: Option<f64>,
}

/// Outcome of one alert broadcast across the subscriber set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub blocked: usize,
    pub dropped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_positions_order_by_block_then_log() {
        let a = EventPosition::new(10, 5);
        let b = EventPosition::new(10, 6);
        let c = EventPosition::new(11, 0);
        assert!(a < b);
        assert!(b < c);
        assert!(EventPosition::end_of_block(10) < c);
        assert!(EventPosition::end_of_block(10) > b);
    }
}
