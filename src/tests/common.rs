use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::api::TransferSource;
use crate::config::{
    BurnWatchConfig, CacheConfig, Config, StateConfig, SupplyConfig, TelegramConfig,
    UpstreamConfig,
};
use crate::error::{Error, Result};
use crate::models::TransferEvent;
use crate::services::analytics::PriceLookup;
use crate::telegram::notifier::{AlertSink, DeliveryError};

pub const TEST_TOKEN: &str = "0xd1841fc048b488d92fdf73624a2128d10a847e88";
pub const TEST_BURN_WALLET: &str = "0x000000000000000000000000000000000000dead";

// Helper to create a default test config
pub fn create_test_config() -> Config {
    Config {
        telegram: TelegramConfig { bot_token: "test".to_string() },
        upstream: UpstreamConfig {
            oracle_base: "https://oracle.test".to_string(),
            rpc_url: "https://rpc.test".to_string(),
            explorer_base: "https://scan.test/api/v2".to_string(),
            reference_base: "https://api.coingecko.test/api/v3".to_string(),
            coingecko_ids: HashMap::from([
                ("USDT".to_string(), "tether".to_string()),
                ("USDC".to_string(), "usd-coin".to_string()),
            ]),
            http_timeout_secs: 12,
        },
        cache: CacheConfig { price_ttl_secs: 60, supply_ttl_secs: 120, stats_ttl_secs: 45 },
        supply: SupplyConfig {
            token_symbol: "WCO".to_string(),
            token_decimals: 18,
            token_contract: TEST_TOKEN.to_string(),
            locked_wallets: vec![
                "0x81d29c0dcd64fac05c4a394d455cbd79d210c200".to_string(),
                "0x42abfb13b4e3d25407ffa9705146b7cb812404a0".to_string(),
            ],
            burn_wallet: TEST_BURN_WALLET.to_string(),
        },
        burn_watch: burn_config(),
        state: StateConfig { dir: PathBuf::from("/tmp/wchain-bot-test") },
    }
}

pub fn burn_config() -> BurnWatchConfig {
    BurnWatchConfig {
        enabled: true,
        token_symbol: "WCO".to_string(),
        token_decimals: 18,
        token_contract: TEST_TOKEN.to_string(),
        burn_wallet: TEST_BURN_WALLET.to_string(),
        poll_secs: 30,
        min_amount_tokens: 0,
        start_block: None,
    }
}

/// Transfer of `tokens` whole tokens into the burn wallet.
pub fn transfer(tx_hash: &str, block_number: u64, log_index: u64, tokens: u64) -> TransferEvent {
    TransferEvent {
        tx_hash: tx_hash.to_string(),
        block_number,
        log_index,
        token_address: TEST_TOKEN.to_string(),
        from: "0xfeedface00000000000000000000000000000001".to_string(),
        to: TEST_BURN_WALLET.to_string(),
        amount: tokens as u128 * 1_000_000_000_000_000_000,
        timestamp: None,
    }
}

enum Script {
    Batches(VecDeque<Vec<TransferEvent>>),
    Repeating(Vec<TransferEvent>),
    Failing,
}

/// Transfer source returning canned batches: one per call, a repeated
/// window, or a permanent upstream failure.
pub struct ScriptedSource {
    script: Mutex<Script>,
}

impl ScriptedSource {
    pub fn new(batches: Vec<Vec<TransferEvent>>) -> Self {
        Self { script: Mutex::new(Script::Batches(batches.into())) }
    }

    pub fn repeating(events: Vec<TransferEvent>) -> Self {
        Self { script: Mutex::new(Script::Repeating(events)) }
    }

    pub fn failing() -> Self {
        Self { script: Mutex::new(Script::Failing) }
    }
}

#[async_trait]
impl TransferSource for ScriptedSource {
    async fn transfers_to(
        &self,
        _token_address: &str,
        _wallet: &str,
        _from_block: Option<u64>,
    ) -> Result<Vec<TransferEvent>> {
        let mut script = self.script.lock().await;
        match &mut *script {
            Script::Batches(batches) => Ok(batches.pop_front().unwrap_or_default()),
            Script::Repeating(events) => Ok(events.clone()),
            Script::Failing => Err(Error::UpstreamUnavailable("scripted outage".into())),
        }
    }
}

enum FailurePlan {
    Always(DeliveryError),
    Times(u32, DeliveryError),
}

/// Alert sink recording deliveries, with per-chat scripted failures.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(i64, String)>>,
    attempts: Mutex<HashMap<i64, u32>>,
    failures: Mutex<HashMap<i64, FailurePlan>>,
}

impl RecordingSink {
    pub async fn fail_with(&self, chat_id: i64, err: DeliveryError) {
        self.failures.lock().await.insert(chat_id, FailurePlan::Always(err));
    }

    pub async fn fail_n_times(&self, chat_id: i64, times: u32, err: DeliveryError) {
        self.failures.lock().await.insert(chat_id, FailurePlan::Times(times, err));
    }

    pub async fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().await.clone()
    }

    pub async fn attempts(&self, chat_id: i64) -> u32 {
        self.attempts.lock().await.get(&chat_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn deliver(&self, chat_id: i64, text: &str) -> std::result::Result<(), DeliveryError> {
        *self.attempts.lock().await.entry(chat_id).or_insert(0) += 1;

        let mut failures = self.failures.lock().await;
        match failures.get_mut(&chat_id) {
            Some(FailurePlan::Always(err)) => return Err(err.clone()),
            Some(FailurePlan::Times(remaining, err)) => {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(err.clone());
                }
            }
            None => {}
        }
        drop(failures);

        self.sent.lock().await.push((chat_id, text.to_string()));
        Ok(())
    }
}

/// Price lookup double returning a fixed quote (or none).
pub struct FixedPrice(pub Option<f64>);

#[async_trait]
impl PriceLookup for FixedPrice {
    async fn usd_price(&self, _symbol: &str) -> Option<f64> {
        self.0
    }
}
