use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub supply: SupplyConfig,
    pub burn_watch: BurnWatchConfig,
    pub state: StateConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TelegramConfig {
    /// Empty string means "read TELEGRAM_BOT_TOKEN from the environment".
    #[serde(default)]
    pub bot_token: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpstreamConfig {
    pub oracle_base: String,
    pub rpc_url: String,
    pub explorer_base: String,
    pub reference_base: String,
    /// CoinGecko ids for symbols the oracle does not quote, e.g. USDT -> tether.
    #[serde(default)]
    pub coingecko_ids: HashMap<String, String>,
    pub http_timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    pub price_ttl_secs: u64,
    pub supply_ttl_secs: u64,
    pub stats_ttl_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SupplyConfig {
    pub token_symbol: String,
    pub token_decimals: u8,
    pub token_contract: String,
    pub locked_wallets: Vec<String>,
    pub burn_wallet: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BurnWatchConfig {
    pub enabled: bool,
    pub token_symbol: String,
    pub token_decimals: u8,
    pub token_contract: String,
    pub burn_wallet: String,
    pub poll_secs: u64,
    /// Alerts fire only for transfers of at least this many whole tokens.
    #[serde(default)]
    pub min_amount_tokens: u64,
    /// Alert on blocks strictly after this one; absent means "start from now".
    #[serde(default)]
    pub start_block: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StateConfig {
    pub dir: PathBuf,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&config_str)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        fs::write(path, config_str)?;
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.http_timeout_secs)
    }

    pub fn price_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.price_ttl_secs)
    }

    pub fn supply_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.supply_ttl_secs)
    }

    pub fn stats_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.stats_ttl_secs)
    }
}
