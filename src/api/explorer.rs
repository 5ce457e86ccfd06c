use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;

use crate::api::TransferSource;
use crate::error::Result;
use crate::models::{GasPrices, NetworkStats, TransferEvent};

/// Client for the Blockscout-style explorer API: token transfers into a
/// wallet, plus the network stats snapshot.
#[derive(Debug, Clone)]
pub struct ExplorerClient {
    client: Client,
    base_url: String,
}

// The explorer emits numeric fields inconsistently (JSON number in some
// deployments, decimal string in others), so integers go through this.
fn flex_u64<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
struct TransfersPage {
    #[serde(default)]
    items: Vec<TransferDto>,
}

#[derive(Debug, Deserialize)]
struct TransferDto {
    #[serde(alias = "tx_hash")]
    transaction_hash: String,
    #[serde(default, deserialize_with = "flex_u64")]
    block_number: Option<u64>,
    #[serde(default, deserialize_with = "flex_u64")]
    log_index: Option<u64>,
    #[serde(default)]
    from: Option<AddressDto>,
    #[serde(default)]
    to: Option<AddressDto>,
    #[serde(default)]
    token: Option<TokenDto>,
    #[serde(default)]
    total: Option<TotalDto>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct AddressDto {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct TokenDto {
    address: String,
}

#[derive(Debug, Deserialize)]
struct TotalDto {
    value: String,
}

impl TransferDto {
    fn into_event(self, token_address: &str) -> Option<TransferEvent> {
        let block_number = self.block_number?;
        let amount: u128 = match self.total.as_ref().map(|t| t.value.parse()) {
            Some(Ok(amount)) => amount,
            _ => {
                warn!(
                    "explorer: skipping transfer {} with unparsable amount",
                    self.transaction_hash
                );
                return None;
            }
        };
        Some(TransferEvent {
            tx_hash: self.transaction_hash,
            block_number,
            log_index: self.log_index.unwrap_or(0),
            token_address: token_address.to_lowercase(),
            from: self.from.map(|a| a.hash.to_lowercase()).unwrap_or_default(),
            to: self.to.map(|a| a.hash.to_lowercase()).unwrap_or_default(),
            amount,
            timestamp: self.timestamp,
        })
    }

    fn matches_token(&self, token_address: &str) -> bool {
        self.token
            .as_ref()
            .map(|t| t.address.eq_ignore_ascii_case(token_address))
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct StatsDto {
    #[serde(default, deserialize_with = "flex_u64")]
    total_blocks: Option<u64>,
    #[serde(default, deserialize_with = "flex_u64")]
    total_transactions: Option<u64>,
    #[serde(default, deserialize_with = "flex_u64")]
    total_addresses: Option<u64>,
    #[serde(default)]
    average_block_time: Option<f64>,
    #[serde(default)]
    gas_prices: Option<GasPricesDto>,
}

#[derive(Debug, Deserialize)]
struct GasPricesDto {
    #[serde(default)]
    slow: Option<f64>,
    #[serde(default)]
    average: Option<f64>,
    #[serde(default)]
    fast: Option<f64>,
}

impl From<StatsDto> for NetworkStats {
    fn from(dto: StatsDto) -> Self {
        NetworkStats {
            total_blocks: dto.total_blocks,
            total_transactions: dto.total_transactions,
            total_addresses: dto.total_addresses,
            average_block_time_ms: dto.average_block_time,
            gas_price_gwei: dto.gas_prices.map(|g| GasPrices {
                slow: g.slow,
                average: g.average,
                fast: g.fast,
            }),
        }
    }
}

impl ExplorerClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    pub async fn network_stats(&self) -> Result<NetworkStats> {
        let url = format!("{}/stats", self.base_url);
        debug!("explorer: fetching {}", url);
        let dto: StatsDto = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(dto.into())
    }
}

#[async_trait]
impl TransferSource for ExplorerClient {
    async fn transfers_to(
        &self,
        token_address: &str,
        wallet: &str,
        from_block: Option<u64>,
    ) -> Result<Vec<TransferEvent>> {
        let url = format!("{}/addresses/{}/token-transfers", self.base_url, wallet);
        let mut request = self
            .client
            .get(&url)
            .query(&[("filter", "to"), ("token", token_address)]);
        if let Some(from_block) = from_block {
            request = request.query(&[("from_block", from_block.to_string())]);
        }
        debug!("explorer: fetching transfers into {} for {}", wallet, token_address);

        let page: TransfersPage = request.send().await?.error_for_status()?.json().await?;
        let events = page
            .items
            .into_iter()
            // The token filter is also applied server-side; re-checking here
            // keeps a misbehaving explorer from injecting foreign transfers.
            .filter(|dto| dto.matches_token(token_address))
            .filter_map(|dto| dto.into_event(token_address))
            .filter(|event| event.to.eq_ignore_ascii_case(wallet))
            .collect();
        Ok(events)
    }
}
