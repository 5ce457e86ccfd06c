use std::collections::HashMap;

use log::debug;
use reqwest::Client;

use crate::error::{Error, Result};
use crate::models::PriceQuote;

/// Lightweight CoinGecko client for symbols the W-Chain oracle does not
/// quote (USDT, USDC, BTC, ...). Symbols map to CoinGecko ids via config.
#[derive(Debug, Clone)]
pub struct ReferenceClient {
    client: Client,
    base_url: String,
    ids: HashMap<String, String>,
}

impl ReferenceClient {
    pub fn new(client: Client, base_url: String, ids: HashMap<String, String>) -> Self {
        // Normalize once so lookups are case-insensitive.
        let ids = ids
            .into_iter()
            .map(|(symbol, id)| (symbol.to_uppercase(), id))
            .collect();
        Self { client, base_url, ids }
    }

    pub fn knows(&self, symbol: &str) -> bool {
        self.ids.contains_key(&symbol.to_uppercase())
    }

    pub async fn get_price(&self, symbol: &str) -> Result<PriceQuote> {
        let symbol = symbol.to_uppercase();
        let id = self.ids.get(&symbol).ok_or_else(|| {
            Error::InvalidResponse(format!("no reference feed mapping for {}", symbol))
        })?;

        let url = format!("{}/simple/price", self.base_url);
        debug!("reference: fetching {} as {}", symbol, id);

        let payload: HashMap<String, HashMap<String, f64>> = self
            .client
            .get(&url)
            .query(&[("ids", id.as_str()), ("vs_currencies", "usd")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let price_usd = payload
            .get(id)
            .and_then(|quotes| quotes.get("usd"))
            .copied()
            .ok_or_else(|| {
                Error::InvalidResponse(format!("reference feed returned no usd quote for {}", symbol))
            })?;

        Ok(PriceQuote { symbol, price_usd, last_updated: None })
    }
}
