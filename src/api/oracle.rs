use chrono::{DateTime, Utc};
use log::debug;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::PriceQuote;

/// Client for the W-Chain price oracle, one numeric quote per token symbol.
#[derive(Debug, Clone)]
pub struct OracleClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct OracleQuoteDto {
    price: serde_json::Value,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

impl OracleQuoteDto {
    // The oracle has been observed returning the price both as a JSON number
    // and as a decimal string.
    fn price_usd(&self) -> Option<f64> {
        match &self.price {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl OracleClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    pub async fn get_price(&self, symbol: &str) -> Result<PriceQuote> {
        let symbol = symbol.to_uppercase();
        let url = format!("{}/api/price/{}", self.base_url, symbol.to_lowercase());
        debug!("oracle: fetching {}", url);

        let dto: OracleQuoteDto = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let price_usd = dto.price_usd().ok_or_else(|| {
            Error::InvalidResponse(format!("oracle quote for {} has no usable price", symbol))
        })?;
        if price_usd < 0.0 {
            return Err(Error::InvalidResponse(format!(
                "oracle quote for {} is negative: {}",
                symbol, price_usd
            )));
        }

        Ok(PriceQuote { symbol, price_usd, last_updated: dto.last_updated })
    }
}
