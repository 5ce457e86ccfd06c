use std::time::Duration;

use chrono::Utc;
use log::error;

use crate::api::rpc::{balance_of_call, total_supply_call, EthCall, RpcClient};
use crate::config::SupplyConfig;
use crate::error::{Error, Result};
use crate::models::{Distribution, SupplySnapshot};
use crate::utils::TtlCache;

const CACHE_KEY: &str = "supply";

/// Derives the snapshot from raw components, enforcing the supply
/// invariants. All arithmetic stays in integer base units; a violation is a
/// data-integrity error, never a silently corrected figure.
pub fn derive_snapshot(total: u128, locked: u128, burned: u128) -> Result<SupplySnapshot> {
    if locked > total {
        return Err(Error::DataIntegrity(format!(
            "locked supply {} exceeds total supply {}",
            locked, total
        )));
    }
    if burned > total {
        return Err(Error::DataIntegrity(format!(
            "burned supply {} exceeds total supply {}",
            burned, total
        )));
    }
    let non_circulating = locked
        .checked_add(burned)
        .filter(|sum| *sum <= total)
        .ok_or_else(|| {
            Error::DataIntegrity(format!(
                "locked {} + burned {} exceeds total supply {}",
                locked, burned, total
            ))
        })?;

    Ok(SupplySnapshot {
        total,
        locked,
        burned,
        circulating: total - non_circulating,
        fetched_at: Utc::now(),
    })
}

pub fn distribution(snapshot: &SupplySnapshot) -> Distribution {
    if snapshot.total == 0 {
        return Distribution { circulating_pct: 0.0, locked_pct: 0.0, burned_pct: 0.0 };
    }
    let total = snapshot.total as f64;
    Distribution {
        circulating_pct: snapshot.circulating as f64 / total * 100.0,
        locked_pct: snapshot.locked as f64 / total * 100.0,
        burned_pct: snapshot.burned as f64 / total * 100.0,
    }
}

/// Supply aggregator: one batched multicall per refresh, cached with its own
/// TTL and coalesced across concurrent command handlers.
pub struct SupplyService {
    rpc: RpcClient,
    config: SupplyConfig,
    cache: TtlCache<SupplySnapshot>,
    ttl: Duration,
}

impl SupplyService {
    pub fn new(rpc: RpcClient, config: SupplyConfig, ttl: Duration) -> Self {
        Self { rpc, config, cache: TtlCache::new(), ttl }
    }

    pub fn config(&self) -> &SupplyConfig {
        &self.config
    }

    pub async fn snapshot(&self) -> Result<SupplySnapshot> {
        let rpc = self.rpc.clone();
        let config = self.config.clone();
        let result = self
            .cache
            .get_or_fetch(CACHE_KEY, self.ttl, move || fetch_snapshot(rpc, config))
            .await;
        if let Err(Error::DataIntegrity(reason)) = &result {
            error!("supply snapshot rejected: {}", reason);
        }
        result
    }
}

async fn fetch_snapshot(rpc: RpcClient, config: SupplyConfig) -> Result<SupplySnapshot> {
    let mut calls: Vec<EthCall> = Vec::with_capacity(config.locked_wallets.len() + 2);
    calls.push(total_supply_call(&config.token_contract)?);
    for wallet in &config.locked_wallets {
        calls.push(balance_of_call(&config.token_contract, wallet)?);
    }
    calls.push(balance_of_call(&config.token_contract, &config.burn_wallet)?);

    // Single round trip; any failed sub-call already failed the whole batch.
    let values = rpc.batch_call(&calls).await?;
    let (burned, rest) = values
        .split_last()
        .ok_or_else(|| Error::InvalidResponse("empty multicall response".into()))?;
    let (total, locked_balances) = rest
        .split_first()
        .ok_or_else(|| Error::InvalidResponse("multicall response missing total supply".into()))?;

    let locked = locked_balances.iter().try_fold(0u128, |acc, balance| {
        acc.checked_add(*balance)
            .ok_or_else(|| Error::DataIntegrity("locked balances overflow u128".into()))
    })?;

    derive_snapshot(*total, locked, *burned)
}
