use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::error::{Error, Result};

// ERC-20 function selectors, keccak("totalSupply()") / keccak("balanceOf(address)").
const TOTAL_SUPPLY_SELECTOR: &str = "18160ddd";
const BALANCE_OF_SELECTOR: &str = "70a08231";

/// One `(contract, calldata)` pair of a batched multicall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthCall {
    pub to: String,
    pub data: String,
}

pub fn total_supply_call(token: &str) -> Result<EthCall> {
    Ok(EthCall {
        to: normalize_address(token)?,
        data: format!("0x{}", TOTAL_SUPPLY_SELECTOR),
    })
}

pub fn balance_of_call(token: &str, holder: &str) -> Result<EthCall> {
    let holder = normalize_address(holder)?;
    Ok(EthCall {
        to: normalize_address(token)?,
        data: format!("0x{}{:0>64}", BALANCE_OF_SELECTOR, &holder[2..]),
    })
}

fn normalize_address(addr: &str) -> Result<String> {
    let hex = addr.strip_prefix("0x").unwrap_or(addr);
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::Config(format!("invalid address: {}", addr)));
    }
    Ok(format!("0x{}", hex.to_lowercase()))
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    id: u64,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// JSON-RPC client issuing all account queries of a supply snapshot as a
/// single batched request.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: Client,
    url: String,
}

impl RpcClient {
    pub fn new(client: Client, url: String) -> Self {
        Self { client, url }
    }

    /// Executes `calls` in one round trip and returns the decoded values in
    /// call order. Any failed sub-call fails the whole batch: supply figures
    /// are subtractions, so partial data is unsafe to publish.
    pub async fn batch_call(&self, calls: &[EthCall]) -> Result<Vec<u128>> {
        let body: Vec<serde_json::Value> = calls
            .iter()
            .enumerate()
            .map(|(id, call)| {
                json!({
                    "jsonrpc": "2.0",
                    "id": id as u64,
                    "method": "eth_call",
                    "params": [{"to": call.to, "data": call.data}, "latest"],
                })
            })
            .collect();

        debug!("rpc: batch of {} eth_call entries to {}", calls.len(), self.url);
        let responses: Vec<RpcResponse> = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        decode_batch(responses, calls.len())
    }
}

fn decode_batch(mut responses: Vec<RpcResponse>, expected: usize) -> Result<Vec<u128>> {
    if responses.len() != expected {
        return Err(Error::UpstreamUnavailable(format!(
            "batch returned {} responses, expected {}",
            responses.len(),
            expected
        )));
    }
    responses.sort_by_key(|r| r.id);

    responses
        .into_iter()
        .enumerate()
        .map(|(index, response)| {
            if response.id != index as u64 {
                return Err(Error::UpstreamUnavailable(format!(
                    "batch response ids are not contiguous at {}",
                    index
                )));
            }
            if let Some(err) = response.error {
                return Err(Error::UpstreamUnavailable(format!(
                    "eth_call {} failed: {} (code {})",
                    index, err.message, err.code
                )));
            }
            let result = response.result.ok_or_else(|| {
                Error::InvalidResponse(format!("eth_call {} returned no result", index))
            })?;
            parse_quantity(&result)
        })
        .collect()
}

/// Decodes a 0x-prefixed hex quantity into `u128`. ABI words are 32 bytes;
/// anything above 128 bits is rejected rather than truncated.
pub(crate) fn parse_quantity(hex: &str) -> Result<u128> {
    let digits = hex
        .strip_prefix("0x")
        .ok_or_else(|| Error::InvalidResponse(format!("quantity missing 0x prefix: {}", hex)))?;
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        return Ok(0);
    }
    if trimmed.len() > 32 {
        return Err(Error::InvalidResponse(format!(
            "quantity exceeds 128 bits: {}",
            hex
        )));
    }
    u128::from_str_radix(trimmed, 16)
        .map_err(|e| Error::InvalidResponse(format!("bad hex quantity {}: {}", hex, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "0xEdB8008031141024d50cA2839A607B2f82C1c045";
    const HOLDER: &str = "0x81d29c0DcD64fAC05C4A394D455cbD79D210C200";

    #[test]
    fn balance_of_calldata_is_selector_plus_padded_address() {
        let call = balance_of_call(TOKEN, HOLDER).unwrap();
        assert_eq!(call.to, TOKEN.to_lowercase());
        assert_eq!(
            call.data,
            "0x70a0823100000000000000000000000081d29c0dcd64fac05c4a394d455cbd79d210c200"
        );
    }

    #[test]
    fn invalid_addresses_are_rejected() {
        assert!(balance_of_call("0x1234", HOLDER).is_err());
        assert!(balance_of_call(TOKEN, "not-an-address").is_err());
    }

    #[test]
    fn quantities_decode_from_abi_words() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(
            parse_quantity("0x0000000000000000000000000000000000000000000000000000000000000064")
                .unwrap(),
            100
        );
        // 1e27 (a billion tokens in 18-decimal base units) fits in u128.
        assert_eq!(
            parse_quantity("0x033b2e3c9fd0803ce8000000").unwrap(),
            1_000_000_000_000_000_000_000_000_000
        );
        assert!(parse_quantity("0xff00000000000000000000000000000000000000000000000000000000000000")
            .is_err());
        assert!(parse_quantity("64").is_err());
    }

    #[test]
    fn one_failed_sub_call_fails_the_batch() {
        let responses = vec![
            RpcResponse { id: 1, result: Some("0x01".into()), error: None },
            RpcResponse {
                id: 0,
                result: None,
                error: Some(RpcErrorBody { code: -32000, message: "execution reverted".into() }),
            },
        ];
        let err = decode_batch(responses, 2).unwrap_err();
        assert!(matches!(err, Error::UpstreamUnavailable(_)));
    }

    #[test]
    fn responses_are_matched_by_id_not_arrival_order() {
        let responses = vec![
            RpcResponse { id: 1, result: Some("0x02".into()), error: None },
            RpcResponse { id: 0, result: Some("0x01".into()), error: None },
        ];
        assert_eq!(decode_batch(responses, 2).unwrap(), vec![1, 2]);
    }

    #[test]
    fn short_batches_are_rejected() {
        let responses = vec![RpcResponse { id: 0, result: Some("0x01".into()), error: None }];
        assert!(decode_batch(responses, 2).is_err());
    }
}
