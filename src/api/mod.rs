use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::TransferEvent;

pub mod explorer;
pub mod oracle;
pub mod reference;
pub mod rpc;

pub use explorer::ExplorerClient;
pub use oracle::OracleClient;
pub use reference::ReferenceClient;
pub use rpc::RpcClient;

/// Shared HTTP client; every upstream call is bounded by `timeout` so a hung
/// endpoint fails instead of stalling callers.
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))
}

/// Source of token transfers into a wallet, ordered newest-first as the
/// explorer returns them. `from_block: None` asks for the most recent page
/// only (used to seed the cursor on cold start).
#[async_trait]
pub trait TransferSource: Send + Sync {
    async fn transfers_to(
        &self,
        token_address: &str,
        wallet: &str,
        from_block: Option<u64>,
    ) -> Result<Vec<TransferEvent>>;
}
