//! Chain reads and the wallet boundary
//!
//! `ChainReader` covers the two reads the lifecycle needs (ERC-20 allowance
//! and transaction receipts). `WalletSigner` is the external signing seam;
//! this crate never holds keys.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::core::tx_builder::{decode_allowance, encode_allowance};
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::{TxReceipt, TxRequest};
use crate::providers::rpc::{parse_hex_u64, JsonRpc};

#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> AppResult<U256>;

    /// `None` while the transaction is pending
    async fn transaction_receipt(&self, tx_hash: B256) -> AppResult<Option<TxReceipt>>;
}

/// Signs and broadcasts on behalf of the user
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Returns the broadcast transaction hash. A user rejection is `WalletRejected`.
    async fn send_transaction(&self, tx: &TxRequest) -> AppResult<B256>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    status: Option<String>,
    block_number: Option<String>,
    gas_used: Option<String>,
}

impl RawReceipt {
    fn into_receipt(self) -> TxReceipt {
        TxReceipt {
            tx_hash: self.transaction_hash,
            success: self.status.as_deref().and_then(parse_hex_u64) == Some(1),
            block_number: self.block_number.as_deref().and_then(parse_hex_u64).unwrap_or_default(),
            gas_used: self.gas_used.as_deref().and_then(parse_hex_u64).unwrap_or_default(),
        }
    }
}

/// `ChainReader` over the failover JSON-RPC client
pub struct RpcChainReader {
    rpc: Arc<dyn JsonRpc>,
}

impl RpcChainReader {
    pub fn new(rpc: Arc<dyn JsonRpc>) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> AppResult<U256> {
        let data = encode_allowance(owner, spender);
        let params = serde_json::json!([{ "to": token, "data": data }, "latest"]);
        let result = self.rpc.request("eth_call", params).await?;

        let hex_str = result
            .as_str()
            .ok_or_else(|| AppError::new(ErrorCode::RpcInvalidResponse, "eth_call result is not a string"))?;
        let raw = hex::decode(hex_str.trim_start_matches("0x"))
            .map_err(|e| AppError::new(ErrorCode::RpcInvalidResponse, format!("Invalid hex: {}", e)))?;
        decode_allowance(&raw)
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> AppResult<Option<TxReceipt>> {
        let result = self
            .rpc
            .request("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let raw: RawReceipt = serde_json::from_value(result)?;
        Ok(Some(raw.into_receipt()))
    }
}

/// Poll for a receipt until mined or `timeout` elapses
pub async fn wait_for_receipt(
    reader: &dyn ChainReader,
    tx_hash: B256,
    poll_interval: Duration,
    timeout: Duration,
) -> AppResult<TxReceipt> {
    let start = Instant::now();
    loop {
        if let Some(receipt) = reader.transaction_receipt(tx_hash).await? {
            info!(
                "📦 Receipt for {} in block {} ({})",
                tx_hash,
                receipt.block_number,
                if receipt.success { "success" } else { "reverted" }
            );
            return Ok(receipt);
        }
        if start.elapsed() >= timeout {
            return Err(AppError::new(
                ErrorCode::ExternalTimeout,
                format!("No receipt for {} after {}s", tx_hash, timeout.as_secs()),
            ));
        }
        debug!("⏳ Waiting for receipt {}", tx_hash);
        tokio::time::sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Pending for `pending_polls` calls, then mined
    struct SlowChain {
        pending_polls: u32,
        polls: AtomicU32,
    }

    #[async_trait]
    impl ChainReader for SlowChain {
        async fn allowance(&self, _: Address, _: Address, _: Address) -> AppResult<U256> {
            Ok(U256::ZERO)
        }

        async fn transaction_receipt(&self, tx_hash: B256) -> AppResult<Option<TxReceipt>> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            if n < self.pending_polls {
                return Ok(None);
            }
            Ok(Some(TxReceipt {
                tx_hash,
                success: true,
                block_number: 100,
                gas_used: 21_000,
            }))
        }
    }

    #[test]
    fn test_raw_receipt_parsing() {
        let json = serde_json::json!({
            "transactionHash": format!("0x{}", "ab".repeat(32)),
            "status": "0x1",
            "blockNumber": "0x10",
            "gasUsed": "0x5208",
            "logs": []
        });
        let raw: RawReceipt = serde_json::from_value(json).unwrap();
        let receipt = raw.into_receipt();
        assert!(receipt.success);
        assert_eq!(receipt.block_number, 16);
        assert_eq!(receipt.gas_used, 21_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_receipt_polls_until_mined() {
        let chain = SlowChain {
            pending_polls: 3,
            polls: AtomicU32::new(0),
        };
        let receipt = wait_for_receipt(&chain, B256::ZERO, Duration::from_secs(1), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(receipt.block_number, 100);
        assert_eq!(chain.polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_receipt_times_out() {
        let chain = SlowChain {
            pending_polls: u32::MAX,
            polls: AtomicU32::new(0),
        };
        let err = wait_for_receipt(&chain, B256::ZERO, Duration::from_secs(1), Duration::from_secs(3))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ExternalTimeout);
    }
}
