//! RPC Client Module - Prioritised JSON-RPC failover
//!
//! 1. Ordered endpoint list (lowest priority value first)
//! 2. Per-provider exponential backoff: `2^attempt * base_delay`
//! 3. Non-2xx statuses and JSON-RPC error objects count as failures
//! 4. User-Agent header, gzip, request timeout
//! 5. Concurrent health probing with `eth_blockNumber`
//!
//! API keys embedded in URLs are masked in every log line.

use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::models::config::{RetryConfig, RpcEndpoint, SwapConfig};
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::ProviderHealth;
use crate::utils::constants::USER_AGENT as USER_AGENT_CONST;

/// JSON-RPC transport seam. The quoter, chain reader and simulation
/// gateway depend on this trait rather than on HTTP directly.
#[async_trait]
pub trait JsonRpc: Send + Sync {
    /// Call `method` with failover, returning the raw `result` value
    async fn request(&self, method: &str, params: serde_json::Value) -> AppResult<serde_json::Value>;
}

/// RPC client with retry logic and ordered failover
pub struct RpcFailoverClient {
    /// Sorted by priority
    endpoints: Vec<RpcEndpoint>,
    retry: RetryConfig,
    client: reqwest::Client,
    request_id: AtomicU64,
}

impl RpcFailoverClient {
    pub fn new(endpoints: Vec<RpcEndpoint>, retry: RetryConfig) -> AppResult<Self> {
        if endpoints.is_empty() {
            return Err(AppError::new(ErrorCode::ConfigInvalidValue, "No RPC endpoints configured"));
        }
        let mut endpoints = endpoints;
        endpoints.sort_by_key(|e| e.priority);

        let client = build_client(retry.timeout_secs)?;
        for endpoint in &endpoints {
            info!(
                "✅ RPC provider {} (priority {}): {}",
                endpoint.name,
                endpoint.priority,
                masked_url(&endpoint.url)
            );
        }

        Ok(Self {
            endpoints,
            retry,
            client,
            request_id: AtomicU64::new(1),
        })
    }

    pub fn from_config(config: &SwapConfig) -> AppResult<Self> {
        Self::new(config.ordered_endpoints(), config.retry.clone())
    }

    pub fn endpoints(&self) -> &[RpcEndpoint] {
        &self.endpoints
    }

    /// Try every provider in priority order, each up to `max_retries` times.
    ///
    /// Fails with `RpcExhausted` carrying the last observed error.
    pub async fn fetch_with_failover<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
        max_retries: u32,
    ) -> AppResult<T> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
        });

        let mut last_error: Option<AppError> = None;
        for endpoint in &self.endpoints {
            match self.call_with_retry::<T>(endpoint, &payload, max_retries).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!(
                        "⚠️ RPC provider {} failed {}: {}",
                        endpoint.name,
                        method,
                        e.code_str()
                    );
                    last_error = Some(e);
                }
            }
        }

        let last = last_error
            .map(|e| e.message)
            .unwrap_or_else(|| "no providers attempted".to_string());
        Err(AppError::rpc_exhausted(last))
    }

    /// Same as `fetch_with_failover` with the configured retry count
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> AppResult<T> {
        self.fetch_with_failover(method, params, self.retry.max_retries).await
    }

    async fn call_with_retry<T: DeserializeOwned>(
        &self,
        endpoint: &RpcEndpoint,
        payload: &serde_json::Value,
        max_retries: u32,
    ) -> AppResult<T> {
        let attempts = max_retries.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = backoff_delay(self.retry.base_delay_ms, attempt);
                debug!(
                    "⏳ Retry {}/{} on {} after {}ms",
                    attempt + 1,
                    attempts,
                    endpoint.name,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            match self.execute_call::<T>(&endpoint.url, payload).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if e.code == ErrorCode::RpcRateLimited {
                        warn!("⏳ Rate limited by {} (attempt {}/{})", endpoint.name, attempt + 1, attempts);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::rpc_failed("no attempts made")))
    }

    /// Execute single RPC call
    async fn execute_call<T: DeserializeOwned>(&self, url: &str, payload: &serde_json::Value) -> AppResult<T> {
        let response = self.client.post(url).json(payload).send().await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AppError::new(ErrorCode::RpcRateLimited, "Rate limited (HTTP 429)"));
        }
        if !status.is_success() {
            return Err(AppError::rpc_failed(format!("HTTP error: {}", status)));
        }

        let json: RpcResponse = response.json().await.map_err(|e| {
            AppError::new(ErrorCode::RpcInvalidResponse, format!("Failed to parse response: {}", e))
        })?;

        if let Some(error) = json.error {
            return Err(AppError::new(
                ErrorCode::RpcInvalidResponse,
                format!("RPC error: {} (code: {})", error.message, error.code),
            ));
        }

        // `null` is a legitimate result (e.g. pending receipt) when T is an Option
        serde_json::from_value(json.result).map_err(|e| {
            AppError::new(ErrorCode::RpcInvalidResponse, format!("Unexpected result: {}", e))
        })
    }

    /// Probe every provider concurrently; diagnostics only, never used for routing
    pub async fn check_health(&self) -> Vec<ProviderHealth> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "eth_blockNumber",
            "params": [],
            "id": 0,
        });

        let probes = self.endpoints.iter().map(|endpoint| {
            let payload = payload.clone();
            async move {
                let start = Instant::now();
                let result = self.execute_call::<String>(&endpoint.url, &payload).await;
                let latency_ms = start.elapsed().as_millis() as u64;

                let (healthy, block_number, error) = match result {
                    Ok(hex_block) => match parse_hex_u64(&hex_block) {
                        Some(block) => (true, Some(block), None),
                        None => (false, None, Some("Invalid block number".to_string())),
                    },
                    Err(e) => (false, None, Some(e.code_str().to_string())),
                };

                ProviderHealth {
                    name: endpoint.name.clone(),
                    url: masked_url(&endpoint.url),
                    priority: endpoint.priority,
                    healthy,
                    latency_ms,
                    block_number,
                    error,
                }
            }
        });

        join_all(probes).await
    }
}

#[async_trait]
impl JsonRpc for RpcFailoverClient {
    async fn request(&self, method: &str, params: serde_json::Value) -> AppResult<serde_json::Value> {
        self.call::<serde_json::Value>(method, params).await
    }
}

/// Build HTTP client with custom headers and gzip
fn build_client(timeout_secs: u64) -> AppResult<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
    headers.insert("Content-Type", HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(timeout_secs))
        .gzip(true)
        .build()
        .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))
}

/// `2^attempt * base_ms`
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(2u64.saturating_pow(attempt)))
}

/// Hide path credentials (`/v2/<key>`) and query strings
pub fn masked_url(url: &str) -> String {
    if let Some((prefix, _)) = url.split_once("/v2/") {
        return format!("{}/v2/***HIDDEN***", prefix);
    }
    if let Some((prefix, _)) = url.split_once('?') {
        return format!("{}?***HIDDEN***", prefix);
    }
    url.to_string()
}

pub fn parse_hex_u64(value: &str) -> Option<u64> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16).ok()
}

/// JSON-RPC response structure
#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: serde_json::Value,
    error: Option<RpcError>,
}

/// JSON-RPC error structure
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_delay(100, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(100, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(100, 2), Duration::from_millis(400));
    }

    #[test]
    fn test_masked_url() {
        assert_eq!(
            masked_url("https://base-mainnet.g.alchemy.com/v2/abc123"),
            "https://base-mainnet.g.alchemy.com/v2/***HIDDEN***"
        );
        assert_eq!(masked_url("https://rpc.example?key=1"), "https://rpc.example?***HIDDEN***");
        assert_eq!(masked_url("https://mainnet.base.org"), "https://mainnet.base.org");
    }

    #[test]
    fn test_parse_hex_u64() {
        assert_eq!(parse_hex_u64("0x10"), Some(16));
        assert_eq!(parse_hex_u64("0xzz"), None);
    }

    #[test]
    fn test_endpoints_sorted_by_priority() {
        let client = RpcFailoverClient::new(
            vec![
                RpcEndpoint::new("slow", "http://127.0.0.1:1", 5),
                RpcEndpoint::new("fast", "http://127.0.0.1:2", 1),
            ],
            RetryConfig::default(),
        )
        .unwrap();
        assert_eq!(client.endpoints()[0].name, "fast");
    }

    #[test]
    fn test_empty_endpoint_list_rejected() {
        assert!(RpcFailoverClient::new(vec![], RetryConfig::default()).is_err());
    }
}
