//! Configuration module for the swap engine
//!
//! Everything here is process configuration loaded from the environment.
//! None of it can be influenced by request payloads.

use std::str::FromStr;
use tracing::{info, warn};

use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::utils::constants::{
    build_alchemy_url, CHAIN_ID_BASE, DEFAULT_AUTO_RESET_MS, DEFAULT_FEE_TIERS,
    DEFAULT_GAS_PRICE_GWEI, DEFAULT_QUOTE_TTL_SECS, DEFAULT_RATE_LIMIT_MAX,
    DEFAULT_RATE_LIMIT_WINDOW_MS, DEFAULT_RPC_TIMEOUT_SECS, DEFAULT_SLIPPAGE_BPS,
    DEXSCREENER_API_BASE, MAX_SLIPPAGE_BPS, PUBLIC_BASE_RPC,
};

/// One JSON-RPC endpoint in the failover list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcEndpoint {
    pub name: String,
    pub url: String,
    /// Lower value is tried first
    pub priority: u32,
}

impl RpcEndpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            priority,
        }
    }
}

/// Fixed-window rate limit parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Probability that a check also sweeps expired records
    pub eviction_probability: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_RATE_LIMIT_MAX,
            window_ms: DEFAULT_RATE_LIMIT_WINDOW_MS,
            eviction_probability: 0.1,
        }
    }
}

/// RPC retry policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts per provider
    pub max_retries: u32,
    /// Base of the `2^attempt * base` backoff
    pub base_delay_ms: u64,
    pub timeout_secs: u64,
    /// Local retries of a single quoter call on top of RPC failover
    pub quoter_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            timeout_secs: DEFAULT_RPC_TIMEOUT_SECS,
            quoter_retries: 2,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct SwapConfig {
    pub chain_id: u64,
    /// Ordered by priority
    pub rpc_endpoints: Vec<RpcEndpoint>,
    pub retry: RetryConfig,
    /// Simulation service endpoint (`alchemy_simulateAssetChanges` compatible)
    pub simulation_url: Option<String>,
    pub market_data_url: String,
    /// Ascending fee tiers to probe
    pub fee_tiers: Vec<u32>,
    pub default_slippage_bps: u32,
    pub max_slippage_bps: u32,
    pub rate_limit: RateLimitConfig,
    pub quote_ttl_secs: u64,
    /// Assumed gas price for gas-cost risk estimation
    pub gas_price_gwei: f64,
    /// Delay before a completed session resets to input
    pub auto_reset_ms: u64,
    pub receipt_poll_interval_ms: u64,
    pub receipt_timeout_secs: u64,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            chain_id: CHAIN_ID_BASE,
            rpc_endpoints: vec![RpcEndpoint::new("base-public", PUBLIC_BASE_RPC, 0)],
            retry: RetryConfig::default(),
            simulation_url: None,
            market_data_url: DEXSCREENER_API_BASE.to_string(),
            fee_tiers: DEFAULT_FEE_TIERS.to_vec(),
            default_slippage_bps: DEFAULT_SLIPPAGE_BPS,
            max_slippage_bps: MAX_SLIPPAGE_BPS,
            rate_limit: RateLimitConfig::default(),
            quote_ttl_secs: DEFAULT_QUOTE_TTL_SECS,
            gas_price_gwei: DEFAULT_GAS_PRICE_GWEI,
            auto_reset_ms: DEFAULT_AUTO_RESET_MS,
            receipt_poll_interval_ms: 1_000,
            receipt_timeout_secs: 120,
        }
    }
}

impl SwapConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        config.rpc_endpoints = Self::rpc_endpoints_from_env();

        if let Ok(url) = std::env::var("RUSTER_SIMULATION_URL") {
            if !url.is_empty() {
                config.simulation_url = Some(url);
            }
        } else if let Some(primary) = config.rpc_endpoints.first() {
            // Alchemy endpoints serve the simulation API on the same URL
            if primary.url.contains("alchemy.com") {
                config.simulation_url = Some(primary.url.clone());
            }
        }

        if let Ok(url) = std::env::var("RUSTER_MARKET_DATA_URL") {
            config.market_data_url = url;
        }

        config.default_slippage_bps =
            env_parse("RUSTER_DEFAULT_SLIPPAGE_BPS", config.default_slippage_bps)?;
        config.rate_limit.max_requests =
            env_parse("RUSTER_RATE_LIMIT_MAX", config.rate_limit.max_requests)?;
        config.rate_limit.window_ms =
            env_parse("RUSTER_RATE_LIMIT_WINDOW_MS", config.rate_limit.window_ms)?;
        config.quote_ttl_secs = env_parse("RUSTER_QUOTE_TTL_SECS", config.quote_ttl_secs)?;
        config.gas_price_gwei = env_parse("RUSTER_GAS_PRICE_GWEI", config.gas_price_gwei)?;
        config.auto_reset_ms = env_parse("RUSTER_AUTO_RESET_MS", config.auto_reset_ms)?;
        config.retry.timeout_secs = env_parse("RUSTER_RPC_TIMEOUT_SECS", config.retry.timeout_secs)?;

        config.validate()?;

        info!(
            "⚙️ Config loaded: chain {}, {} RPC provider(s), simulation {}",
            config.chain_id,
            config.rpc_endpoints.len(),
            if config.simulation_url.is_some() { "enabled" } else { "disabled" }
        );

        Ok(config)
    }

    /// `RUSTER_RPC_URLS` (comma separated, priority order), then
    /// Alchemy from `ALCHEMY_API_KEY`, then the public Base RPC.
    fn rpc_endpoints_from_env() -> Vec<RpcEndpoint> {
        let mut endpoints = Vec::new();

        if let Ok(urls) = std::env::var("RUSTER_RPC_URLS") {
            for (idx, url) in urls.split(',').map(str::trim).filter(|u| !u.is_empty()).enumerate() {
                endpoints.push(RpcEndpoint::new(format!("rpc-{}", idx), url, idx as u32));
            }
        }

        if endpoints.is_empty() {
            if let Ok(key) = std::env::var("ALCHEMY_API_KEY") {
                if !key.is_empty() && key != "YOUR_API_KEY" {
                    if let Some(url) = build_alchemy_url(CHAIN_ID_BASE, &key) {
                        info!("🔑 Using ALCHEMY_API_KEY (key hidden)");
                        endpoints.push(RpcEndpoint::new("alchemy", url, 0));
                    }
                }
            }
        }

        let next = endpoints.len() as u32;
        if !endpoints.iter().any(|e| e.url == PUBLIC_BASE_RPC) {
            endpoints.push(RpcEndpoint::new("base-public", PUBLIC_BASE_RPC, next));
        }

        if endpoints.len() == 1 {
            warn!("⚠️ Only the public Base RPC is configured");
        }
        endpoints
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> AppResult<()> {
        if self.rpc_endpoints.is_empty() {
            return Err(AppError::new(ErrorCode::ConfigInvalidValue, "No RPC endpoints configured"));
        }
        if self.fee_tiers.is_empty() || self.fee_tiers.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AppError::new(
                ErrorCode::ConfigInvalidValue,
                "Fee tiers must be non-empty and strictly ascending",
            ));
        }
        if self.default_slippage_bps > self.max_slippage_bps {
            return Err(AppError::new(
                ErrorCode::ConfigInvalidValue,
                format!(
                    "Default slippage {}bps exceeds maximum {}bps",
                    self.default_slippage_bps, self.max_slippage_bps
                ),
            ));
        }
        if self.rate_limit.max_requests == 0 || self.rate_limit.window_ms == 0 {
            return Err(AppError::new(ErrorCode::ConfigInvalidValue, "Rate limit must be positive"));
        }
        Ok(())
    }

    /// Endpoints sorted by ascending priority
    pub fn ordered_endpoints(&self) -> Vec<RpcEndpoint> {
        let mut endpoints = self.rpc_endpoints.clone();
        endpoints.sort_by_key(|e| e.priority);
        endpoints
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> AppResult<T> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            AppError::new(
                ErrorCode::ConfigInvalidValue,
                format!("Invalid value for {}: {}", key, raw),
            )
        }),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SwapConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fee_tiers, vec![500, 3000, 10000]);
        assert_eq!(config.default_slippage_bps, 50);
        assert_eq!(config.rate_limit.max_requests, 20);
        assert_eq!(config.rate_limit.window_ms, 60_000);
        assert_eq!(config.quote_ttl_secs, 30);
    }

    #[test]
    fn test_unsorted_fee_tiers_rejected() {
        let config = SwapConfig {
            fee_tiers: vec![3000, 500],
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().code, ErrorCode::ConfigInvalidValue);
    }

    #[test]
    fn test_ordered_endpoints() {
        let config = SwapConfig {
            rpc_endpoints: vec![
                RpcEndpoint::new("b", "http://b", 2),
                RpcEndpoint::new("a", "http://a", 1),
            ],
            ..Default::default()
        };
        let names: Vec<_> = config.ordered_endpoints().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
