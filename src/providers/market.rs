//! Market Data Provider - DexScreener
//!
//! Supplies optional risk inputs only:
//! - USD price of the traded token
//! - 24h price change (volatility proxy)
//! - USD liquidity of the deepest pool for the pair
//!
//! Never used for pricing the swap itself; the on-chain quoter is authoritative.
//! DexScreener lags by several seconds and is free, no API key required.

use alloy_primitives::Address;
use async_trait::async_trait;
use eyre::{eyre, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::MarketSnapshot;
use crate::utils::constants::DEXSCREENER_API_BASE;

/// Source of optional market context for a token pair
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Snapshot for `token`, with liquidity taken from its pool against `paired_with`
    async fn snapshot(&self, token: Address, paired_with: Address) -> AppResult<MarketSnapshot>;
}

/// DexScreener API response
#[derive(Debug, Deserialize)]
pub struct DexScreenerResponse {
    #[serde(default)]
    pub pairs: Option<Vec<DexPair>>,
}

/// A trading pair from DexScreener
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DexPair {
    pub chain_id: String,
    pub dex_id: String,
    pub base_token: DexToken,
    pub quote_token: DexToken,
    pub liquidity: Option<DexLiquidity>,
    /// Price of the base token in USD
    pub price_usd: Option<String>,
    pub price_change: Option<DexPriceChange>,
}

impl DexPair {
    fn liquidity_usd(&self) -> f64 {
        self.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0)
    }

    fn has_token(&self, token: &str) -> bool {
        self.base_token.address.eq_ignore_ascii_case(token)
            || self.quote_token.address.eq_ignore_ascii_case(token)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexToken {
    pub address: String,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexLiquidity {
    pub usd: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexPriceChange {
    pub h24: Option<f64>,
}

/// DexScreener API client
pub struct DexScreenerClient {
    client: reqwest::Client,
    base_url: String,
    /// DexScreener chain slug
    chain: String,
}

impl Default for DexScreenerClient {
    fn default() -> Self {
        Self::new(DEXSCREENER_API_BASE)
    }
}

impl DexScreenerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            chain: "base".to_string(),
        }
    }

    /// Fetch all pairs for a token on the configured chain, deepest first
    pub async fn get_token_pairs(&self, token_address: &str) -> Result<Vec<DexPair>> {
        let url = format!("{}/tokens/{}", self.base_url, token_address);
        debug!("🔍 DexScreener: Fetching pairs for {}", token_address);

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| eyre!("DexScreener request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(eyre!("DexScreener API error: {}", response.status()));
        }

        let data: DexScreenerResponse = response
            .json()
            .await
            .map_err(|e| eyre!("Failed to parse DexScreener response: {}", e))?;

        let mut pairs: Vec<DexPair> = data
            .pairs
            .unwrap_or_default()
            .into_iter()
            .filter(|p| p.chain_id == self.chain)
            .collect();

        pairs.sort_by(|a, b| {
            b.liquidity_usd()
                .partial_cmp(&a.liquidity_usd())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(pairs)
    }
}

/// Reduce a pair list to a snapshot for `token`
pub fn summarize_pairs(pairs: &[DexPair], token: &str, paired_with: &str) -> MarketSnapshot {
    // Price fields describe the base token, so only pairs where it is base are usable
    let priced = pairs
        .iter()
        .find(|p| p.base_token.address.eq_ignore_ascii_case(token));

    let price_usd = priced
        .and_then(|p| p.price_usd.as_deref())
        .and_then(|p| p.parse::<f64>().ok());
    let price_change_24h_pct = priced.and_then(|p| p.price_change.as_ref()).and_then(|c| c.h24);

    let liquidity_usd = pairs
        .iter()
        .find(|p| p.has_token(token) && p.has_token(paired_with))
        .or_else(|| pairs.first())
        .and_then(|p| p.liquidity.as_ref())
        .and_then(|l| l.usd);

    MarketSnapshot {
        price_usd,
        price_change_24h_pct,
        liquidity_usd,
    }
}

#[async_trait]
impl MarketDataSource for DexScreenerClient {
    async fn snapshot(&self, token: Address, paired_with: Address) -> AppResult<MarketSnapshot> {
        let token_str = token.to_string();
        let pairs = self.get_token_pairs(&token_str).await.map_err(|e| {
            warn!("⚠️ Market data unavailable: {}", e);
            AppError::new(ErrorCode::MarketDataUnavailable, e.to_string())
        })?;
        Ok(summarize_pairs(&pairs, &token_str, &paired_with.to_string()))
    }
}
