//! Quote Aggregation Module
//!
//! Finds the best executable Uniswap V3 price for an intent:
//! 1. Resolve every variant of both tokens from the canonical table
//! 2. Probe QuoterV2 for each (in variant × out variant × fee tier)
//! 3. Keep the strictly greatest output; ties keep the first combination found
//! 4. Derive `min_out` from the slippage tolerance and estimate price impact
//!
//! Results are cached for the quote TTL; a cache hit never touches the network.

use alloy_primitives::{
    aliases::{U160, U24},
    Address, Bytes, U256,
};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::core::security::{derive_token_address, resolve_variants};
use crate::models::config::SwapConfig;
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::{Intent, Quote, TokenVariant};
use crate::providers::market::MarketDataSource;
use crate::providers::rpc::JsonRpc;
use crate::utils::cache::QuoteCache;
use crate::utils::constants::{
    format_units, is_stablecoin, parse_units, BPS_DENOMINATOR, QUOTER_V2, SWAP_GAS_FALLBACK,
};
use crate::utils::telemetry::TelemetryCollector;

sol! {
    struct QuoteExactInputSingleParams {
        address tokenIn;
        address tokenOut;
        uint256 amountIn;
        uint24 fee;
        uint160 sqrtPriceLimitX96;
    }

    function quoteExactInputSingle(QuoteExactInputSingleParams memory params)
        external
        returns (
            uint256 amountOut,
            uint160 sqrtPriceX96After,
            uint32 initializedTicksCrossed,
            uint256 gasEstimate
        );
}

/// Output of a single pool quote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolQuote {
    pub amount_out: U256,
    pub gas_estimate: u64,
}

/// Single-pool exact-input quoting
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote_exact_input_single(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        fee: u32,
    ) -> AppResult<PoolQuote>;
}

/// QuoterV2 over `eth_call`
pub struct OnChainQuoter {
    rpc: Arc<dyn JsonRpc>,
    quoter: Address,
}

impl OnChainQuoter {
    pub fn new(rpc: Arc<dyn JsonRpc>) -> Self {
        Self {
            rpc,
            quoter: QUOTER_V2,
        }
    }

    pub fn encode_call(token_in: Address, token_out: Address, amount_in: U256, fee: u32) -> Bytes {
        let calldata = quoteExactInputSingleCall {
            params: QuoteExactInputSingleParams {
                tokenIn: token_in,
                tokenOut: token_out,
                amountIn: amount_in,
                fee: U24::saturating_from(fee),
                sqrtPriceLimitX96: U160::ZERO,
            },
        }
        .abi_encode();
        Bytes::from(calldata)
    }

    pub fn decode_result(raw: &[u8]) -> AppResult<PoolQuote> {
        let decoded = quoteExactInputSingleCall::abi_decode_returns(raw, true).map_err(|e| {
            AppError::new(ErrorCode::RpcInvalidResponse, format!("Bad quoter response: {}", e))
        })?;
        let gas_estimate = u64::try_from(decoded.gasEstimate).unwrap_or(SWAP_GAS_FALLBACK);
        Ok(PoolQuote {
            amount_out: decoded.amountOut,
            gas_estimate,
        })
    }
}

#[async_trait]
impl QuoteSource for OnChainQuoter {
    async fn quote_exact_input_single(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        fee: u32,
    ) -> AppResult<PoolQuote> {
        let data = Self::encode_call(token_in, token_out, amount_in, fee);
        let params = serde_json::json!([{ "to": self.quoter, "data": data }, "latest"]);
        let result = self.rpc.request("eth_call", params).await?;

        let hex_str = result
            .as_str()
            .ok_or_else(|| AppError::new(ErrorCode::RpcInvalidResponse, "eth_call result is not a string"))?;
        let raw = hex::decode(hex_str.trim_start_matches("0x")).map_err(|e| {
            AppError::new(ErrorCode::RpcInvalidResponse, format!("Invalid hex: {}", e))
        })?;
        Self::decode_result(&raw)
    }
}

// ============================================
// Pure helpers
// ============================================

/// Whether `address` is the canonical token for `symbol` or one of its aliases
pub fn variant_label(symbol: &str, address: Address) -> &'static str {
    match derive_token_address(symbol) {
        Ok(canonical) if canonical == address => "canonical",
        _ => "alias",
    }
}

/// `floor(amount_out * (10000 - slippage_bps) / 10000)`
pub fn compute_min_out(amount_out: U256, slippage_bps: u32) -> U256 {
    let keep = BPS_DENOMINATOR.saturating_sub(slippage_bps as u64);
    amount_out.saturating_mul(U256::from(keep)) / U256::from(BPS_DENOMINATOR)
}

/// Notional-size heuristic for price impact (percent).
///
/// Not derived from pool reserves; unknown notional falls back to 0.5%.
pub fn estimate_price_impact(notional_usd: Option<f64>) -> f64 {
    match notional_usd {
        None => 0.5,
        Some(n) if n < 1_000.0 => 0.05,
        Some(n) if n < 10_000.0 => 0.1,
        Some(n) if n < 100_000.0 => 0.5,
        Some(n) if n < 1_000_000.0 => 2.0,
        Some(_) => 5.0,
    }
}

/// USD size of the trade from a stablecoin leg, else from a market price
pub fn notional_usd(
    token_in: &TokenVariant,
    amount_in: U256,
    token_out: &TokenVariant,
    amount_out: U256,
    token_in_price_usd: Option<f64>,
) -> Option<f64> {
    if is_stablecoin(&token_in.symbol) {
        return Some(format_units(amount_in, token_in.decimals));
    }
    if is_stablecoin(&token_out.symbol) {
        return Some(format_units(amount_out, token_out.decimals));
    }
    token_in_price_usd.map(|price| price * format_units(amount_in, token_in.decimals))
}

// ============================================
// Aggregator
// ============================================

struct Candidate {
    token_in: TokenVariant,
    token_out: TokenVariant,
    amount_in: U256,
    fee_tier: u32,
    pool: PoolQuote,
}

pub struct QuoteAggregator {
    source: Arc<dyn QuoteSource>,
    cache: QuoteCache,
    market: Option<Arc<dyn MarketDataSource>>,
    fee_tiers: Vec<u32>,
    quoter_retries: u32,
    max_slippage_bps: u32,
    telemetry: Option<Arc<TelemetryCollector>>,
}

impl QuoteAggregator {
    pub fn new(source: Arc<dyn QuoteSource>, cache: QuoteCache, config: &SwapConfig) -> Self {
        Self {
            source,
            cache,
            market: None,
            fee_tiers: config.fee_tiers.clone(),
            quoter_retries: config.retry.quoter_retries,
            max_slippage_bps: config.max_slippage_bps,
            telemetry: None,
        }
    }

    pub fn with_market_data(mut self, market: Arc<dyn MarketDataSource>) -> Self {
        self.market = Some(market);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryCollector>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn cache(&self) -> &QuoteCache {
        &self.cache
    }

    pub fn fee_tiers(&self) -> &[u32] {
        &self.fee_tiers
    }

    /// Best quote for `intent`, served from cache when fresh
    pub async fn get_quote(&self, intent: &Intent) -> AppResult<Quote> {
        let start = Instant::now();
        let result = self.fetch_quote(intent).await;

        if let Some(telemetry) = &self.telemetry {
            match &result {
                Ok((_, cache_hit)) => {
                    telemetry.record_quote(start.elapsed().as_millis() as u64, *cache_hit)
                }
                Err(_) => telemetry.record_quote_failure(),
            }
        }
        result.map(|(quote, _)| quote)
    }

    async fn fetch_quote(&self, intent: &Intent) -> AppResult<(Quote, bool)> {
        if intent.slippage_bps > self.max_slippage_bps {
            return Err(AppError::validation(format!(
                "Slippage {}bps exceeds maximum {}bps",
                intent.slippage_bps, self.max_slippage_bps
            )));
        }

        let key = intent.key();
        if let Some(quote) = self.cache.get(&key).await {
            return Ok((quote, true));
        }

        let in_variants = resolve_variants(&intent.token_in)?;
        let out_variants = resolve_variants(&intent.token_out)?;

        let best = self.best_candidate(intent, &in_variants, &out_variants).await?;

        let token_in_price = match &self.market {
            Some(market) if !is_stablecoin(&best.token_in.symbol) && !is_stablecoin(&best.token_out.symbol) => {
                market
                    .snapshot(best.token_in.address, best.token_out.address)
                    .await
                    .ok()
                    .and_then(|s| s.price_usd)
            }
            _ => None,
        };
        let notional = notional_usd(
            &best.token_in,
            best.amount_in,
            &best.token_out,
            best.pool.amount_out,
            token_in_price,
        );

        let quote = Quote {
            key,
            amount_in: best.amount_in,
            amount_out: best.pool.amount_out,
            min_out: compute_min_out(best.pool.amount_out, intent.slippage_bps),
            fee_tier: best.fee_tier,
            gas_estimate: best.pool.gas_estimate,
            price_impact_pct: estimate_price_impact(notional),
            notional_usd: notional,
            fetched_at_ms: chrono::Utc::now().timestamp_millis(),
            token_in: best.token_in,
            token_out: best.token_out,
        };

        info!(
            "💱 Quote {} {} -> {} {} (fee {}, {} variant)",
            intent.amount,
            quote.token_in.symbol,
            quote.amount_out,
            quote.token_out.symbol,
            quote.fee_tier,
            variant_label(&intent.token_out, quote.token_out.address)
        );

        self.cache.set(&quote).await;
        Ok((quote, false))
    }

    async fn best_candidate(
        &self,
        intent: &Intent,
        in_variants: &[TokenVariant],
        out_variants: &[TokenVariant],
    ) -> AppResult<Candidate> {
        let mut best: Option<Candidate> = None;
        let mut amount_error: Option<AppError> = None;

        for token_in in in_variants {
            let amount_in = match parse_units(&intent.amount, token_in.decimals) {
                Ok(amount) => amount,
                Err(e) => {
                    amount_error = Some(e);
                    continue;
                }
            };

            for token_out in out_variants {
                if token_in.address == token_out.address {
                    continue;
                }

                for &fee in &self.fee_tiers {
                    let Some(pool) = self
                        .quote_with_retry(token_in.address, token_out.address, amount_in, fee)
                        .await
                    else {
                        continue;
                    };

                    if pool.amount_out.is_zero() {
                        continue;
                    }
                    let improves = best
                        .as_ref()
                        .map_or(true, |b| pool.amount_out > b.pool.amount_out);
                    if improves {
                        best = Some(Candidate {
                            token_in: token_in.clone(),
                            token_out: token_out.clone(),
                            amount_in,
                            fee_tier: fee,
                            pool,
                        });
                    }
                }
            }
        }

        match (best, amount_error) {
            (Some(best), _) => Ok(best),
            (None, Some(e)) => Err(e),
            (None, None) => {
                warn!("❌ No liquidity for {} -> {}", intent.token_in, intent.token_out);
                Err(AppError::no_liquidity(&intent.token_in, &intent.token_out))
            }
        }
    }

    /// One quoter call with up to `quoter_retries` local retries
    async fn quote_with_retry(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        fee: u32,
    ) -> Option<PoolQuote> {
        for attempt in 0..=self.quoter_retries {
            match self
                .source
                .quote_exact_input_single(token_in, token_out, amount_in, fee)
                .await
            {
                Ok(pool) => return Some(pool),
                Err(e) => {
                    debug!(
                        "Quoter attempt {}/{} failed for fee {}: {}",
                        attempt + 1,
                        self.quoter_retries + 1,
                        fee,
                        e.code_str()
                    );
                }
            }
        }
        None
    }
}
