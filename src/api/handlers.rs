//! API Request Handlers

use alloy_primitives::{Address, Bytes, U256};
use axum::{
    extract::{Json, State},
    http::StatusCode,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::types::*;
use crate::core::quote::{OnChainQuoter, QuoteAggregator};
use crate::core::rate_limit::RateLimiter;
use crate::core::security::{
    parse_address_lenient, resolve_token_or_variant, SecurityGate, SwapAddressCheck,
};
use crate::core::risk_score::{eth_price_usd, RiskClassifier, RiskInputs};
use crate::core::tx_builder::{SwapParams, TransactionBuilder};
use crate::models::config::{RpcEndpoint, SwapConfig};
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::{Intent, SimulationOutcome, TxRequest};
use crate::providers::chain::{ChainReader, RpcChainReader};
use crate::providers::market::{DexScreenerClient, MarketDataSource};
use crate::providers::rpc::{JsonRpc, RpcFailoverClient};
use crate::providers::simulation::{AlchemySimulation, SimulationGateway};
use crate::utils::cache::QuoteCache;
use crate::utils::constants::{format_units_exact, parse_units, token_by_address, APP_VERSION};
use crate::utils::telemetry::TelemetryCollector;

/// Shared application state
pub struct AppState {
    pub config: SwapConfig,
    pub gate: Arc<SecurityGate>,
    pub limiter: Arc<RateLimiter>,
    pub aggregator: Arc<QuoteAggregator>,
    pub builder: TransactionBuilder,
    pub classifier: RiskClassifier,
    /// `None` when no simulation endpoint is configured
    pub simulator: Option<Arc<SimulationGateway>>,
    pub rpc: Arc<RpcFailoverClient>,
    pub chain: Arc<dyn ChainReader>,
    pub market: Option<Arc<dyn MarketDataSource>>,
    pub telemetry: Arc<TelemetryCollector>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire every component from configuration
    pub fn from_config(config: SwapConfig, telemetry: Arc<TelemetryCollector>) -> AppResult<Self> {
        let rpc = Arc::new(RpcFailoverClient::from_config(&config)?);
        let json_rpc: Arc<dyn JsonRpc> = rpc.clone();

        let cache = QuoteCache::in_memory(config.quote_ttl_secs);
        // Background task: purge expired quotes every 60 seconds
        cache.spawn_cleanup_task(Duration::from_secs(60));

        let market: Arc<dyn MarketDataSource> = Arc::new(DexScreenerClient::new(config.market_data_url.clone()));
        let aggregator = QuoteAggregator::new(
            Arc::new(OnChainQuoter::new(json_rpc.clone())),
            cache,
            &config,
        )
        .with_market_data(market.clone())
        .with_telemetry(telemetry.clone());

        let simulator = match &config.simulation_url {
            Some(url) => {
                let endpoint = RpcEndpoint::new("simulation", url.clone(), 0);
                let client: Arc<dyn JsonRpc> =
                    Arc::new(RpcFailoverClient::new(vec![endpoint], config.retry.clone())?);
                Some(Arc::new(
                    SimulationGateway::new(Arc::new(AlchemySimulation::new(client)))
                        .with_telemetry(telemetry.clone()),
                ))
            }
            None => None,
        };

        Ok(Self {
            gate: Arc::new(SecurityGate::new().with_telemetry(telemetry.clone())),
            limiter: Arc::new(RateLimiter::in_memory(config.rate_limit.clone())),
            aggregator: Arc::new(aggregator),
            builder: TransactionBuilder::new(config.fee_tiers.clone()),
            classifier: RiskClassifier,
            simulator,
            chain: Arc::new(RpcChainReader::new(json_rpc)),
            rpc,
            market: Some(market),
            telemetry,
            start_time: Instant::now(),
            config,
        })
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Map an engine error onto its HTTP status and public message
fn reject(err: AppError, start: Instant) -> (StatusCode, Json<ApiResponse<()>>) {
    let status = StatusCode::from_u16(err.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        warn!(code = err.code_str(), "❌ Request failed: {}", err);
    }
    (status, Json(ApiResponse::error(ApiError::from(&err), elapsed_ms(start))))
}

/// Every free-text field goes through the input validator
fn screen(gate: &SecurityGate, fields: &[(&str, &str)]) -> AppResult<()> {
    for (name, value) in fields {
        let result = gate.validate_input(value);
        if !result.valid {
            let reason = result.reason.unwrap_or_else(|| "rejected".to_string());
            return Err(AppError::validation(format!("{}: {}", name, reason)));
        }
    }
    Ok(())
}

fn parse_address(field: &str, value: &str) -> AppResult<Address> {
    parse_address_lenient(value).ok_or_else(|| AppError::invalid_address(field))
}

// ============================================
// Health Check
// ============================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthData>> {
    let start = Instant::now();

    let data = HealthData {
        status: "healthy".to_string(),
        version: APP_VERSION.to_string(),
        uptime_seconds: state.uptime_seconds(),
    };

    Json(ApiResponse::success(data, elapsed_ms(start)))
}

pub async fn rpc_health(State(state): State<Arc<AppState>>) -> Json<ApiResponse<RpcHealthData>> {
    let start = Instant::now();
    let providers = state.rpc.check_health().await;
    let healthy_count = providers.iter().filter(|p| p.healthy).count();

    Json(ApiResponse::success(
        RpcHealthData {
            healthy_count,
            providers,
        },
        elapsed_ms(start),
    ))
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<ApiResponse<StatsData>> {
    let start = Instant::now();

    let data = StatsData {
        uptime_seconds: state.uptime_seconds(),
        telemetry: state.telemetry.get_stats(),
        quote_cache: state.aggregator.cache().stats(),
    };

    Json(ApiResponse::success(data, elapsed_ms(start)))
}

// ============================================
// Quotes
// ============================================

pub async fn get_quote(State(state): State<Arc<AppState>>, Json(req): Json<GetQuoteRequest>) -> ApiResult<QuoteData> {
    let start = Instant::now();
    quote_inner(&state, req)
        .await
        .map(|data| Json(ApiResponse::success(data, elapsed_ms(start))))
        .map_err(|e| reject(e, start))
}

async fn quote_inner(state: &AppState, req: GetQuoteRequest) -> AppResult<QuoteData> {
    screen(
        &state.gate,
        &[("tokenIn", req.token_in.as_str()), ("tokenOut", req.token_out.as_str()), ("amountIn", req.amount_in.as_str())],
    )?;

    let slippage = req.slippage.unwrap_or(state.config.default_slippage_bps);
    let intent = Intent::new(req.token_in, req.token_out, req.amount_in, slippage);
    let quote = state.aggregator.get_quote(&intent).await?;

    let market = match &state.market {
        Some(market) => market
            .snapshot(quote.token_in.address, quote.token_out.address)
            .await
            .ok(),
        None => None,
    };
    let eth_price = eth_price_usd(&quote, market.as_ref().and_then(|m| m.price_usd));
    let risk = state.classifier.assess(&RiskInputs::from_quote(
        &quote,
        slippage,
        market.as_ref(),
        eth_price,
        state.config.gas_price_gwei,
    ));

    info!(
        "{} Quote served: {} {} -> {} (risk {})",
        risk.level.emoji(),
        intent.amount,
        quote.token_in.symbol,
        quote.token_out.symbol,
        risk.score
    );

    Ok(QuoteData {
        expected_output: format_units_exact(quote.amount_out, quote.token_out.decimals),
        min_output: format_units_exact(quote.min_out, quote.token_out.decimals),
        estimated_gas: TransactionBuilder::swap_gas_limit(quote.gas_estimate).to_string(),
        fee_tier: quote.fee_tier,
        price: quote.execution_price(),
        price_impact: quote.price_impact_pct,
        token_in: TokenInfo::from(&quote.token_in),
        token_out: TokenInfo::from(&quote.token_out),
        risk,
        quote_timestamp: quote.fetched_at_ms,
    })
}

// ============================================
// Approvals
// ============================================

pub async fn build_approval(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BuildApprovalRequest>,
) -> ApiResult<TxData> {
    let start = Instant::now();
    approval_inner(&state, req)
        .map(|data| Json(ApiResponse::success(data, elapsed_ms(start))))
        .map_err(|e| reject(e, start))
}

fn approval_inner(state: &AppState, req: BuildApprovalRequest) -> AppResult<TxData> {
    let token = state.gate.require_whitelisted("token", req.token_address.as_str())?;
    let spender = state.gate.require_whitelisted("spender", req.spender_address.as_str())?;

    let entry = token_by_address(&token).ok_or_else(|| AppError::invalid_address("tokenAddress"))?;
    let amount = match &req.amount {
        Some(amount) => Some(parse_units(amount, entry.decimals)?),
        None => None,
    };

    let tx = state.builder.build_approval(token, spender, amount);
    Ok(TxData::new(&tx, Some(TransactionBuilder::approval_gas_limit())))
}

pub async fn check_approval(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckApprovalRequest>,
) -> ApiResult<ApprovalStatusData> {
    let start = Instant::now();
    check_approval_inner(&state, req)
        .await
        .map(|data| Json(ApiResponse::success(data, elapsed_ms(start))))
        .map_err(|e| reject(e, start))
}

async fn check_approval_inner(state: &AppState, req: CheckApprovalRequest) -> AppResult<ApprovalStatusData> {
    let token = state.gate.require_whitelisted("token", req.token_address.as_str())?;
    let spender = state.gate.require_whitelisted("spender", req.spender_address.as_str())?;
    let owner = parse_address("ownerAddress", req.owner_address.as_str())?;

    let entry = token_by_address(&token).ok_or_else(|| AppError::invalid_address("tokenAddress"))?;
    let required = parse_units(&req.amount, entry.decimals)?;

    let allowance = state.chain.allowance(token, owner, spender).await?;
    Ok(ApprovalStatusData {
        allowance: allowance.to_string(),
        needs_approval: allowance < required,
    })
}

// ============================================
// Swap building
// ============================================

pub async fn build_swap(State(state): State<Arc<AppState>>, Json(req): Json<BuildSwapRequest>) -> ApiResult<TxData> {
    let start = Instant::now();
    build_swap_inner(&state, req)
        .map(|data| Json(ApiResponse::success(data, elapsed_ms(start))))
        .map_err(|e| reject(e, start))
}

fn build_swap_inner(state: &AppState, req: BuildSwapRequest) -> AppResult<TxData> {
    screen(
        &state.gate,
        &[
            ("tokenIn", req.token_in.as_str()),
            ("tokenOut", req.token_out.as_str()),
            ("amountIn", req.amount_in.as_str()),
            ("minOutput", req.min_output.as_str()),
        ],
    )?;

    // A client-supplied router is only checked, never used
    let router = req.to.clone().unwrap_or_else(|| state.builder.router().to_string());
    state.gate.validate_swap_addresses(&SwapAddressCheck {
        to: router,
        token_in_symbol: req.token_in.clone(),
        token_out_symbol: req.token_out.clone(),
        spender: None,
    })?;

    let token_in = resolve_token_or_variant(&req.token_in)?;
    let token_out = resolve_token_or_variant(&req.token_out)?;
    let recipient = parse_address("from", req.from.as_str())?;

    let params = SwapParams {
        amount_in: parse_units(&req.amount_in, token_in.decimals)?,
        min_out: parse_units(&req.min_output, token_out.decimals)?,
        fee_tier: req.fee_tier,
        recipient,
        token_in,
        token_out,
    };
    let tx = state.builder.build_swap_from_params(&params)?;

    // No quoter estimate here; use the fallback limit
    Ok(TxData::new(&tx, Some(TransactionBuilder::swap_gas_limit(0))))
}

// ============================================
// Simulation
// ============================================

pub async fn simulate(State(state): State<Arc<AppState>>, Json(req): Json<SimulateRequest>) -> ApiResult<SimulationData> {
    let start = Instant::now();
    simulate_inner(&state, req)
        .await
        .map(|data| Json(ApiResponse::success(data, elapsed_ms(start))))
        .map_err(|e| reject(e, start))
}

async fn simulate_inner(state: &AppState, req: SimulateRequest) -> AppResult<SimulationData> {
    let simulator = state
        .simulator
        .as_ref()
        .ok_or_else(|| AppError::new(ErrorCode::SimulationUnavailable, "No simulation endpoint configured"))?;

    let from = parse_address("from", req.from.as_str())?;
    let to = state.gate.require_whitelisted("to", req.to.as_str())?;
    let data = Bytes::from_str(req.data.trim())
        .map_err(|_| AppError::validation("data must be hex encoded calldata"))?;
    let value = match req.value.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => {
            U256::from_str(raw).map_err(|_| AppError::invalid_amount("value must be decimal or 0x-hex wei"))?
        }
        _ => U256::ZERO,
    };

    let outcome = simulator.simulate(from, &TxRequest { to, data, value }).await?;
    Ok(match outcome {
        SimulationOutcome::Success { gas_used } => SimulationData {
            success: true,
            gas_used: Some(gas_used.to_string()),
            error: None,
            category: None,
        },
        SimulationOutcome::Failure { category, .. } => SimulationData {
            success: false,
            gas_used: None,
            error: Some(category.describe().to_string()),
            category: Some(category.as_str().to_string()),
        },
    })
}
