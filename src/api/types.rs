//! API Request/Response Types
//!
//! Request and response bodies use camelCase field names.

use serde::{Deserialize, Serialize};

use crate::models::errors::{AppError, ErrorCode};
use crate::models::types::{ProviderHealth, RiskAssessment, TokenVariant, TxRequest};
use crate::utils::cache::CacheStats;
use crate::utils::telemetry::TelemetryStats;

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    pub latency_ms: f64,
    pub timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, latency_ms: f64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            latency_ms,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(error: ApiError, latency_ms: f64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            latency_ms,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// API Error
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn rate_limited(retry_after: u64) -> Self {
        Self {
            code: ErrorCode::RateLimitExceeded.as_str().to_string(),
            message: format!("Rate limit exceeded. Retry after {} seconds", retry_after),
            details: Some(format!("retry_after: {}", retry_after)),
        }
    }
}

/// Only the public message crosses the API boundary
impl From<&AppError> for ApiError {
    fn from(err: &AppError) -> Self {
        let details = match err.code {
            ErrorCode::SimulationFailed(category) => Some(category.as_str().to_string()),
            _ => None,
        };
        Self {
            code: err.code_str().to_string(),
            message: err.public_message(),
            details,
        }
    }
}

// ============================================
// Quotes
// ============================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetQuoteRequest {
    pub token_in: String,
    pub token_out: String,
    /// Human-readable decimal amount
    pub amount_in: String,
    /// Basis points; server default when absent
    #[serde(default)]
    pub slippage: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub symbol: String,
    pub address: String,
    pub decimals: u8,
}

impl From<&TokenVariant> for TokenInfo {
    fn from(variant: &TokenVariant) -> Self {
        Self {
            symbol: variant.symbol.clone(),
            address: variant.address.to_checksum(None),
            decimals: variant.decimals,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteData {
    pub expected_output: String,
    pub min_output: String,
    pub estimated_gas: String,
    pub fee_tier: u32,
    /// Output units per input unit
    pub price: f64,
    pub price_impact: f64,
    pub token_in: TokenInfo,
    pub token_out: TokenInfo,
    pub risk: RiskAssessment,
    pub quote_timestamp: i64,
}

// ============================================
// Transactions
// ============================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildApprovalRequest {
    pub token_address: String,
    pub spender_address: String,
    /// Human-readable amount; unlimited when absent
    #[serde(default)]
    pub amount: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckApprovalRequest {
    pub token_address: String,
    pub owner_address: String,
    pub spender_address: String,
    pub amount: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStatusData {
    /// Raw base units
    pub allowance: String,
    pub needs_approval: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSwapRequest {
    pub token_in: String,
    pub token_out: String,
    pub amount_in: String,
    pub fee_tier: u32,
    /// Human-readable amount of `token_out`
    pub min_output: String,
    pub from: String,
    /// Optional router hint; must be whitelisted and is never used for encoding
    #[serde(default)]
    pub to: Option<String>,
}

/// Unsigned transaction for the wallet
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxData {
    pub to: String,
    pub data: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
}

impl TxData {
    pub fn new(tx: &TxRequest, gas: Option<u64>) -> Self {
        Self {
            to: tx.to.to_checksum(None),
            data: tx.data.to_string(),
            value: tx.value.to_string(),
            gas: gas.map(|g| g.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateRequest {
    pub from: String,
    pub to: String,
    pub data: String,
    /// Decimal or 0x-hex wei
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationData {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

// ============================================
// Diagnostics
// ============================================

#[derive(Debug, Serialize)]
pub struct HealthData {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct RpcHealthData {
    pub healthy_count: usize,
    pub providers: Vec<ProviderHealth>,
}

#[derive(Debug, Serialize)]
pub struct StatsData {
    pub uptime_seconds: u64,
    pub telemetry: TelemetryStats,
    pub quote_cache: CacheStats,
}
