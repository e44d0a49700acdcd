//! Type definitions for the swap engine
//! Core data structures shared by quoting, risk scoring, simulation and the lifecycle

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::utils::constants::format_units;

// ============================================
// Intent & tokens
// ============================================

/// A user's trade intent as produced by the intent parser or the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub token_in: String,
    pub token_out: String,
    /// Human-readable decimal amount of `token_in`
    pub amount: String,
    pub slippage_bps: u32,
}

impl Intent {
    pub fn new(
        token_in: impl Into<String>,
        token_out: impl Into<String>,
        amount: impl Into<String>,
        slippage_bps: u32,
    ) -> Self {
        Self {
            token_in: token_in.into(),
            token_out: token_out.into(),
            amount: amount.into(),
            slippage_bps,
        }
    }

    /// Cache / idempotency key for this intent
    pub fn key(&self) -> QuoteKey {
        QuoteKey {
            token_in: self.token_in.to_uppercase(),
            token_out: self.token_out.to_uppercase(),
            amount: self.amount.trim().to_string(),
            slippage_bps: self.slippage_bps,
        }
    }
}

/// One concrete on-chain representation of a token symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenVariant {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
    /// True for the chain's native asset (routed as its wrapped form)
    pub is_native: bool,
}

/// Identity of a quote request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteKey {
    pub token_in: String,
    pub token_out: String,
    pub amount: String,
    pub slippage_bps: u32,
}

impl QuoteKey {
    pub fn cache_key(&self) -> String {
        format!(
            "quote:{}:{}:{}:{}",
            self.token_in, self.token_out, self.amount, self.slippage_bps
        )
    }
}

// ============================================
// Quote
// ============================================

/// Best executable quote across fee tiers and token variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub key: QuoteKey,
    pub token_in: TokenVariant,
    pub token_out: TokenVariant,
    /// Raw input amount in `token_in` base units
    pub amount_in: U256,
    /// Raw expected output in `token_out` base units
    pub amount_out: U256,
    /// `floor(amount_out * (10000 - slippage_bps) / 10000)`
    pub min_out: U256,
    pub fee_tier: u32,
    pub gas_estimate: u64,
    /// Estimated price impact in percent (0.5 = 0.5%)
    pub price_impact_pct: f64,
    /// Trade size in USD when it could be derived
    pub notional_usd: Option<f64>,
    /// Unix milliseconds at which the quote was fetched
    pub fetched_at_ms: i64,
}

impl Quote {
    /// Output per unit of input, in human units
    pub fn execution_price(&self) -> f64 {
        let amount_in = format_units(self.amount_in, self.token_in.decimals);
        if amount_in == 0.0 {
            return 0.0;
        }
        format_units(self.amount_out, self.token_out.decimals) / amount_in
    }

    /// Age in whole seconds relative to `now_ms`
    pub fn age_secs(&self, now_ms: i64) -> u64 {
        (now_ms.saturating_sub(self.fetched_at_ms).max(0) / 1000) as u64
    }

    pub fn is_fresh(&self, now_ms: i64, ttl_secs: u64) -> bool {
        now_ms.saturating_sub(self.fetched_at_ms) <= (ttl_secs as i64) * 1000
    }
}

// ============================================
// Risk
// ============================================

/// Risk level classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            RiskLevel::Low => "✅",
            RiskLevel::Medium => "🟡",
            RiskLevel::High => "🔴",
            RiskLevel::Critical => "💀",
        }
    }
}

/// Single triggered factor contributing to the risk score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    pub severity: RiskLevel,
    pub weight: u8,
    pub detail: String,
}

/// Advisory risk assessment attached to a quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// 0..=100
    pub score: u8,
    pub level: RiskLevel,
    pub factors: Vec<RiskFactor>,
    pub recommendations: Vec<String>,
    /// `level != critical`
    pub should_proceed: bool,
}

// ============================================
// Transactions & simulation
// ============================================

/// Unsigned transaction request handed to the wallet boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRequest {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

/// Classified simulation failure reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationErrorCategory {
    InsufficientFunds,
    WouldRevert,
    Slippage,
    InsufficientLiquidity,
    DeadlineExceeded,
    MissingApproval,
    Unknown,
}

impl SimulationErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientFunds => "insufficient_funds",
            Self::WouldRevert => "would_revert",
            Self::Slippage => "slippage",
            Self::InsufficientLiquidity => "insufficient_liquidity",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::MissingApproval => "missing_approval",
            Self::Unknown => "unknown",
        }
    }

    /// User-facing explanation
    pub fn describe(&self) -> &'static str {
        match self {
            Self::InsufficientFunds => "insufficient balance to cover amount and gas",
            Self::WouldRevert => "transaction would revert",
            Self::Slippage => "price moved beyond slippage tolerance",
            Self::InsufficientLiquidity => "pool liquidity is insufficient",
            Self::DeadlineExceeded => "transaction deadline exceeded",
            Self::MissingApproval => "token approval is missing or too low",
            Self::Unknown => "unknown failure",
        }
    }
}

/// Result of a pre-execution dry run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SimulationOutcome {
    Success {
        gas_used: u64,
    },
    Failure {
        category: SimulationErrorCategory,
        message: String,
    },
}

impl SimulationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SimulationOutcome::Success { .. })
    }
}

/// Mined transaction receipt (subset)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub success: bool,
    pub block_number: u64,
    pub gas_used: u64,
}

// ============================================
// Diagnostics
// ============================================

/// Per-provider RPC health probe result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub name: String,
    /// URL with credentials masked
    pub url: String,
    pub priority: u32,
    pub healthy: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Market snapshot used as optional risk inputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub price_usd: Option<f64>,
    pub price_change_24h_pct: Option<f64>,
    pub liquidity_usd: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(symbol: &str, decimals: u8) -> TokenVariant {
        TokenVariant {
            symbol: symbol.to_string(),
            address: Address::ZERO,
            decimals,
            is_native: false,
        }
    }

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn test_intent_key_normalizes_symbols() {
        let a = Intent::new("eth", "usdc", " 1.5 ", 50).key();
        let b = Intent::new("ETH", "USDC", "1.5", 50).key();
        assert_eq!(a, b);
        assert_eq!(a.cache_key(), "quote:ETH:USDC:1.5:50");
    }

    #[test]
    fn test_quote_freshness() {
        let quote = Quote {
            key: Intent::new("ETH", "USDC", "1", 50).key(),
            token_in: variant("ETH", 18),
            token_out: variant("USDC", 6),
            amount_in: U256::from(10u64).pow(U256::from(18u64)),
            amount_out: U256::from(2_500_000_000u64),
            min_out: U256::from(2_487_500_000u64),
            fee_tier: 500,
            gas_estimate: 120_000,
            price_impact_pct: 0.1,
            notional_usd: Some(2500.0),
            fetched_at_ms: 1_000_000,
        };
        assert!(quote.is_fresh(1_030_000, 30));
        assert!(!quote.is_fresh(1_030_001, 30));
        assert_eq!(quote.age_secs(1_045_000), 45);
        assert!((quote.execution_price() - 2500.0).abs() < 1e-6);
    }

    #[test]
    fn test_simulation_outcome_serialization() {
        let outcome = SimulationOutcome::Failure {
            category: SimulationErrorCategory::MissingApproval,
            message: "STF".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["category"], "missing_approval");
    }
}
