//! Risk Scoring Module
//! Advisory 0-100 risk score for a quoted swap
//!
//! Six independent factors, each applied only when its input is known:
//! - Trade notional (USD)
//! - Price impact
//! - Slippage tolerance
//! - 24h volatility
//! - Trade size relative to pool liquidity
//! - Gas cost relative to notional
//!
//! A critical level blocks automatic execution; the user may override explicitly.

use serde::{Deserialize, Serialize};

use crate::models::types::{MarketSnapshot, Quote, RiskAssessment, RiskFactor, RiskLevel};
use crate::utils::constants::{format_units, WETH};

/// Raw inputs for classification. `None` skips the factor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskInputs {
    pub notional_usd: Option<f64>,
    pub price_impact_pct: Option<f64>,
    pub slippage_bps: Option<u32>,
    pub volatility_24h_pct: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub gas_cost_usd: Option<f64>,
}

impl RiskInputs {
    /// Collect inputs from a quote plus optional market context.
    ///
    /// Gas is priced at the configured `gas_price_gwei`, not a live oracle.
    pub fn from_quote(
        quote: &Quote,
        slippage_bps: u32,
        market: Option<&MarketSnapshot>,
        eth_price_usd: Option<f64>,
        gas_price_gwei: f64,
    ) -> Self {
        let gas_cost_usd = eth_price_usd.map(|eth| quote.gas_estimate as f64 * gas_price_gwei * 1e-9 * eth);
        Self {
            notional_usd: quote.notional_usd,
            price_impact_pct: Some(quote.price_impact_pct),
            slippage_bps: Some(slippage_bps),
            volatility_24h_pct: market.and_then(|m| m.price_change_24h_pct),
            liquidity_usd: market.and_then(|m| m.liquidity_usd),
            gas_cost_usd,
        }
    }
}

/// ETH/USD from the market snapshot when the input is ETH, else implied by a stable output
pub fn eth_price_usd(quote: &Quote, token_in_price: Option<f64>) -> Option<f64> {
    if quote.token_in.address == WETH {
        return token_in_price.or_else(|| {
            let amount = format_units(quote.amount_in, quote.token_in.decimals);
            quote.notional_usd.filter(|_| amount > 0.0).map(|n| n / amount)
        });
    }
    if quote.token_out.address == WETH {
        let amount = format_units(quote.amount_out, quote.token_out.decimals);
        return quote.notional_usd.filter(|_| amount > 0.0).map(|n| n / amount);
    }
    None
}

/// Stateless classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskClassifier;

impl RiskClassifier {
    pub fn assess(&self, inputs: &RiskInputs) -> RiskAssessment {
        let mut builder = RiskAssessmentBuilder::new();
        if let Some(n) = inputs.notional_usd {
            builder = builder.with_trade_size(n);
        }
        if let Some(p) = inputs.price_impact_pct {
            builder = builder.with_price_impact(p);
        }
        if let Some(s) = inputs.slippage_bps {
            builder = builder.with_slippage(s);
        }
        if let Some(v) = inputs.volatility_24h_pct {
            builder = builder.with_volatility(v);
        }
        if let (Some(n), Some(l)) = (inputs.notional_usd, inputs.liquidity_usd) {
            builder = builder.with_liquidity(n, l);
        }
        if let (Some(n), Some(g)) = (inputs.notional_usd, inputs.gas_cost_usd) {
            builder = builder.with_gas_cost(g, n);
        }
        builder.build()
    }
}

/// Level implied by the total score alone
pub fn level_for_score(score: u8) -> RiskLevel {
    if score >= 70 {
        RiskLevel::Critical
    } else if score >= 40 {
        RiskLevel::High
    } else if score >= 20 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn factor(name: &str, severity: RiskLevel, weight: u8, detail: String) -> RiskFactor {
    RiskFactor {
        name: name.to_string(),
        severity,
        weight,
        detail,
    }
}

/// Accumulates triggered factors
#[derive(Debug, Default)]
pub struct RiskAssessmentBuilder {
    factors: Vec<RiskFactor>,
    recommendations: Vec<String>,
}

impl RiskAssessmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, triggered: Option<(RiskFactor, &str)>) -> Self {
        if let Some((f, advice)) = triggered {
            self.recommendations.push(advice.to_string());
            self.factors.push(f);
        }
        self
    }

    pub fn with_price_impact(self, impact_pct: f64) -> Self {
        let band = if impact_pct > 10.0 {
            Some((RiskLevel::Critical, 50))
        } else if impact_pct > 5.0 {
            Some((RiskLevel::High, 30))
        } else if impact_pct > 2.0 {
            Some((RiskLevel::Medium, 15))
        } else if impact_pct > 1.0 {
            Some((RiskLevel::Low, 5))
        } else {
            None
        };
        self.push(band.map(|(sev, w)| {
            (
                factor("price_impact", sev, w, format!("Estimated price impact {:.2}%", impact_pct)),
                "Split the trade into smaller swaps to reduce price impact.",
            )
        }))
    }

    pub fn with_slippage(self, slippage_bps: u32) -> Self {
        let band = if slippage_bps > 1000 {
            Some((RiskLevel::Critical, 40))
        } else if slippage_bps > 500 {
            Some((RiskLevel::High, 25))
        } else if slippage_bps > 200 {
            Some((RiskLevel::Medium, 10))
        } else if slippage_bps > 100 {
            Some((RiskLevel::Low, 5))
        } else {
            None
        };
        self.push(band.map(|(sev, w)| {
            (
                factor(
                    "slippage_tolerance",
                    sev,
                    w,
                    format!("Slippage tolerance {}bps ({:.2}%)", slippage_bps, slippage_bps as f64 / 100.0),
                ),
                "Lower the slippage tolerance to limit MEV exposure.",
            )
        }))
    }

    /// Uses the magnitude of the 24h change
    pub fn with_volatility(self, change_24h_pct: f64) -> Self {
        let magnitude = change_24h_pct.abs();
        let band = if magnitude > 25.0 {
            Some((RiskLevel::Critical, 35))
        } else if magnitude > 15.0 {
            Some((RiskLevel::High, 20))
        } else if magnitude > 8.0 {
            Some((RiskLevel::Medium, 10))
        } else if magnitude > 4.0 {
            Some((RiskLevel::Low, 5))
        } else {
            None
        };
        self.push(band.map(|(sev, w)| {
            (
                factor("volatility", sev, w, format!("24h price change {:+.2}%", change_24h_pct)),
                "Market is volatile; re-quote right before executing.",
            )
        }))
    }

    pub fn with_trade_size(self, notional_usd: f64) -> Self {
        let band = if notional_usd > 1_000_000.0 {
            Some((RiskLevel::High, 25))
        } else if notional_usd > 100_000.0 {
            Some((RiskLevel::Medium, 15))
        } else if notional_usd > 10_000.0 {
            Some((RiskLevel::Low, 5))
        } else {
            None
        };
        self.push(band.map(|(sev, w)| {
            (
                factor("trade_size", sev, w, format!("Trade notional ${:.0}", notional_usd)),
                "Large trade; consider a test swap with a smaller amount first.",
            )
        }))
    }

    /// Trade notional as a share of pool liquidity
    pub fn with_liquidity(self, notional_usd: f64, liquidity_usd: f64) -> Self {
        if liquidity_usd <= 0.0 {
            return self.push(Some((
                factor("liquidity_ratio", RiskLevel::Critical, 50, "Pool reports no liquidity".to_string()),
                "Pool liquidity is unknown or empty; avoid this route.",
            )));
        }
        let ratio_pct = notional_usd / liquidity_usd * 100.0;
        let band = if ratio_pct > 10.0 {
            Some((RiskLevel::Critical, 50))
        } else if ratio_pct > 5.0 {
            Some((RiskLevel::High, 30))
        } else if ratio_pct > 1.0 {
            Some((RiskLevel::Medium, 15))
        } else if ratio_pct > 0.5 {
            Some((RiskLevel::Low, 5))
        } else {
            None
        };
        self.push(band.map(|(sev, w)| {
            (
                factor(
                    "liquidity_ratio",
                    sev,
                    w,
                    format!("Trade is {:.2}% of pool liquidity (${:.0})", ratio_pct, liquidity_usd),
                ),
                "Trade is large relative to pool depth; reduce the amount.",
            )
        }))
    }

    pub fn with_gas_cost(self, gas_cost_usd: f64, notional_usd: f64) -> Self {
        if notional_usd <= 0.0 {
            return self;
        }
        let ratio_pct = gas_cost_usd / notional_usd * 100.0;
        let band = if ratio_pct > 10.0 {
            Some((RiskLevel::High, 20))
        } else if ratio_pct > 5.0 {
            Some((RiskLevel::Medium, 10))
        } else if ratio_pct > 2.0 {
            Some((RiskLevel::Low, 5))
        } else {
            None
        };
        self.push(band.map(|(sev, w)| {
            (
                factor(
                    "gas_cost",
                    sev,
                    w,
                    format!("Gas ≈ ${:.2} ({:.1}% of trade)", gas_cost_usd, ratio_pct),
                ),
                "Gas is a large share of this trade; swap a larger amount or wait.",
            )
        }))
    }

    pub fn build(self) -> RiskAssessment {
        let total: u32 = self.factors.iter().map(|f| f.weight as u32).sum();
        let score = total.min(100) as u8;

        let top_severity = self.factors.iter().map(|f| f.severity).max();
        let level = match top_severity {
            Some(sev) => sev.max(level_for_score(score)),
            None => level_for_score(score),
        };

        let mut recommendations = self.recommendations;
        if top_severity >= Some(RiskLevel::High) {
            recommendations.push(
                "High-risk conditions detected: review the trade carefully before confirming.".to_string(),
            );
        }
        if level == RiskLevel::Critical {
            recommendations.push("Automatic execution is blocked; explicit confirmation is required.".to_string());
        }

        RiskAssessment {
            score,
            level,
            factors: self.factors,
            recommendations,
            should_proceed: level != RiskLevel::Critical,
        }
    }
}
