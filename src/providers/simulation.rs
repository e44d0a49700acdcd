//! Simulation Gateway
//!
//! Dry-runs a candidate transaction on an external forking service
//! (`alchemy_simulateAssetChanges`) and classifies any revert into a
//! fixed set of user-facing categories.
//!
//! Results are never retried automatically: a failure is reported and the
//! caller decides what to do next.

use alloy_primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::{SimulationErrorCategory, SimulationOutcome, TxRequest};
use crate::providers::rpc::{parse_hex_u64, JsonRpc};
use crate::utils::telemetry::TelemetryCollector;

/// Asset change reported by the simulator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetChange {
    pub asset_type: String,
    pub change_type: String,
    pub from: String,
    pub to: String,
    pub raw_amount: Option<String>,
    pub symbol: Option<String>,
    pub contract_address: Option<String>,
}

/// Result of `alchemy_simulateAssetChanges`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResponse {
    #[serde(default)]
    pub changes: Vec<AssetChange>,
    pub gas_used: Option<String>,
    pub error: Option<SimulationError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationError {
    pub message: String,
}

/// Forking service seam
#[async_trait]
pub trait SimulationBackend: Send + Sync {
    async fn simulate_raw(&self, from: Address, tx: &TxRequest) -> AppResult<SimulationResponse>;
}

/// Alchemy simulation over JSON-RPC
pub struct AlchemySimulation {
    rpc: Arc<dyn JsonRpc>,
}

impl AlchemySimulation {
    pub fn new(rpc: Arc<dyn JsonRpc>) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl SimulationBackend for AlchemySimulation {
    async fn simulate_raw(&self, from: Address, tx: &TxRequest) -> AppResult<SimulationResponse> {
        let params = serde_json::json!([{
            "from": from,
            "to": tx.to,
            "value": format!("{:#x}", tx.value),
            "data": tx.data,
        }]);
        let result = self.rpc.request("alchemy_simulateAssetChanges", params).await?;
        serde_json::from_value(result).map_err(|e| {
            AppError::new(ErrorCode::RpcInvalidResponse, format!("Bad simulation response: {}", e))
        })
    }
}

/// Map a raw revert message to a category
pub fn classify_revert(message: &str) -> SimulationErrorCategory {
    let msg = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| msg.contains(n));

    if has(&["insufficient funds", "insufficient balance", "exceeds balance"]) {
        SimulationErrorCategory::InsufficientFunds
    } else if has(&["stf", "allowance", "approve"]) {
        SimulationErrorCategory::MissingApproval
    } else if has(&["too little received", "slippage", "too much requested"]) {
        SimulationErrorCategory::Slippage
    } else if has(&["deadline", "transaction too old", "expired"]) {
        SimulationErrorCategory::DeadlineExceeded
    } else if has(&["liquidity", "spl", "lok"]) {
        SimulationErrorCategory::InsufficientLiquidity
    } else if has(&["revert"]) {
        SimulationErrorCategory::WouldRevert
    } else {
        SimulationErrorCategory::Unknown
    }
}

pub struct SimulationGateway {
    backend: Arc<dyn SimulationBackend>,
    telemetry: Option<Arc<TelemetryCollector>>,
}

impl SimulationGateway {
    pub fn new(backend: Arc<dyn SimulationBackend>) -> Self {
        Self {
            backend,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryCollector>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Dry-run `tx` from `from`.
    ///
    /// A revert is an `Ok(Failure)`; an unreachable simulator is `SimulationUnavailable`.
    pub async fn simulate(&self, from: Address, tx: &TxRequest) -> AppResult<SimulationOutcome> {
        let response = self.backend.simulate_raw(from, tx).await.map_err(|e| {
            warn!("⚠️ Simulation service unavailable: {}", e.code_str());
            AppError::with_source(
                ErrorCode::SimulationUnavailable,
                "Simulation service unavailable",
                e,
            )
        })?;

        let outcome = match response.error {
            Some(err) => SimulationOutcome::Failure {
                category: classify_revert(&err.message),
                message: err.message,
            },
            None => SimulationOutcome::Success {
                gas_used: response
                    .gas_used
                    .as_deref()
                    .and_then(parse_hex_u64)
                    .unwrap_or_default(),
            },
        };

        match &outcome {
            SimulationOutcome::Success { gas_used } => {
                info!("🔮 Simulation OK: {} -> {} (gas {})", from, tx.to, gas_used);
            }
            SimulationOutcome::Failure { category, message } => {
                warn!("🔮 Simulation failed [{}]: {}", category.as_str(), message);
            }
        }

        if let Some(telemetry) = &self.telemetry {
            let failure = match &outcome {
                SimulationOutcome::Failure { category, .. } => Some(*category),
                SimulationOutcome::Success { .. } => None,
            };
            telemetry.record_simulation(failure);
        }
        Ok(outcome)
    }
}
