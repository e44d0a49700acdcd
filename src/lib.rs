//! Ruster Swap Library
//!
//! Swap quote aggregation and execution orchestration for Uniswap V3 on Base:
//! - Best-price search across fee tiers and token variants
//! - Slippage-bounded minimum output and advisory risk scoring
//! - Calldata building and pre-execution simulation
//! - Resumable swap lifecycle state machine
//! - Hardened HTTP API (input screening, rate limiting, address whitelist)

pub mod api;
pub mod core;
pub mod models;
pub mod providers;
pub mod utils;

pub use crate::core::{QuoteAggregator, RiskClassifier, SecurityGate, SwapSession, SwapState, TransactionBuilder};
pub use models::{AppError, AppResult, ErrorCode, Intent, Quote, RiskAssessment, RiskLevel, SwapConfig};
pub use providers::{RpcFailoverClient, SimulationGateway};
