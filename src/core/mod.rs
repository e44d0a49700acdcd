//! Core Module - Quote, Risk & Lifecycle Engine
//!
//! Security gate, quote aggregation, risk scoring, transaction building
//! and the swap lifecycle state machine.

pub mod action;
pub mod lifecycle;
pub mod quote;
pub mod rate_limit;
pub mod risk_score;
pub mod security;
pub mod tx_builder;

pub use action::{parse_action, AgentAction};
pub use lifecycle::{SessionDeps, SessionSettings, SwapEvent, SwapSession, SwapState, SwapStateKind};
pub use quote::{OnChainQuoter, QuoteAggregator, QuoteSource};
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use risk_score::{RiskClassifier, RiskInputs};
pub use security::{derive_token_address, SecurityGate, SwapAddressCheck};
pub use tx_builder::TransactionBuilder;
