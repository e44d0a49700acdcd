//! Swap Lifecycle State Machine
//!
//! ```text
//! input → parsed → quote → [approval_needed → approving] → simulated → executing → complete
//! ```
//!
//! - `SwapState::apply` is a pure reducer over a typed transition table
//! - `error` is an excursion: it carries the stable state to resume from,
//!   always the state preceding the failed operation
//! - `executing` is entered only from `simulated`, and only once per simulation
//! - Superseded quote requests are cancelled and their late results discarded
//!   by generation number and quote key
//! - Simulation and approval results are applied only if no newer intent or
//!   cancel was accepted while they ran
//!
//! `SwapSession` drives the reducer against the real collaborators and
//! publishes every state on a `watch` channel for the UI.

use alloy_primitives::B256;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::core::action::AgentAction;
use crate::core::quote::QuoteAggregator;
use crate::core::rate_limit::now_ms;
use crate::core::risk_score::{eth_price_usd, RiskClassifier, RiskInputs};
use crate::core::security::SecurityGate;
use crate::core::tx_builder::TransactionBuilder;
use crate::models::config::SwapConfig;
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::{Intent, Quote, RiskAssessment, SimulationOutcome, TxReceipt, TxRequest};
use crate::providers::chain::{wait_for_receipt, ChainReader, WalletSigner};
use crate::providers::market::MarketDataSource;
use crate::providers::simulation::SimulationGateway;
use crate::utils::telemetry::TelemetryCollector;

// ============================================
// States & events
// ============================================

/// An intent together with its selected quote and risk assessment
#[derive(Debug, Clone, PartialEq)]
pub struct PricedIntent {
    pub intent: Intent,
    pub quote: Quote,
    pub risk: RiskAssessment,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SwapState {
    Input,
    Parsed {
        intent: Intent,
    },
    Quote(PricedIntent),
    ApprovalNeeded {
        priced: PricedIntent,
        approval_tx: TxRequest,
    },
    Approving {
        priced: PricedIntent,
        approval_tx: TxRequest,
        approval_hash: B256,
    },
    Simulated {
        priced: PricedIntent,
        swap_tx: TxRequest,
        gas_used: u64,
    },
    Executing {
        priced: PricedIntent,
        swap_tx: TxRequest,
        gas_used: u64,
        tx_hash: Option<B256>,
    },
    Complete {
        priced: PricedIntent,
        receipt: TxReceipt,
    },
    Error {
        error: AppError,
        /// Never itself an `Error`
        resume: Box<SwapState>,
    },
}

/// Payload-free state tag for the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStateKind {
    Input,
    Parsed,
    Quote,
    ApprovalNeeded,
    Approving,
    Simulated,
    Executing,
    Complete,
    Error,
}

#[derive(Debug, Clone)]
pub enum SwapEvent {
    IntentReceived(Intent),
    QuoteReady(PricedIntent),
    QuoteFailed(AppError),
    ApprovalRequired(TxRequest),
    ApprovalSubmitted(B256),
    ApprovalFailed(AppError),
    SimulationSucceeded { swap_tx: TxRequest, gas_used: u64 },
    SimulationFailed(AppError),
    QuoteExpired(AppError),
    ExecutionStarted,
    TransactionSubmitted(B256),
    ExecutionFailed(AppError),
    ReceiptConfirmed(TxReceipt),
    Dismiss,
    Cancel,
    Reset,
}

impl SwapEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SwapEvent::IntentReceived(_) => "intent_received",
            SwapEvent::QuoteReady(_) => "quote_ready",
            SwapEvent::QuoteFailed(_) => "quote_failed",
            SwapEvent::ApprovalRequired(_) => "approval_required",
            SwapEvent::ApprovalSubmitted(_) => "approval_submitted",
            SwapEvent::ApprovalFailed(_) => "approval_failed",
            SwapEvent::SimulationSucceeded { .. } => "simulation_succeeded",
            SwapEvent::SimulationFailed(_) => "simulation_failed",
            SwapEvent::QuoteExpired(_) => "quote_expired",
            SwapEvent::ExecutionStarted => "execution_started",
            SwapEvent::TransactionSubmitted(_) => "transaction_submitted",
            SwapEvent::ExecutionFailed(_) => "execution_failed",
            SwapEvent::ReceiptConfirmed(_) => "receipt_confirmed",
            SwapEvent::Dismiss => "dismiss",
            SwapEvent::Cancel => "cancel",
            SwapEvent::Reset => "reset",
        }
    }
}

fn fail(error: AppError, resume: SwapState) -> SwapState {
    SwapState::Error {
        error,
        resume: Box::new(resume),
    }
}

impl SwapState {
    pub fn kind(&self) -> SwapStateKind {
        match self {
            SwapState::Input => SwapStateKind::Input,
            SwapState::Parsed { .. } => SwapStateKind::Parsed,
            SwapState::Quote(_) => SwapStateKind::Quote,
            SwapState::ApprovalNeeded { .. } => SwapStateKind::ApprovalNeeded,
            SwapState::Approving { .. } => SwapStateKind::Approving,
            SwapState::Simulated { .. } => SwapStateKind::Simulated,
            SwapState::Executing { .. } => SwapStateKind::Executing,
            SwapState::Complete { .. } => SwapStateKind::Complete,
            SwapState::Error { .. } => SwapStateKind::Error,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.kind() {
            SwapStateKind::Input => "input",
            SwapStateKind::Parsed => "parsed",
            SwapStateKind::Quote => "quote",
            SwapStateKind::ApprovalNeeded => "approval_needed",
            SwapStateKind::Approving => "approving",
            SwapStateKind::Simulated => "simulated",
            SwapStateKind::Executing => "executing",
            SwapStateKind::Complete => "complete",
            SwapStateKind::Error => "error",
        }
    }

    /// The state operations act on: an error resolves to its resume point
    pub fn stable(&self) -> &SwapState {
        match self {
            SwapState::Error { resume, .. } => resume.as_ref(),
            other => other,
        }
    }

    pub fn intent(&self) -> Option<&Intent> {
        match self.stable() {
            SwapState::Parsed { intent } => Some(intent),
            SwapState::Quote(p)
            | SwapState::ApprovalNeeded { priced: p, .. }
            | SwapState::Approving { priced: p, .. }
            | SwapState::Simulated { priced: p, .. }
            | SwapState::Executing { priced: p, .. }
            | SwapState::Complete { priced: p, .. } => Some(&p.intent),
            SwapState::Input | SwapState::Error { .. } => None,
        }
    }

    pub fn priced(&self) -> Option<&PricedIntent> {
        match self.stable() {
            SwapState::Quote(p)
            | SwapState::ApprovalNeeded { priced: p, .. }
            | SwapState::Approving { priced: p, .. }
            | SwapState::Simulated { priced: p, .. }
            | SwapState::Executing { priced: p, .. }
            | SwapState::Complete { priced: p, .. } => Some(p),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&AppError> {
        match self {
            SwapState::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    /// New intents and parameter changes never touch an in-flight swap
    fn accepts_intent(&self) -> bool {
        matches!(
            self,
            SwapState::Input
                | SwapState::Parsed { .. }
                | SwapState::Quote(_)
                | SwapState::ApprovalNeeded { .. }
                | SwapState::Complete { .. }
        )
    }

    /// Pure transition function
    pub fn apply(self, event: SwapEvent) -> AppResult<SwapState> {
        use SwapEvent as E;
        use SwapState as S;

        match (self, event) {
            (S::Error { resume, .. }, E::Dismiss) => Ok(*resume),
            (S::Error { resume, .. }, event) => (*resume).apply(event),

            (state, E::IntentReceived(intent)) if state.accepts_intent() => Ok(S::Parsed { intent }),
            (state, E::Cancel) if !matches!(state, S::Executing { .. }) => Ok(S::Input),

            // Results for a superseded intent fall through to the rejection arm
            (S::Parsed { intent }, E::QuoteReady(priced)) if priced.quote.key == intent.key() => {
                Ok(S::Quote(priced))
            }
            (S::Parsed { intent }, E::QuoteFailed(error)) => Ok(fail(error, S::Parsed { intent })),

            (S::Quote(priced), E::ApprovalRequired(approval_tx)) => {
                Ok(S::ApprovalNeeded { priced, approval_tx })
            }
            (S::Quote(priced), E::SimulationSucceeded { swap_tx, gas_used })
            | (S::Approving { priced, .. }, E::SimulationSucceeded { swap_tx, gas_used }) => Ok(S::Simulated {
                priced,
                swap_tx,
                gas_used,
            }),
            (S::Quote(priced), E::SimulationFailed(error))
            | (S::Approving { priced, .. }, E::SimulationFailed(error)) => Ok(fail(error, S::Quote(priced))),

            (S::ApprovalNeeded { priced, approval_tx }, E::ApprovalSubmitted(approval_hash)) => {
                Ok(S::Approving {
                    priced,
                    approval_tx,
                    approval_hash,
                })
            }
            (S::ApprovalNeeded { priced, approval_tx }, E::ApprovalFailed(error))
            | (S::Approving { priced, approval_tx, .. }, E::ApprovalFailed(error)) => {
                Ok(fail(error, S::ApprovalNeeded { priced, approval_tx }))
            }

            (S::Quote(priced), E::QuoteExpired(error))
            | (S::ApprovalNeeded { priced, .. }, E::QuoteExpired(error))
            | (S::Approving { priced, .. }, E::QuoteExpired(error))
            | (S::Simulated { priced, .. }, E::QuoteExpired(error)) => Ok(fail(
                error,
                S::Parsed {
                    intent: priced.intent,
                },
            )),

            (S::Simulated { priced, swap_tx, gas_used }, E::ExecutionStarted) => Ok(S::Executing {
                priced,
                swap_tx,
                gas_used,
                tx_hash: None,
            }),
            (
                S::Executing {
                    priced,
                    swap_tx,
                    gas_used,
                    tx_hash: None,
                },
                E::TransactionSubmitted(hash),
            ) => Ok(S::Executing {
                priced,
                swap_tx,
                gas_used,
                tx_hash: Some(hash),
            }),
            // Nothing was broadcast: the simulation still stands
            (
                S::Executing {
                    priced,
                    swap_tx,
                    gas_used,
                    tx_hash: None,
                },
                E::ExecutionFailed(error),
            ) => Ok(fail(
                error,
                S::Simulated {
                    priced,
                    swap_tx,
                    gas_used,
                },
            )),
            // Broadcast happened: chain state moved, re-simulate from the quote
            (
                S::Executing {
                    priced,
                    tx_hash: Some(_),
                    ..
                },
                E::ExecutionFailed(error),
            ) => Ok(fail(error, S::Quote(priced))),
            (
                S::Executing {
                    priced,
                    tx_hash: Some(_),
                    ..
                },
                E::ReceiptConfirmed(receipt),
            ) => Ok(S::Complete { priced, receipt }),

            (S::Complete { .. }, E::Reset) => Ok(S::Input),

            (state, event) => Err(AppError::invalid_transition(state.name(), event.name())),
        }
    }
}

// ============================================
// Cancellation
// ============================================

/// Cancels the paired `CancelToken`s
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        // No receivers left means nobody to cancel
        let _ = self.tx.send(true);
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; never resolves if the handle is dropped uncancelled
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

// ============================================
// Session
// ============================================

/// External collaborators of a session
#[derive(Clone)]
pub struct SessionDeps {
    pub aggregator: Arc<QuoteAggregator>,
    pub builder: TransactionBuilder,
    pub simulator: Arc<SimulationGateway>,
    pub chain: Arc<dyn ChainReader>,
    pub wallet: Arc<dyn WalletSigner>,
    pub gate: Arc<SecurityGate>,
    pub market: Option<Arc<dyn MarketDataSource>>,
    pub telemetry: Option<Arc<TelemetryCollector>>,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub default_slippage_bps: u32,
    pub quote_ttl_secs: u64,
    pub gas_price_gwei: f64,
    pub auto_reset: Duration,
    pub receipt_poll_interval: Duration,
    pub receipt_timeout: Duration,
}

impl From<&SwapConfig> for SessionSettings {
    fn from(config: &SwapConfig) -> Self {
        Self {
            default_slippage_bps: config.default_slippage_bps,
            quote_ttl_secs: config.quote_ttl_secs,
            gas_price_gwei: config.gas_price_gwei,
            auto_reset: Duration::from_millis(config.auto_reset_ms),
            receipt_poll_interval: Duration::from_millis(config.receipt_poll_interval_ms),
            receipt_timeout: Duration::from_secs(config.receipt_timeout_secs),
        }
    }
}

/// One user's swap lifecycle
#[derive(Clone)]
pub struct SwapSession {
    deps: SessionDeps,
    settings: SessionSettings,
    classifier: RiskClassifier,
    state: Arc<watch::Sender<SwapState>>,
    generation: Arc<AtomicU64>,
    /// Cancel handle of the newest quote request and its generation
    in_flight: Arc<Mutex<Option<(u64, CancelHandle)>>>,
}

impl SwapSession {
    pub fn new(deps: SessionDeps, settings: SessionSettings) -> Self {
        let (state, _) = watch::channel(SwapState::Input);
        Self {
            deps,
            settings,
            classifier: RiskClassifier,
            state: Arc::new(state),
            generation: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> SwapState {
        self.state.borrow().clone()
    }

    /// Read-only view for the UI
    pub fn subscribe(&self) -> watch::Receiver<SwapState> {
        self.state.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Apply `event` atomically; on rejection the state is untouched
    fn transition(&self, event: SwapEvent) -> AppResult<SwapState> {
        self.transition_if(None, event)
    }

    /// Same as `transition`, discarding the event if a newer generation started
    fn transition_if(&self, generation: Option<u64>, event: SwapEvent) -> AppResult<SwapState> {
        let mut outcome: AppResult<SwapState> = Err(AppError::cancelled());
        let event_name = event.name();

        self.state.send_if_modified(|current| {
            if let Some(expected) = generation {
                if self.generation.load(Ordering::SeqCst) != expected {
                    debug!("🚫 Discarding {} from superseded request #{}", event_name, expected);
                    return false;
                }
            }
            match current.clone().apply(event) {
                Ok(next) => {
                    debug!("🔁 {} --{}--> {}", current.name(), event_name, next.name());
                    *current = next.clone();
                    outcome = Ok(next);
                    true
                }
                Err(e) => {
                    warn!("⛔ Rejected {} in state {}", event_name, current.name());
                    outcome = Err(e);
                    false
                }
            }
        });
        outcome
    }

    /// Apply an event that supersedes every request in flight.
    /// The generation advances only if the reducer accepts the event.
    fn supersede(&self, event: SwapEvent) -> AppResult<(u64, SwapState)> {
        let mut outcome: AppResult<(u64, SwapState)> = Err(AppError::cancelled());
        let event_name = event.name();

        self.state.send_if_modified(|current| match current.clone().apply(event) {
            Ok(next) => {
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                debug!("🔁 {} --{}--> {} (#{})", current.name(), event_name, next.name(), generation);
                *current = next.clone();
                outcome = Ok((generation, next));
                true
            }
            Err(e) => {
                warn!("⛔ Rejected {} in state {}", event_name, current.name());
                outcome = Err(e);
                false
            }
        });
        outcome
    }

    /// Cancel older quote requests and register one for `generation`
    fn register_request(&self, generation: u64) -> CancelToken {
        let (handle, token) = cancel_pair();
        if let Ok(mut slot) = self.in_flight.lock() {
            let newer_registered = slot.as_ref().is_some_and(|(registered, _)| *registered > generation);
            if newer_registered {
                handle.cancel();
            } else if let Some((_, previous)) = slot.replace((generation, handle)) {
                previous.cancel();
            }
        }
        token
    }

    // ============================================
    // Operations
    // ============================================

    /// Price `intent`, superseding any quote still in flight
    pub async fn fetch_quote(&self, intent: Intent) -> AppResult<SwapState> {
        let (generation, _) = self.supersede(SwapEvent::IntentReceived(intent.clone()))?;
        let mut token = self.register_request(generation);
        info!(
            "📝 Intent #{}: {} {} -> {} ({}bps)",
            generation, intent.amount, intent.token_in, intent.token_out, intent.slippage_bps
        );

        let priced = tokio::select! {
            result = self.price(intent) => result,
            _ = token.cancelled() => {
                debug!("🚫 Quote request #{} superseded", generation);
                return Err(AppError::cancelled());
            }
        };

        match priced {
            Ok(priced) => self.transition_if(Some(generation), SwapEvent::QuoteReady(priced)),
            Err(e) => {
                self.transition_if(Some(generation), SwapEvent::QuoteFailed(e.clone()))?;
                Err(e)
            }
        }
    }

    /// Re-price the current intent with new parameters
    pub async fn modify_params(&self, slippage_bps: Option<u32>, amount: Option<String>) -> AppResult<SwapState> {
        let current = self.state();
        let intent = current
            .intent()
            .cloned()
            .ok_or_else(|| AppError::invalid_transition(current.name(), "modify_params"))?;

        let updated = Intent {
            slippage_bps: slippage_bps.unwrap_or(intent.slippage_bps),
            amount: amount.unwrap_or(intent.amount),
            ..intent
        };
        self.fetch_quote(updated).await
    }

    /// Move a quote toward execution: approval when needed, otherwise build and simulate
    pub async fn simulate(&self) -> AppResult<SwapState> {
        // Read before the state so a newer quote always invalidates this run
        let generation = self.generation();
        let current = self.state();
        let priced = match current.stable() {
            SwapState::Quote(priced) => priced.clone(),
            SwapState::ApprovalNeeded { .. } => return self.approve().await,
            other => return Err(AppError::invalid_transition(other.name(), "simulate")),
        };
        if let Err(e) = self.ensure_fresh(&priced.quote) {
            self.transition_if(Some(generation), SwapEvent::QuoteExpired(e.clone()))?;
            return Err(e);
        }

        if TransactionBuilder::needs_approval(&priced.quote) {
            let allowance = self
                .deps
                .chain
                .allowance(
                    priced.quote.token_in.address,
                    self.deps.wallet.address(),
                    self.deps.builder.router(),
                )
                .await;

            match allowance {
                Ok(allowance) if allowance < priced.quote.amount_in => {
                    info!("🔐 Approval required for {}", priced.quote.token_in.symbol);
                    let approval_tx = self.deps.builder.build_router_approval(&priced.quote)?;
                    return self.transition_if(Some(generation), SwapEvent::ApprovalRequired(approval_tx));
                }
                Ok(_) => {}
                Err(e) => {
                    self.transition_if(Some(generation), SwapEvent::SimulationFailed(e.clone()))?;
                    return Err(e);
                }
            }
        }

        self.build_and_simulate(&priced, generation).await
    }

    /// Submit the pending approval, wait for it, then build and simulate
    pub async fn approve(&self) -> AppResult<SwapState> {
        let generation = self.generation();
        let current = self.state();
        let (priced, approval_tx) = match current.stable() {
            SwapState::ApprovalNeeded { priced, approval_tx } => (priced.clone(), approval_tx.clone()),
            other => return Err(AppError::invalid_transition(other.name(), "approve")),
        };

        let hash = match self.deps.wallet.send_transaction(&approval_tx).await {
            Ok(hash) => hash,
            Err(e) => {
                self.transition_if(Some(generation), SwapEvent::ApprovalFailed(e.clone()))?;
                return Err(e);
            }
        };
        self.transition_if(Some(generation), SwapEvent::ApprovalSubmitted(hash))?;

        let receipt = wait_for_receipt(
            self.deps.chain.as_ref(),
            hash,
            self.settings.receipt_poll_interval,
            self.settings.receipt_timeout,
        )
        .await;
        match receipt {
            Ok(receipt) if receipt.success => {
                info!("✅ Approval confirmed in block {}", receipt.block_number);
            }
            Ok(_) => {
                let e = AppError::new(ErrorCode::TransactionReverted, "Approval transaction reverted");
                self.transition_if(Some(generation), SwapEvent::ApprovalFailed(e.clone()))?;
                return Err(e);
            }
            Err(e) => {
                self.transition_if(Some(generation), SwapEvent::ApprovalFailed(e.clone()))?;
                return Err(e);
            }
        }

        if let Err(e) = self.ensure_fresh(&priced.quote) {
            self.transition_if(Some(generation), SwapEvent::QuoteExpired(e.clone()))?;
            return Err(e);
        }
        self.build_and_simulate(&priced, generation).await
    }

    /// Broadcast the simulated swap. Critical risk needs `override_risk`.
    pub async fn execute(&self, override_risk: bool) -> AppResult<SwapState> {
        let current = self.state();
        let (priced, swap_tx) = match current.stable() {
            SwapState::Simulated { priced, swap_tx, .. } => (priced.clone(), swap_tx.clone()),
            other => return Err(AppError::invalid_transition(other.name(), "execute")),
        };

        if let Err(e) = self.ensure_fresh(&priced.quote) {
            self.transition(SwapEvent::QuoteExpired(e.clone()))?;
            return Err(e);
        }

        if !priced.risk.should_proceed {
            if !override_risk {
                return Err(AppError::new(
                    ErrorCode::RiskBlocked,
                    format!("Risk level {} requires explicit confirmation", priced.risk.level.as_str()),
                ));
            }
            self.deps.gate.record_risk_override(&format!(
                "{} -> {} score {}",
                priced.intent.token_in, priced.intent.token_out, priced.risk.score
            ));
        }

        // Single-shot: a concurrent execute loses here
        self.transition(SwapEvent::ExecutionStarted)?;

        let hash = match self.deps.wallet.send_transaction(&swap_tx).await {
            Ok(hash) => hash,
            Err(e) => return self.fail_execution(e),
        };
        self.transition(SwapEvent::TransactionSubmitted(hash))?;
        info!("🚀 Swap broadcast: {}", hash);

        let receipt = wait_for_receipt(
            self.deps.chain.as_ref(),
            hash,
            self.settings.receipt_poll_interval,
            self.settings.receipt_timeout,
        )
        .await;

        match receipt {
            Ok(receipt) if receipt.success => {
                let state = self.transition(SwapEvent::ReceiptConfirmed(receipt))?;
                if let Some(telemetry) = &self.deps.telemetry {
                    telemetry.record_swap(true);
                }
                self.schedule_reset();
                Ok(state)
            }
            Ok(receipt) => self.fail_execution(AppError::new(
                ErrorCode::TransactionReverted,
                format!("Swap reverted in block {}", receipt.block_number),
            )),
            Err(e) => self.fail_execution(e),
        }
    }

    /// Drop back to `input`, aborting any quote in flight
    pub fn cancel(&self) -> AppResult<SwapState> {
        let (generation, state) = self.supersede(SwapEvent::Cancel)?;
        // Aborts any quote still in flight
        drop(self.register_request(generation));
        Ok(state)
    }

    /// Leave the error excursion
    pub fn dismiss(&self) -> AppResult<SwapState> {
        self.transition(SwapEvent::Dismiss)
    }

    /// Route a parsed agent action
    pub async fn dispatch(&self, action: AgentAction) -> AppResult<SwapState> {
        debug!("🤖 Agent action: {}", action.name());
        match action {
            AgentAction::FetchQuote {
                token_in,
                token_out,
                amount,
                slippage_bps,
            } => {
                let slippage = slippage_bps.unwrap_or(self.settings.default_slippage_bps);
                self.fetch_quote(Intent::new(token_in, token_out, amount, slippage)).await
            }
            AgentAction::ModifyParams { slippage_bps, amount } => self.modify_params(slippage_bps, amount).await,
            AgentAction::Simulate => self.simulate().await,
            AgentAction::ExecuteSwap { override_risk } => self.execute(override_risk).await,
        }
    }

    // ============================================
    // Internals
    // ============================================

    async fn price(&self, intent: Intent) -> AppResult<PricedIntent> {
        let quote = self.deps.aggregator.get_quote(&intent).await?;

        let market = match &self.deps.market {
            Some(market) => match market.snapshot(quote.token_in.address, quote.token_out.address).await {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    debug!("Market data skipped: {}", e.code_str());
                    None
                }
            },
            None => None,
        };

        let eth_price = eth_price_usd(&quote, market.as_ref().and_then(|m| m.price_usd));
        let inputs = RiskInputs::from_quote(
            &quote,
            intent.slippage_bps,
            market.as_ref(),
            eth_price,
            self.settings.gas_price_gwei,
        );
        let risk = self.classifier.assess(&inputs);
        info!(
            "{} Risk {} (score {}) for {} -> {}",
            risk.level.emoji(),
            risk.level.as_str(),
            risk.score,
            intent.token_in,
            intent.token_out
        );

        Ok(PricedIntent { intent, quote, risk })
    }

    async fn build_and_simulate(&self, priced: &PricedIntent, generation: u64) -> AppResult<SwapState> {
        let swap_tx = match self.deps.builder.build_swap(&priced.quote, self.deps.wallet.address()) {
            Ok(tx) => tx,
            Err(e) => {
                self.transition_if(Some(generation), SwapEvent::SimulationFailed(e.clone()))?;
                return Err(e);
            }
        };

        let outcome = self.deps.simulator.simulate(self.deps.wallet.address(), &swap_tx).await;
        let error = match outcome {
            Ok(SimulationOutcome::Success { gas_used }) => {
                return self.transition_if(Some(generation), SwapEvent::SimulationSucceeded { swap_tx, gas_used });
            }
            Ok(SimulationOutcome::Failure { category, message }) => AppError::simulation_failed(category, message),
            Err(e) => e,
        };
        self.transition_if(Some(generation), SwapEvent::SimulationFailed(error.clone()))?;
        Err(error)
    }

    fn fail_execution(&self, error: AppError) -> AppResult<SwapState> {
        warn!("❌ Swap failed: {}", error);
        if let Some(telemetry) = &self.deps.telemetry {
            telemetry.record_swap(false);
        }
        self.transition(SwapEvent::ExecutionFailed(error.clone()))?;
        Err(error)
    }

    fn ensure_fresh(&self, quote: &Quote) -> AppResult<()> {
        let now = now_ms() as i64;
        if quote.is_fresh(now, self.settings.quote_ttl_secs) {
            Ok(())
        } else {
            Err(AppError::quote_expired(quote.age_secs(now)))
        }
    }

    /// Return to `input` after the configured delay unless something newer happened
    fn schedule_reset(&self) {
        let state = self.state.clone();
        let generation = self.generation.clone();
        let expected = generation.load(Ordering::SeqCst);
        let delay = self.settings.auto_reset;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            state.send_if_modified(|current| {
                if generation.load(Ordering::SeqCst) != expected {
                    return false;
                }
                match current.clone().apply(SwapEvent::Reset) {
                    Ok(next) => {
                        debug!("🔄 Session auto-reset");
                        *current = next;
                        true
                    }
                    Err(_) => false,
                }
            });
        });
    }
}
