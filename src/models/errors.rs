//! Centralized Error Handling Module
//!
//! Every failure in the swap engine carries a unique error code so that logs,
//! API responses and the session state machine can all reason about it.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - SEC_xxx: input validation / whitelist / rate limiting
//! - RPC_xxx: RPC transport errors
//! - QUOTE_xxx: quoting errors
//! - SIM_xxx: simulation errors
//! - FSM_xxx: lifecycle errors
//! - CFG_xxx: configuration errors

use std::fmt;

use super::types::SimulationErrorCategory;

/// Application-wide error type
#[derive(Debug)]
pub struct AppError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Internal message (may contain provider details, never sent to clients)
    pub message: String,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new AppError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create AppError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    /// Message that is safe to show to an end user.
    ///
    /// Validation-type errors echo the internal message (it only ever names the
    /// offending user value); transport errors are replaced by a generic text so
    /// that RPC URLs, API keys and raw provider payloads never leak.
    pub fn public_message(&self) -> String {
        match self.code {
            ErrorCode::ValidationFailed
            | ErrorCode::UnknownTokenSymbol
            | ErrorCode::InvalidAmount
            | ErrorCode::InvalidAddress
            | ErrorCode::InvalidFeeTier
            | ErrorCode::InvalidTransition
            | ErrorCode::QuoteExpired
            | ErrorCode::RiskBlocked
            | ErrorCode::RateLimitExceeded => self.message.clone(),
            ErrorCode::SecurityViolation => {
                "Address is not on the allowed contract list".to_string()
            }
            ErrorCode::NoLiquidity => "No liquidity available for this pair".to_string(),
            ErrorCode::SimulationFailed(category) => {
                format!("Simulation failed: {}", category.describe())
            }
            ErrorCode::SimulationUnavailable => {
                "Simulation service is unavailable, please retry".to_string()
            }
            ErrorCode::RpcExhausted
            | ErrorCode::RpcRequestFailed
            | ErrorCode::RpcRateLimited
            | ErrorCode::RpcInvalidResponse
            | ErrorCode::ExternalTimeout => {
                "Blockchain network is unreachable, please retry shortly".to_string()
            }
            ErrorCode::WalletRejected => "Transaction was rejected in the wallet".to_string(),
            ErrorCode::BroadcastFailed => "Transaction could not be broadcast".to_string(),
            ErrorCode::TransactionReverted => "Transaction reverted on-chain".to_string(),
            ErrorCode::Cancelled => "Request was superseded".to_string(),
            ErrorCode::MarketDataUnavailable => "Market data unavailable".to_string(),
            ErrorCode::ConfigInvalidValue | ErrorCode::Internal => {
                "Internal error".to_string()
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl Clone for AppError {
    /// The boxed source is not cloneable; clones keep code and message only.
    fn clone(&self) -> Self {
        Self::new(self.code, self.message.clone())
    }
}

impl PartialEq for AppError {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.message == other.message
    }
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // ============================================
    // Security / validation errors
    // ============================================
    /// User input rejected by the input validator
    ValidationFailed,
    /// Caller exceeded the fixed-window request budget
    RateLimitExceeded,
    /// Symbol not present in the canonical token table
    UnknownTokenSymbol,
    /// Amount string not a positive decimal within token precision
    InvalidAmount,
    /// Malformed hex address
    InvalidAddress,
    /// Fee tier outside the configured set
    InvalidFeeTier,
    /// Address not on the contract whitelist
    SecurityViolation,

    // ============================================
    // RPC errors
    // ============================================
    /// Single request failed (transport or HTTP status)
    RpcRequestFailed,
    /// HTTP 429 from a provider
    RpcRateLimited,
    /// Malformed JSON-RPC payload / JSON-RPC error object
    RpcInvalidResponse,
    /// Every provider failed every retry
    RpcExhausted,
    /// Request timeout
    ExternalTimeout,

    // ============================================
    // Quote errors
    // ============================================
    /// No fee tier / variant combination returned a quote
    NoLiquidity,
    /// Quote older than its TTL
    QuoteExpired,
    /// Critical risk without explicit override
    RiskBlocked,
    /// Market data provider failed
    MarketDataUnavailable,

    // ============================================
    // Simulation / execution errors
    // ============================================
    /// Simulation ran and reported a failure
    SimulationFailed(SimulationErrorCategory),
    /// Simulation service could not be reached
    SimulationUnavailable,
    /// User rejected the signature request
    WalletRejected,
    /// Signed transaction failed to broadcast
    BroadcastFailed,
    /// Receipt reports status 0
    TransactionReverted,

    // ============================================
    // Lifecycle errors
    // ============================================
    /// Event not allowed from the current state
    InvalidTransition,
    /// Superseded by a newer request
    Cancelled,

    // ============================================
    // Generic errors
    // ============================================
    /// Invalid configuration value
    ConfigInvalidValue,
    /// Unexpected internal error
    Internal,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationFailed => "SEC_VALIDATION_FAILED",
            Self::RateLimitExceeded => "SEC_RATE_LIMIT_EXCEEDED",
            Self::UnknownTokenSymbol => "SEC_UNKNOWN_TOKEN_SYMBOL",
            Self::InvalidAmount => "SEC_INVALID_AMOUNT",
            Self::InvalidAddress => "SEC_INVALID_ADDRESS",
            Self::InvalidFeeTier => "SEC_INVALID_FEE_TIER",
            Self::SecurityViolation => "SEC_WHITELIST_VIOLATION",

            Self::RpcRequestFailed => "RPC_REQUEST_FAILED",
            Self::RpcRateLimited => "RPC_RATE_LIMITED",
            Self::RpcInvalidResponse => "RPC_INVALID_RESPONSE",
            Self::RpcExhausted => "RPC_EXHAUSTED",
            Self::ExternalTimeout => "EXTERNAL_TIMEOUT",

            Self::NoLiquidity => "QUOTE_NO_LIQUIDITY",
            Self::QuoteExpired => "QUOTE_EXPIRED",
            Self::RiskBlocked => "QUOTE_RISK_BLOCKED",
            Self::MarketDataUnavailable => "QUOTE_MARKET_DATA_UNAVAILABLE",

            Self::SimulationFailed(_) => "SIM_FAILED",
            Self::SimulationUnavailable => "SIM_UNAVAILABLE",
            Self::WalletRejected => "EXEC_WALLET_REJECTED",
            Self::BroadcastFailed => "EXEC_BROADCAST_FAILED",
            Self::TransactionReverted => "EXEC_REVERTED",

            Self::InvalidTransition => "FSM_INVALID_TRANSITION",
            Self::Cancelled => "FSM_CANCELLED",

            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code for API responses
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ValidationFailed
            | Self::UnknownTokenSymbol
            | Self::InvalidAmount
            | Self::InvalidAddress
            | Self::InvalidFeeTier
            | Self::SimulationFailed(_) => 400,
            Self::SecurityViolation => 403,
            Self::NoLiquidity => 404,
            Self::InvalidTransition | Self::QuoteExpired | Self::RiskBlocked => 409,
            Self::RateLimitExceeded | Self::RpcRateLimited => 429,
            Self::RpcExhausted | Self::SimulationUnavailable | Self::MarketDataUnavailable => 503,
            Self::ExternalTimeout => 504,
            _ => 500,
        }
    }

    /// Check if error is retryable at the transport level.
    ///
    /// Simulation and execution failures are never retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RpcRequestFailed
                | Self::RpcRateLimited
                | Self::RpcInvalidResponse
                | Self::ExternalTimeout
        )
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, msg)
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new(
            ErrorCode::RateLimitExceeded,
            format!("Rate limit exceeded. Retry after {} seconds", retry_after_secs),
        )
    }

    pub fn unknown_token(symbol: &str) -> Self {
        Self::new(
            ErrorCode::UnknownTokenSymbol,
            format!("Unknown token symbol: {}", symbol),
        )
    }

    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidAmount, msg)
    }

    pub fn invalid_address(value: &str) -> Self {
        Self::new(ErrorCode::InvalidAddress, format!("Invalid address: {}", value))
    }

    pub fn invalid_fee_tier(fee: u32) -> Self {
        Self::new(ErrorCode::InvalidFeeTier, format!("Unsupported fee tier: {}", fee))
    }

    /// Whitelist violation naming the offending value
    pub fn security_violation(field: &str, value: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::SecurityViolation,
            format!("{} {} is not whitelisted", field, value),
        )
    }

    pub fn rpc_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcRequestFailed, msg)
    }

    pub fn rpc_exhausted(last_error: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::RpcExhausted,
            format!("All RPC providers failed. Last error: {}", last_error),
        )
    }

    pub fn no_liquidity(token_in: &str, token_out: &str) -> Self {
        Self::new(
            ErrorCode::NoLiquidity,
            format!("No liquidity for {} -> {}", token_in, token_out),
        )
    }

    pub fn quote_expired(age_secs: u64) -> Self {
        Self::new(
            ErrorCode::QuoteExpired,
            format!("Quote is {}s old, fetch a fresh quote", age_secs),
        )
    }

    pub fn simulation_failed(category: SimulationErrorCategory, msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SimulationFailed(category), msg)
    }

    pub fn invalid_transition(from: &str, event: &str) -> Self {
        Self::new(
            ErrorCode::InvalidTransition,
            format!("Cannot apply {} in state {}", event, from),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "Superseded by a newer request")
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<eyre::Report> for AppError {
    fn from(err: eyre::Report) -> Self {
        Self::new(ErrorCode::Internal, err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorCode::ExternalTimeout, "Request timeout")
        } else if err.is_connect() {
            Self::new(ErrorCode::RpcRequestFailed, "Connection failed")
        } else {
            Self::new(ErrorCode::RpcRequestFailed, err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::RpcInvalidResponse, "JSON parse error", err)
    }
}
