//! Security Gate
//!
//! First line of defence in front of the engine:
//! - free-text input validation (length, invisible characters, injection patterns)
//! - server-side token address derivation from the canonical table
//! - contract whitelist enforcement for every address that ends up in calldata
//!
//! Anything the gate cannot positively validate is rejected.

use alloy_primitives::Address;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::errors::{AppError, AppResult};
use crate::models::types::TokenVariant;
use crate::utils::constants::{contract_whitelist, token_entries, KNOWN_TOKENS, MAX_INPUT_LENGTH};
use crate::utils::telemetry::{SecurityEventKind, TelemetryCollector};

// ============================================
// Input validation
// ============================================

/// Outcome of `validate_input`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Input with invisible / control characters removed
    pub sanitized: String,
}

impl InputValidation {
    fn rejected(reason: impl Into<String>, sanitized: String) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            sanitized,
        }
    }
}

struct InputPattern {
    regex: Regex,
    category: &'static str,
    description: &'static str,
}

const PATTERN_SOURCES: &[(&str, &str, &str)] = &[
    (
        r"(?i)\b(ignore|disregard|forget|override)\s+(all\s+)?(the\s+)?(previous|prior|above|earlier|your|system)\s+(instructions?|prompts?|rules)",
        "prompt_injection",
        "Attempts to override instructions",
    ),
    (
        r"(?i)\byou\s+are\s+now\s+(a|an|the)\b",
        "prompt_injection",
        "Attempts to redefine agent identity",
    ),
    (
        r"(?i)\b(system|admin|root)\s+(override|command|prompt|directive)\b",
        "prompt_injection",
        "Fake system/admin directive",
    ),
    (
        r"(?i)(new\s+instructions\s*:|\[\s*/?\s*system\s*\]|<\s*/?\s*system\s*>|\bjailbreak\b|\bdan\s+mode\b)",
        "prompt_injection",
        "Injected role markers",
    ),
    (
        r"(?i)(\bunion\s+(all\s+)?select\b|\bdrop\s+table\b|\bdelete\s+from\b|\binsert\s+into\b|\bupdate\s+\w+\s+set\b|;\s*--|'\s*or\s+'?\d+'?\s*=\s*'?\d+)",
        "sql_injection",
        "SQL injection fragment",
    ),
    (
        r"(?i)(<\s*script\b|javascript\s*:)",
        "script_injection",
        "Script injection fragment",
    ),
    (
        r"0[xX][0-9a-fA-F]{40}",
        "raw_address",
        "Raw contract addresses are not accepted, use token symbols",
    ),
    (
        r"(?i)(\b(https?|ftp|wss?)://|\bwww\.[a-z0-9-]+\.[a-z]{2,})",
        "url",
        "URLs are not accepted",
    ),
];

fn build_patterns() -> Result<Vec<InputPattern>, regex::Error> {
    PATTERN_SOURCES
        .iter()
        .map(|&(source, category, description)| {
            Ok(InputPattern {
                regex: Regex::new(source)?,
                category,
                description,
            })
        })
        .collect()
}

lazy_static! {
    static ref INPUT_PATTERNS: Result<Vec<InputPattern>, regex::Error> = build_patterns();
}

/// Zero-width, bidi override and other invisible formatting characters
fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{2069}'
            | '\u{FEFF}'
            | '\u{00AD}'
    )
}

/// Strip invisible and control characters (newline and tab survive)
pub fn sanitize_input(text: &str) -> String {
    text.chars()
        .filter(|c| !is_invisible(*c))
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Validate free-text user input before it reaches the intent parser.
pub fn validate_input(text: &str) -> InputValidation {
    if text.chars().count() > MAX_INPUT_LENGTH {
        return InputValidation::rejected(
            format!("Input exceeds {} characters", MAX_INPUT_LENGTH),
            String::new(),
        );
    }

    let sanitized = sanitize_input(text);
    if sanitized.is_empty() {
        return InputValidation::rejected("Input is empty", sanitized);
    }

    let patterns = match INPUT_PATTERNS.as_ref() {
        Ok(patterns) => patterns,
        Err(e) => {
            warn!(security_event = true, "🚨 Input validator unavailable: {}", e);
            return InputValidation::rejected("Input validator unavailable", sanitized);
        }
    };

    for pattern in patterns {
        if pattern.regex.is_match(&sanitized) {
            debug!(category = pattern.category, "Input rejected by pattern");
            return InputValidation::rejected(pattern.description, sanitized);
        }
    }

    InputValidation {
        valid: true,
        reason: None,
        sanitized,
    }
}

// ============================================
// Token derivation
// ============================================

/// Canonical contract address for a user symbol
pub fn derive_token_address(symbol: &str) -> AppResult<Address> {
    token_entries(symbol)
        .first()
        .map(|entry| entry.address)
        .ok_or_else(|| AppError::unknown_token(symbol))
}

/// Every variant for a symbol, canonical first
pub fn resolve_variants(symbol: &str) -> AppResult<Vec<TokenVariant>> {
    let entries = token_entries(symbol);
    if entries.is_empty() {
        return Err(AppError::unknown_token(symbol));
    }
    Ok(entries.into_iter().map(|e| e.to_variant()).collect())
}

/// Canonical variant only
pub fn resolve_token(symbol: &str) -> AppResult<TokenVariant> {
    token_entries(symbol)
        .first()
        .map(|e| e.to_variant())
        .ok_or_else(|| AppError::unknown_token(symbol))
}

/// Canonical variant for a user symbol, or the exact variant when a quoted
/// variant name (e.g. `USDbC`) is passed back
pub fn resolve_token_or_variant(name: &str) -> AppResult<TokenVariant> {
    if let Ok(variant) = resolve_token(name) {
        return Ok(variant);
    }
    KNOWN_TOKENS
        .iter()
        .find(|t| t.variant.eq_ignore_ascii_case(name.trim()))
        .map(|t| t.to_variant())
        .ok_or_else(|| AppError::unknown_token(name))
}

// ============================================
// Whitelist
// ============================================

/// Addresses checked before building a swap
#[derive(Debug, Clone)]
pub struct SwapAddressCheck {
    /// Target contract (router)
    pub to: String,
    pub token_in_symbol: String,
    pub token_out_symbol: String,
    /// Approval spender, when one is involved
    pub spender: Option<String>,
}

/// Contract whitelist plus security event reporting
#[derive(Clone)]
pub struct SecurityGate {
    whitelist: HashSet<Address>,
    telemetry: Option<Arc<TelemetryCollector>>,
}

impl Default for SecurityGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityGate {
    /// Gate over the built-in whitelist
    pub fn new() -> Self {
        Self::with_whitelist(contract_whitelist())
    }

    pub fn with_whitelist(addresses: impl IntoIterator<Item = Address>) -> Self {
        Self {
            whitelist: addresses.into_iter().collect(),
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryCollector>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn validate_input(&self, text: &str) -> InputValidation {
        let result = validate_input(text);
        if !result.valid {
            self.report(SecurityEventKind::InputRejected);
        }
        result
    }

    pub fn is_whitelisted(&self, address: &Address) -> bool {
        self.whitelist.contains(address)
    }

    /// Case-insensitive whitelist membership of a hex string.
    /// Unparseable input is not whitelisted.
    pub fn validate_contract_address(&self, address: &str) -> bool {
        parse_address_lenient(address)
            .map(|a| self.is_whitelisted(&a))
            .unwrap_or(false)
    }

    /// Router, spender and both re-derived token addresses must be whitelisted.
    /// The first violation is raised and logged as a security event.
    pub fn validate_swap_addresses(&self, check: &SwapAddressCheck) -> AppResult<()> {
        self.require_whitelisted("router", &check.to)?;

        for symbol in [&check.token_in_symbol, &check.token_out_symbol] {
            let address = resolve_token_or_variant(symbol)?.address;
            if !self.is_whitelisted(&address) {
                return Err(self.violation("token", &format!("{} ({})", address, symbol)));
            }
        }

        if let Some(spender) = &check.spender {
            self.require_whitelisted("spender", spender)?;
        }
        Ok(())
    }

    /// Raise `SecurityViolation` unless `address` is whitelisted
    pub fn require_whitelisted(&self, field: &str, address: &str) -> AppResult<Address> {
        match parse_address_lenient(address) {
            Some(parsed) if self.is_whitelisted(&parsed) => Ok(parsed),
            _ => Err(self.violation(field, address)),
        }
    }

    /// Record a user override of a critical risk level
    pub fn record_risk_override(&self, detail: &str) {
        warn!(security_event = true, "⚠️ Critical risk overridden by user: {}", detail);
        self.report(SecurityEventKind::RiskOverride);
    }

    pub fn record_rate_limited(&self, identity: &str) {
        warn!(security_event = true, identity = %identity, "⏳ Rate limit exceeded");
        self.report(SecurityEventKind::RateLimited);
    }

    fn violation(&self, field: &str, value: &str) -> AppError {
        warn!(security_event = true, field = field, value = value, "🚨 Whitelist violation");
        self.report(SecurityEventKind::WhitelistViolation);
        AppError::security_violation(field, value)
    }

    fn report(&self, kind: SecurityEventKind) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_security_event(kind);
        }
    }
}

/// Parse a hex address ignoring checksum casing
pub fn parse_address_lenient(value: &str) -> Option<Address> {
    value.trim().to_lowercase().parse::<Address>().ok()
}
