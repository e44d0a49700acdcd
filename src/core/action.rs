//! Agent actions
//!
//! Strict tagged union for the structured output of the upstream intent
//! parser. Anything that does not deserialize exactly is dropped: a malformed
//! or unknown action yields no action at all.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::security::validate_input;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", deny_unknown_fields)]
pub enum AgentAction {
    FetchQuote {
        token_in: String,
        token_out: String,
        amount: String,
        #[serde(default)]
        slippage_bps: Option<u32>,
    },
    ModifyParams {
        #[serde(default)]
        slippage_bps: Option<u32>,
        #[serde(default)]
        amount: Option<String>,
    },
    Simulate,
    ExecuteSwap {
        /// Explicit confirmation of a critical risk level
        #[serde(default)]
        override_risk: bool,
    },
}

impl AgentAction {
    pub fn name(&self) -> &'static str {
        match self {
            AgentAction::FetchQuote { .. } => "fetch_quote",
            AgentAction::ModifyParams { .. } => "modify_params",
            AgentAction::Simulate => "simulate",
            AgentAction::ExecuteSwap { .. } => "execute_swap",
        }
    }

    /// String fields must pass the same input screening as free text
    fn fields_are_safe(&self) -> bool {
        let fields: Vec<&str> = match self {
            AgentAction::FetchQuote {
                token_in,
                token_out,
                amount,
                ..
            } => vec![token_in, token_out, amount],
            AgentAction::ModifyParams { amount, .. } => amount.iter().map(String::as_str).collect(),
            AgentAction::Simulate | AgentAction::ExecuteSwap { .. } => Vec::new(),
        };
        fields.iter().all(|f| validate_input(f).valid)
    }
}

/// Parse one action, failing closed
pub fn parse_action(raw: &str) -> Option<AgentAction> {
    match serde_json::from_str::<AgentAction>(raw) {
        Ok(action) if action.fields_are_safe() => Some(action),
        Ok(action) => {
            warn!(security_event = true, "🚨 Rejected {} action with unsafe fields", action.name());
            None
        }
        Err(e) => {
            warn!("⚠️ Ignoring malformed agent action: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch_quote() {
        let action = parse_action(
            r#"{"action":"fetch_quote","token_in":"ETH","token_out":"USDC","amount":"0.5","slippage_bps":100}"#,
        );
        assert_eq!(
            action,
            Some(AgentAction::FetchQuote {
                token_in: "ETH".to_string(),
                token_out: "USDC".to_string(),
                amount: "0.5".to_string(),
                slippage_bps: Some(100),
            })
        );
    }

    #[test]
    fn test_parse_unit_and_defaults() {
        assert_eq!(parse_action(r#"{"action":"simulate"}"#), Some(AgentAction::Simulate));
        assert_eq!(
            parse_action(r#"{"action":"execute_swap"}"#),
            Some(AgentAction::ExecuteSwap { override_risk: false })
        );
        assert_eq!(
            parse_action(r#"{"action":"modify_params","slippage_bps":30}"#),
            Some(AgentAction::ModifyParams {
                slippage_bps: Some(30),
                amount: None
            })
        );
    }

    #[test]
    fn test_fails_closed() {
        assert_eq!(parse_action(r#"{"action":"withdraw_all"}"#), None);
        assert_eq!(parse_action(r#"{"action":"fetch_quote","token_in":"ETH"}"#), None);
        assert_eq!(
            parse_action(r#"{"action":"execute_swap","override_risk":true,"to":"0xdead"}"#),
            None
        );
        assert_eq!(parse_action("swap 1 eth to usdc please"), None);
        assert_eq!(parse_action(""), None);
    }

    #[test]
    fn test_rejects_unsafe_fields() {
        let raw = r#"{"action":"fetch_quote","token_in":"ETH","token_out":"0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913","amount":"1"}"#;
        assert_eq!(parse_action(raw), None);
    }
}
