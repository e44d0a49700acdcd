//! Constants Module - Single Source of Truth
//!
//! Chain constants, the canonical token table, the contract whitelist and
//! unit conversion helpers live here. No other module hardcodes addresses.

use alloy_primitives::{address, Address, U256};

use crate::models::errors::{AppError, AppResult};
use crate::models::types::TokenVariant;

// ============================================
// APPLICATION CONSTANTS
// ============================================

pub const APP_NAME: &str = "RusterSwap";

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent for outgoing HTTP requests
pub const USER_AGENT: &str = "RusterSwap/0.1.0";

// ============================================
// RPC & SERVICE CONSTANTS
// ============================================

/// Default timeout for RPC requests (seconds)
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;

/// Base mainnet
pub const CHAIN_ID_BASE: u64 = 8453;

/// Public Base RPC, always last in the failover list
pub const PUBLIC_BASE_RPC: &str = "https://mainnet.base.org";

pub const DEXSCREENER_API_BASE: &str = "https://api.dexscreener.com/latest/dex";

/// Build Alchemy URL for a chain
pub fn build_alchemy_url(chain_id: u64, api_key: &str) -> Option<String> {
    let subdomain = match chain_id {
        CHAIN_ID_BASE => "base-mainnet",
        1 => "eth-mainnet",
        _ => return None,
    };
    Some(format!("https://{}.g.alchemy.com/v2/{}", subdomain, api_key))
}

// ============================================
// SWAP DEFAULTS
// ============================================

/// Uniswap V3 fee tiers, ascending (0.05%, 0.3%, 1%)
pub const DEFAULT_FEE_TIERS: [u32; 3] = [500, 3000, 10000];

/// 0.5%
pub const DEFAULT_SLIPPAGE_BPS: u32 = 50;

/// 50%
pub const MAX_SLIPPAGE_BPS: u32 = 5000;

pub const BPS_DENOMINATOR: u64 = 10_000;

pub const DEFAULT_RATE_LIMIT_MAX: u32 = 20;

pub const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 60_000;

pub const DEFAULT_QUOTE_TTL_SECS: u64 = 30;

/// Assumed L2 gas price used only for gas-cost risk estimation
pub const DEFAULT_GAS_PRICE_GWEI: f64 = 0.05;

pub const DEFAULT_AUTO_RESET_MS: u64 = 5_000;

/// Gas estimate for an ERC-20 approve
pub const APPROVE_GAS_ESTIMATE: u64 = 60_000;

/// Fallback gas for a single-hop V3 swap when the quoter gives none
pub const SWAP_GAS_FALLBACK: u64 = 200_000;

/// Maximum accepted length of free-text user input
pub const MAX_INPUT_LENGTH: usize = 500;

// ============================================
// CONTRACTS (Base mainnet)
// ============================================

/// Uniswap V3 SwapRouter02
pub const SWAP_ROUTER_02: Address = address!("2626664c2603336E57B271c5C0b26F421741e481");

/// Uniswap V3 QuoterV2
pub const QUOTER_V2: Address = address!("3d4e44Eb1374240CE5F1B871ab261CD16335B76a");

pub const WETH: Address = address!("4200000000000000000000000000000000000006");
pub const USDC: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");
pub const USDBC: Address = address!("d9aAEc86B65D86f6A7B5B1b0c42FFA531710b6CA");
pub const DAI: Address = address!("50c5725949A6F0c72E6C4a641F24049A917DB0Cb");
pub const CBBTC: Address = address!("cbB7C0000aB88B473b1f5aFd9ef808440eed33Bf");
pub const CBETH: Address = address!("2Ae3F1Ec7F1F5012CFEab0185bfc7aa3cf0DEc22");

/// Entry of the canonical token table
#[derive(Debug, Clone, Copy)]
pub struct TokenEntry {
    /// Symbol users type
    pub symbol: &'static str,
    /// Symbol of this concrete contract (differs for aliases)
    pub variant: &'static str,
    pub address: Address,
    pub decimals: u8,
    pub is_native: bool,
}

/// Canonical token table. For each symbol the first entry is canonical,
/// following entries are aliases tried during quoting.
pub const KNOWN_TOKENS: &[TokenEntry] = &[
    TokenEntry { symbol: "ETH", variant: "ETH", address: WETH, decimals: 18, is_native: true },
    TokenEntry { symbol: "WETH", variant: "WETH", address: WETH, decimals: 18, is_native: false },
    TokenEntry { symbol: "USDC", variant: "USDC", address: USDC, decimals: 6, is_native: false },
    TokenEntry { symbol: "USDC", variant: "USDbC", address: USDBC, decimals: 6, is_native: false },
    TokenEntry { symbol: "DAI", variant: "DAI", address: DAI, decimals: 18, is_native: false },
    TokenEntry { symbol: "CBBTC", variant: "cbBTC", address: CBBTC, decimals: 8, is_native: false },
    TokenEntry { symbol: "CBETH", variant: "cbETH", address: CBETH, decimals: 18, is_native: false },
];

/// Symbols pegged to USD, used to derive trade notional
pub const USD_STABLECOINS: [&str; 3] = ["USDC", "USDbC", "DAI"];

impl TokenEntry {
    pub fn to_variant(&self) -> TokenVariant {
        TokenVariant {
            symbol: self.variant.to_string(),
            address: self.address,
            decimals: self.decimals,
            is_native: self.is_native,
        }
    }
}

/// All variants registered for a user symbol, canonical first
pub fn token_entries(symbol: &str) -> Vec<&'static TokenEntry> {
    let wanted = symbol.trim().to_uppercase();
    KNOWN_TOKENS.iter().filter(|t| t.symbol == wanted).collect()
}

/// Token metadata for a contract address (first match)
pub fn token_by_address(address: &Address) -> Option<&'static TokenEntry> {
    KNOWN_TOKENS.iter().find(|t| &t.address == address && !t.is_native)
}

/// Every contract the engine is allowed to interact with
pub fn contract_whitelist() -> Vec<Address> {
    let mut list = vec![SWAP_ROUTER_02, QUOTER_V2];
    for token in KNOWN_TOKENS {
        if !list.contains(&token.address) {
            list.push(token.address);
        }
    }
    list
}

pub fn is_stablecoin(variant_symbol: &str) -> bool {
    USD_STABLECOINS.contains(&variant_symbol)
}

// ============================================
// UNIT CONVERSION
// ============================================

/// Parse a human decimal string into raw base units.
///
/// Rejects empty, signed, exponent and over-precise inputs and zero.
pub fn parse_units(amount: &str, decimals: u8) -> AppResult<U256> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(AppError::invalid_amount("Amount is empty"));
    }

    let (whole, frac) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };

    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !all_digits(whole) || !all_digits(frac) {
        return Err(AppError::invalid_amount(format!("Invalid amount: {}", amount)));
    }
    if frac.len() > decimals as usize {
        return Err(AppError::invalid_amount(format!(
            "Amount {} has more than {} decimal places",
            amount, decimals
        )));
    }

    let scale = U256::from(10u64).pow(U256::from(decimals));
    let whole_raw = if whole.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole, 10)
            .map_err(|_| AppError::invalid_amount(format!("Amount too large: {}", amount)))?
    };

    let mut frac_padded = frac.to_string();
    while frac_padded.len() < decimals as usize {
        frac_padded.push('0');
    }
    let frac_raw = if frac_padded.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(&frac_padded, 10)
            .map_err(|_| AppError::invalid_amount(format!("Invalid amount: {}", amount)))?
    };

    let raw = whole_raw
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_raw))
        .ok_or_else(|| AppError::invalid_amount(format!("Amount too large: {}", amount)))?;

    if raw.is_zero() {
        return Err(AppError::invalid_amount("Amount must be greater than zero"));
    }
    Ok(raw)
}

/// Raw base units to a lossy float (display and heuristics only)
pub fn format_units(raw: U256, decimals: u8) -> f64 {
    let value: f64 = raw.to_string().parse().unwrap_or(0.0);
    value / 10f64.powi(decimals as i32)
}

/// Raw base units to an exact decimal string without trailing zeros
pub fn format_units_exact(raw: U256, decimals: u8) -> String {
    let digits = raw.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }
    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
    } else {
        digits
    };
    let (whole, frac) = padded.split_at(padded.len() - decimals);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, frac)
    }
}
