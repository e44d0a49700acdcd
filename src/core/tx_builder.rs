//! Transaction Builder
//!
//! Encodes SwapRouter02 `exactInputSingle` and ERC-20 `approve`/`allowance`
//! calldata. Every address comes from the server-side token table or the
//! router constant; nothing here signs or broadcasts.

use alloy_primitives::{
    aliases::{U160, U24},
    Address, Bytes, U256,
};
use alloy_sol_types::{sol, SolCall};

use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::{Quote, TokenVariant, TxRequest};
use crate::utils::constants::{APPROVE_GAS_ESTIMATE, SWAP_GAS_FALLBACK, SWAP_ROUTER_02};

sol! {
    // Uniswap V3 SwapRouter02
    struct ExactInputSingleParams {
        address tokenIn;
        address tokenOut;
        uint24 fee;
        address recipient;
        uint256 amountIn;
        uint256 amountOutMinimum;
        uint160 sqrtPriceLimitX96;
    }

    function exactInputSingle(ExactInputSingleParams calldata params)
        external
        payable
        returns (uint256 amountOut);

    // ERC20 functions
    function approve(address spender, uint256 amount) external returns (bool);
    function allowance(address owner, address spender) external view returns (uint256);
}

/// Fully specified single-hop swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapParams {
    pub token_in: TokenVariant,
    pub token_out: TokenVariant,
    pub amount_in: U256,
    pub min_out: U256,
    pub fee_tier: u32,
    pub recipient: Address,
}

impl SwapParams {
    pub fn from_quote(quote: &Quote, recipient: Address) -> Self {
        Self {
            token_in: quote.token_in.clone(),
            token_out: quote.token_out.clone(),
            amount_in: quote.amount_in,
            min_out: quote.min_out,
            fee_tier: quote.fee_tier,
            recipient,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    router: Address,
    fee_tiers: Vec<u32>,
}

impl TransactionBuilder {
    pub fn new(fee_tiers: Vec<u32>) -> Self {
        Self {
            router: SWAP_ROUTER_02,
            fee_tiers,
        }
    }

    pub fn router(&self) -> Address {
        self.router
    }

    /// Swap transaction for a previously selected quote
    pub fn build_swap(&self, quote: &Quote, recipient: Address) -> AppResult<TxRequest> {
        self.build_swap_from_params(&SwapParams::from_quote(quote, recipient))
    }

    pub fn build_swap_from_params(&self, params: &SwapParams) -> AppResult<TxRequest> {
        if !self.fee_tiers.contains(&params.fee_tier) {
            return Err(AppError::invalid_fee_tier(params.fee_tier));
        }
        if params.amount_in.is_zero() {
            return Err(AppError::invalid_amount("amount must be greater than zero"));
        }
        if params.recipient == Address::ZERO {
            return Err(AppError::invalid_address("recipient"));
        }
        if params.token_in.address == params.token_out.address {
            return Err(AppError::validation("Input and output token are the same"));
        }

        let data = exactInputSingleCall {
            params: ExactInputSingleParams {
                tokenIn: params.token_in.address,
                tokenOut: params.token_out.address,
                fee: U24::saturating_from(params.fee_tier),
                recipient: params.recipient,
                amountIn: params.amount_in,
                amountOutMinimum: params.min_out,
                sqrtPriceLimitX96: U160::ZERO,
            },
        }
        .abi_encode();

        // Native ETH is sent as value; the router wraps it
        let value = if params.token_in.is_native {
            params.amount_in
        } else {
            U256::ZERO
        };

        Ok(TxRequest {
            to: self.router,
            data: Bytes::from(data),
            value,
        })
    }

    /// ERC-20 approval; `None` approves the maximum amount
    pub fn build_approval(&self, token: Address, spender: Address, amount: Option<U256>) -> TxRequest {
        let data = approveCall {
            spender,
            amount: amount.unwrap_or(U256::MAX),
        }
        .abi_encode();

        TxRequest {
            to: token,
            data: Bytes::from(data),
            value: U256::ZERO,
        }
    }

    /// Approval of the router for exactly the quoted input
    pub fn build_router_approval(&self, quote: &Quote) -> AppResult<TxRequest> {
        if quote.token_in.is_native {
            return Err(AppError::validation("Native ETH does not need an approval"));
        }
        Ok(self.build_approval(quote.token_in.address, self.router, Some(quote.amount_in)))
    }

    pub fn needs_approval(quote: &Quote) -> bool {
        !quote.token_in.is_native
    }

    /// Quoter estimate plus a 20% buffer
    pub fn swap_gas_limit(gas_estimate: u64) -> u64 {
        if gas_estimate == 0 {
            return SWAP_GAS_FALLBACK;
        }
        gas_estimate.saturating_add(gas_estimate / 5)
    }

    pub fn approval_gas_limit() -> u64 {
        APPROVE_GAS_ESTIMATE
    }
}

pub fn encode_allowance(owner: Address, spender: Address) -> Bytes {
    Bytes::from(allowanceCall { owner, spender }.abi_encode())
}

pub fn decode_allowance(raw: &[u8]) -> AppResult<U256> {
    allowanceCall::abi_decode_returns(raw, true)
        .map(|r| r._0)
        .map_err(|e| AppError::new(ErrorCode::RpcInvalidResponse, format!("Bad allowance response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::{token_entries, USDC, WETH};

    fn variant(symbol: &str) -> TokenVariant {
        token_entries(symbol)[0].to_variant()
    }

    fn params(token_in: &str, token_out: &str) -> SwapParams {
        SwapParams {
            token_in: variant(token_in),
            token_out: variant(token_out),
            amount_in: U256::from(1_000_000u64),
            min_out: U256::from(990u64),
            fee_tier: 3000,
            recipient: Address::repeat_byte(0x11),
        }
    }

    #[test]
    fn test_swap_calldata_fields() {
        let builder = TransactionBuilder::new(vec![500, 3000, 10000]);
        let tx = builder.build_swap_from_params(&params("USDC", "WETH")).unwrap();

        assert_eq!(tx.to, SWAP_ROUTER_02);
        assert_eq!(tx.value, U256::ZERO);

        let decoded = exactInputSingleCall::abi_decode(&tx.data, true).unwrap();
        assert_eq!(decoded.params.tokenIn, USDC);
        assert_eq!(decoded.params.tokenOut, WETH);
        assert_eq!(decoded.params.fee, U24::from(3000u32));
        assert_eq!(decoded.params.amountOutMinimum, U256::from(990u64));
    }

    #[test]
    fn test_native_input_carries_value() {
        let builder = TransactionBuilder::new(vec![500, 3000, 10000]);
        let tx = builder.build_swap_from_params(&params("ETH", "USDC")).unwrap();
        assert_eq!(tx.value, U256::from(1_000_000u64));
    }

    #[test]
    fn test_rejects_unknown_fee_tier() {
        let builder = TransactionBuilder::new(vec![500, 3000, 10000]);
        let mut p = params("USDC", "WETH");
        p.fee_tier = 100;
        let err = builder.build_swap_from_params(&p).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFeeTier);
    }

    #[test]
    fn test_approval_defaults_to_max() {
        let builder = TransactionBuilder::new(vec![500]);
        let tx = builder.build_approval(USDC, SWAP_ROUTER_02, None);
        let decoded = approveCall::abi_decode(&tx.data, true).unwrap();
        assert_eq!(tx.to, USDC);
        assert_eq!(decoded.spender, SWAP_ROUTER_02);
        assert_eq!(decoded.amount, U256::MAX);
    }

    #[test]
    fn test_allowance_roundtrip() {
        let data = encode_allowance(Address::repeat_byte(1), SWAP_ROUTER_02);
        assert_eq!(&data[..4], allowanceCall::SELECTOR.as_slice());

        let raw = U256::from(42u64).to_be_bytes::<32>();
        assert_eq!(decode_allowance(&raw).unwrap(), U256::from(42u64));
        assert!(decode_allowance(&[0u8; 3]).is_err());
    }

    #[test]
    fn test_gas_limit_buffer() {
        assert_eq!(TransactionBuilder::swap_gas_limit(100_000), 120_000);
        assert_eq!(TransactionBuilder::swap_gas_limit(0), SWAP_GAS_FALLBACK);
    }
}
