//! Canonical encoding of an order's signed terms.
//!
//! The fingerprint is keccak256 over the ABI encoding of the terms. It is the
//! order id, the staging key and the message the trader signs, so the
//! encoding must be byte-for-byte stable: same terms, same fingerprint.
//!
//! Amounts are encoded as integers in each token's native decimals and fee
//! rates as 18-decimal fixed point. Leveraged orders wrap the spot terms in a
//! batch of `[Transfer, Borrow, Trade]` actions.

use crate::types::{Address, Fingerprint, MarketId, Timestamp};
use ethers::abi::{encode, Token as AbiToken};
use ethers::types::U256;
use ethers::utils::keccak256;
use rust_decimal::Decimal;

const SECS_PER_YEAR: i64 = 365 * 24 * 3600;
const RELATIVE_EXPIRY_LIMIT: i64 = 5 * SECS_PER_YEAR;
const NO_EXPIRY: i64 = 100 * SECS_PER_YEAR;

/// Fixed point used for fee rates in the signed payload
pub const FEE_RATE_DECIMALS: u32 = 18;

/// Scales a human amount to integer native units, truncating extra precision.
pub fn to_native_units(value: Decimal, decimals: u32) -> Result<U256, FingerprintError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(FingerprintError::NegativeAmount(value));
    }
    let mantissa = U256::from(value.mantissa().unsigned_abs());
    let scale = value.scale();
    if decimals >= scale {
        mantissa
            .checked_mul(U256::exp10((decimals - scale) as usize))
            .ok_or(FingerprintError::Overflow { value, decimals })
    } else {
        Ok(mantissa / U256::exp10((scale - decimals) as usize))
    }
}

/// Absolute expiry in unix seconds for a requested expiry.
///
/// 0 never expires (100 years out), values under five years are a lifetime
/// relative to now, future timestamps are kept as is. A timestamp in the past
/// is treated like 0.
pub fn resolve_expiry(requested: i64, now: Timestamp) -> i64 {
    let now_secs = now.as_secs();
    if requested > 0 && requested < RELATIVE_EXPIRY_LIMIT {
        now_secs + requested
    } else if requested >= now_secs && requested > 0 {
        requested
    } else {
        now_secs + NO_EXPIRY
    }
}

/// Everything the exchange contract checks on a spot order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerms {
    pub protocol_version: u32,
    pub market_id: MarketId,
    pub trader: Address,
    pub relayer: Address,
    pub base_token: Address,
    pub quote_token: Address,
    pub base_token_amount: U256,
    pub quote_token_amount: U256,
    pub gas_token_amount: U256,
    pub expires_at: i64,
    pub salt: u64,
    pub maker_fee_rate: U256,
    pub taker_fee_rate: U256,
    pub maker_rebate_rate: U256,
    pub is_sell: bool,
    pub is_market: bool,
}

impl OrderTerms {
    fn tokens(&self) -> Vec<AbiToken> {
        vec![
            AbiToken::Uint(U256::from(self.protocol_version)),
            AbiToken::String(self.market_id.as_str().to_string()),
            AbiToken::Address(self.trader),
            AbiToken::Address(self.relayer),
            AbiToken::Address(self.base_token),
            AbiToken::Address(self.quote_token),
            AbiToken::Uint(self.base_token_amount),
            AbiToken::Uint(self.quote_token_amount),
            AbiToken::Uint(self.gas_token_amount),
            AbiToken::Uint(U256::from(self.expires_at.max(0) as u64)),
            AbiToken::Uint(U256::from(self.salt)),
            AbiToken::Uint(self.maker_fee_rate),
            AbiToken::Uint(self.taker_fee_rate),
            AbiToken::Uint(self.maker_rebate_rate),
            AbiToken::Bool(self.is_sell),
            AbiToken::Bool(self.is_market),
        ]
    }

    pub fn encode(&self) -> Vec<u8> {
        encode(&self.tokens())
    }
}

/// One step of a leveraged order batch, executed atomically on chain.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchAction {
    /// Move collateral from the trader's common balance into the market's margin account
    Transfer {
        asset: Address,
        market_id: MarketId,
        amount: U256,
    },
    Borrow {
        market_id: MarketId,
        asset: Address,
        amount: U256,
    },
    Trade(OrderTerms),
}

impl BatchAction {
    fn action_type(&self) -> u8 {
        match self {
            BatchAction::Transfer { .. } => 0,
            BatchAction::Borrow { .. } => 1,
            BatchAction::Trade(_) => 2,
        }
    }

    fn params(&self, trader: Address) -> Vec<u8> {
        match self {
            BatchAction::Transfer {
                asset,
                market_id,
                amount,
            } => encode(&[
                AbiToken::Address(*asset),
                AbiToken::Address(trader),
                AbiToken::String(market_id.as_str().to_string()),
                AbiToken::Uint(*amount),
            ]),
            BatchAction::Borrow {
                market_id,
                asset,
                amount,
            } => encode(&[
                AbiToken::String(market_id.as_str().to_string()),
                AbiToken::Address(*asset),
                AbiToken::Uint(*amount),
            ]),
            BatchAction::Trade(terms) => terms.encode(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarginBatch {
    pub trader: Address,
    pub actions: Vec<BatchAction>,
}

impl MarginBatch {
    pub fn encode(&self) -> Vec<u8> {
        let actions = self
            .actions
            .iter()
            .map(|action| {
                AbiToken::Tuple(vec![
                    AbiToken::Uint(U256::from(action.action_type())),
                    AbiToken::Bytes(action.params(self.trader)),
                ])
            })
            .collect();
        encode(&[AbiToken::Address(self.trader), AbiToken::Array(actions)])
    }
}

/// Hashes an already encoded payload.
pub fn fingerprint_of(payload: &[u8]) -> Fingerprint {
    Fingerprint::from_bytes(keccak256(payload))
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FingerprintError {
    #[error("cannot encode negative amount {0}")]
    NegativeAmount(Decimal),

    #[error("{value} does not fit 256 bits at {decimals} decimals")]
    Overflow { value: Decimal, decimals: u32 },
}
