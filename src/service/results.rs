// 8.0.2: result types and errors for service operations.

use crate::error::CollaboratorError;
use crate::fee::FeeBreakdown;
use crate::fingerprint::FingerprintError;
use crate::margin::{MarginError, MarginParameters};
use crate::market::MarketError;
use crate::order::Order;
use crate::types::{Fingerprint, MarketId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/** 8.0.2.1: what build returns. the client signs `id` and comes back to place */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOrderResult {
    pub id: Fingerprint,
    /// 0x hex of the encoded terms
    pub json: String,
    pub expires_at: i64,
    pub fee: FeeBreakdown,
    pub margin: Option<MarginParameters>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrdersPage {
    pub count: u64,
    pub orders: Vec<Order>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("market {0} not found")]
    MarketNotFound(MarketId),

    #[error("market rule violated: {0}")]
    Market(#[from] MarketError),

    #[error("insufficient {asset} balance: available {available}, required {required}")]
    InsufficientBalance {
        asset: String,
        available: Decimal,
        required: Decimal,
    },

    #[error("insufficient {asset} allowance: available {available}, required {required}")]
    InsufficientAllowance {
        asset: String,
        available: Decimal,
        required: Decimal,
    },

    #[error("margin check failed: {0}")]
    Margin(#[from] MarginError),

    #[error("signature does not match trader")]
    InvalidSignature,

    #[error("staged order {0} expired or already placed")]
    StagedOrderExpiredOrMissing(Fingerprint),

    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("placement failed: {0}")]
    PlacementFailed(String),

    #[error("system error: {0}")]
    System(#[from] CollaboratorError),
}

impl From<FingerprintError> for ServiceError {
    fn from(err: FingerprintError) -> Self {
        ServiceError::InvalidParam(err.to_string())
    }
}
