//! Typed request and response envelopes.
//!
//! Each endpoint is one `ApiRequest` variant and one `ApiResponse` variant, so
//! dispatch is a plain `match`. Errors leave the service as an `ApiError`: a
//! stable machine-readable code plus the human-readable message.

use crate::account::{MarginAccountSummary, MarginPosition, MarketFilter};
use crate::balance::LockedBalance;
use crate::cancel::CancelOutcome;
use crate::margin::MarginError;
use crate::market::MarketError;
use crate::order::{Order, OrderStatus};
use crate::service::{BuildOrderResult, ExchangeService, OrdersPage, ServiceError};
use crate::types::{Address, MarketId};
use crate::validation::OrderRequest;
use ethers::types::TxHash;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum ApiRequest {
    BuildOrder {
        trader: Address,
        order: OrderRequest,
    },
    PlaceOrder {
        trader: Address,
        id: String,
        signature: String,
    },
    CancelOrder {
        id: String,
    },
    #[serde(rename_all = "camelCase")]
    GetOrders {
        trader: Address,
        #[serde(default, rename = "marketID")]
        market_id: Option<MarketId>,
        #[serde(default)]
        status: Option<OrderStatus>,
        #[serde(default)]
        page: Option<u64>,
        #[serde(default)]
        per_page: Option<u64>,
    },
    GetSingleOrder {
        id: String,
    },
    GetLockedBalance {
        trader: Address,
    },
    GetMarginPositions {
        trader: Address,
    },
    GetMarginAccountSummary {
        trader: Address,
        #[serde(default, rename = "marketID")]
        market_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    AddCollateral {
        trader: Address,
        #[serde(rename = "marketID")]
        market_id: MarketId,
        asset_symbol: String,
        amount: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    RepayLoan {
        trader: Address,
        #[serde(rename = "marketID")]
        market_id: MarketId,
        asset_symbol: String,
        amount: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum ApiResponse {
    Built(BuildOrderResult),
    Placed(Box<Order>),
    Cancel(CancelOutcome),
    Orders(OrdersPage),
    Order(Box<Order>),
    LockedBalances(Vec<LockedBalance>),
    MarginPositions(Vec<MarginPosition>),
    MarginSummary(MarginAccountSummary),
    Transaction { tx_hash: TxHash },
}

/// Stable codes clients branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidParam,
    MarketNotFound,
    InvalidPrice,
    InvalidPriceUnit,
    InvalidAmount,
    InvalidAmountUnit,
    #[serde(rename = "order_less_than_min_order_size")]
    OrderTooSmall,
    InsufficientBalance,
    InsufficientAllowance,
    InsufficientCollateral,
    InvalidSignature,
    StagedOrderExpiredOrMissing,
    OrderNotFound,
    PlacementFailed,
    SystemError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidParam => "invalid_param",
            ErrorCode::MarketNotFound => "market_not_found",
            ErrorCode::InvalidPrice => "invalid_price",
            ErrorCode::InvalidPriceUnit => "invalid_price_unit",
            ErrorCode::InvalidAmount => "invalid_amount",
            ErrorCode::InvalidAmountUnit => "invalid_amount_unit",
            ErrorCode::OrderTooSmall => "order_less_than_min_order_size",
            ErrorCode::InsufficientBalance => "insufficient_balance",
            ErrorCode::InsufficientAllowance => "insufficient_allowance",
            ErrorCode::InsufficientCollateral => "insufficient_collateral",
            ErrorCode::InvalidSignature => "invalid_signature",
            ErrorCode::StagedOrderExpiredOrMissing => "staged_order_expired_or_missing",
            ErrorCode::OrderNotFound => "order_not_found",
            ErrorCode::PlacementFailed => "placement_failed",
            ErrorCode::SystemError => "system_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&ServiceError> for ErrorCode {
    fn from(err: &ServiceError) -> Self {
        match err {
            ServiceError::InvalidParam(_) => ErrorCode::InvalidParam,
            ServiceError::MarketNotFound(_) => ErrorCode::MarketNotFound,
            ServiceError::Market(MarketError::InvalidPrice(_)) => ErrorCode::InvalidPrice,
            ServiceError::Market(MarketError::InvalidPriceUnit { .. }) => ErrorCode::InvalidPriceUnit,
            ServiceError::Market(MarketError::InvalidAmount(_)) => ErrorCode::InvalidAmount,
            ServiceError::Market(MarketError::InvalidAmountUnit { .. }) => {
                ErrorCode::InvalidAmountUnit
            }
            ServiceError::Market(MarketError::OrderTooSmall { .. }) => ErrorCode::OrderTooSmall,
            ServiceError::Market(
                MarketError::NotionalOverflow { .. } | MarketError::NotionalPrecision { .. },
            ) => ErrorCode::InvalidParam,
            ServiceError::InsufficientBalance { .. } => ErrorCode::InsufficientBalance,
            ServiceError::InsufficientAllowance { .. } => ErrorCode::InsufficientAllowance,
            ServiceError::Margin(MarginError::InsufficientCollateral { .. }) => {
                ErrorCode::InsufficientCollateral
            }
            ServiceError::Margin(MarginError::InvalidParam(_)) => ErrorCode::InvalidParam,
            ServiceError::InvalidSignature => ErrorCode::InvalidSignature,
            ServiceError::StagedOrderExpiredOrMissing(_) => ErrorCode::StagedOrderExpiredOrMissing,
            ServiceError::OrderNotFound(_) => ErrorCode::OrderNotFound,
            ServiceError::PlacementFailed(_) => ErrorCode::PlacementFailed,
            ServiceError::System(_) => ErrorCode::SystemError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self {
            code: ErrorCode::from(&err),
            message: err.to_string(),
        }
    }
}

impl ExchangeService {
    /// Route a request to its handler
    pub async fn handle(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let response = match request {
            ApiRequest::BuildOrder { trader, order } => {
                ApiResponse::Built(self.build_order(&order, trader).await?)
            }
            ApiRequest::PlaceOrder {
                trader,
                id,
                signature,
            } => ApiResponse::Placed(Box::new(self.place_order(&id, trader, &signature).await?)),
            ApiRequest::CancelOrder { id } => ApiResponse::Cancel(self.cancel_order(&id).await?),
            ApiRequest::GetOrders {
                trader,
                market_id,
                status,
                page,
                per_page,
            } => ApiResponse::Orders(
                self.get_orders(trader, market_id, status, page, per_page)
                    .await?,
            ),
            ApiRequest::GetSingleOrder { id } => {
                ApiResponse::Order(Box::new(self.get_single_order(&id).await?))
            }
            ApiRequest::GetLockedBalance { trader } => {
                ApiResponse::LockedBalances(self.locked_balances(trader).await?)
            }
            ApiRequest::GetMarginPositions { trader } => {
                ApiResponse::MarginPositions(self.margin_positions(trader).await?)
            }
            ApiRequest::GetMarginAccountSummary { trader, market_id } => {
                let filter = MarketFilter::parse(market_id.as_deref());
                ApiResponse::MarginSummary(self.margin_account_summary(trader, filter).await?)
            }
            ApiRequest::AddCollateral {
                trader,
                market_id,
                asset_symbol,
                amount,
            } => ApiResponse::Transaction {
                tx_hash: self
                    .add_collateral(trader, &market_id, &asset_symbol, amount)
                    .await?,
            },
            ApiRequest::RepayLoan {
                trader,
                market_id,
                asset_symbol,
                amount,
            } => ApiResponse::Transaction {
                tx_hash: self
                    .repay_loan(trader, &market_id, &asset_symbol, amount)
                    .await?,
            },
        };
        Ok(response)
    }
}
