//! Durable order record and read access to the order store.
//!
//! Orders are written by the matching engine once it consumes a placement
//! event. This crate only builds the initial record and reads it back for
//! queries and cancellation.

use crate::error::CollaboratorError;
use crate::margin::MarginParameters;
use crate::staging::StagedOrder;
use crate::types::{Address, Fingerprint, MarketId, OrderType, Price, Quote, Side, Timestamp};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    /// Open, nothing matched yet.
    Pending,
    /// Matched in part, remainder still open.
    PartiallyFilled,
    /// Fully matched, settlement not yet confirmed.
    Filled,
    /// Settled on chain.
    Confirmed,
    Canceled,
}

impl OrderStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }
}

/// A placed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Fingerprint,
    pub trader_address: Address,
    #[serde(rename = "marketID")]
    pub market_id: MarketId,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub price: Price,
    pub amount: Decimal,
    pub status: OrderStatus,
    pub available_amount: Decimal,
    pub pending_amount: Decimal,
    pub confirmed_amount: Decimal,
    pub canceled_amount: Decimal,
    pub maker_fee_rate: Decimal,
    pub taker_fee_rate: Decimal,
    pub maker_rebate_rate: Decimal,
    pub gas_fee_amount: Quote,
    #[serde(rename = "version")]
    pub protocol_version: u32,
    /// Encoded terms that were signed
    pub json: String,
    pub signature: String,
    pub margin: Option<MarginParameters>,
    pub expires_at: i64,
    pub created_at: Timestamp,
}

impl Order {
    /// Fresh pending order with the whole amount available
    pub fn from_staged(staged: StagedOrder, signature: String) -> Self {
        Self {
            id: staged.fingerprint,
            trader_address: staged.trader,
            market_id: staged.market_id,
            side: staged.side,
            order_type: staged.order_type,
            price: staged.price,
            amount: staged.amount,
            status: OrderStatus::Pending,
            available_amount: staged.amount,
            pending_amount: Decimal::ZERO,
            confirmed_amount: Decimal::ZERO,
            canceled_amount: Decimal::ZERO,
            maker_fee_rate: staged.maker_fee_rate,
            taker_fee_rate: staged.taker_fee_rate,
            maker_rebate_rate: staged.maker_rebate_rate,
            gas_fee_amount: staged.fee.gas_fee_amount,
            protocol_version: staged.protocol_version,
            json: staged.payload,
            signature,
            margin: staged.margin,
            expires_at: staged.expires_at,
            created_at: staged.created_at,
        }
    }

    pub fn is_margin(&self) -> bool {
        self.margin.is_some()
    }
}

/// Page of a trader's orders
#[derive(Debug, Clone, PartialEq)]
pub struct OrderFilter {
    pub market_id: Option<MarketId>,
    pub status: OrderStatus,
    pub limit: u64,
    pub offset: u64,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_id(&self, id: &Fingerprint) -> Result<Option<Order>, CollaboratorError>;

    /// Total matching count and the requested page
    async fn find_by_account(
        &self,
        trader: Address,
        filter: &OrderFilter,
    ) -> Result<(u64, Vec<Order>), CollaboratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::PartiallyFilled).unwrap(),
            "\"partially-filled\""
        );
        let status: OrderStatus = serde_json::from_str("\"canceled\"").unwrap();
        assert_eq!(status, OrderStatus::Canceled);
        assert!(OrderStatus::Pending.is_pending());
        assert!(!OrderStatus::Confirmed.is_pending());
    }
}
