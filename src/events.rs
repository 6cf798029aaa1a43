// 11.0: messages handed to the matching engine. one queue per market so the
// engine sees a market's events in publish order.
// wire shape: {"type": ..., "marketID": ..., "payload": ...}

use crate::error::CollaboratorError;
use crate::order::Order;
use crate::types::{Fingerprint, MarketId, Price, Side};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    NewOrder,
    NewMarginBatch,
    CancelOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(rename = "marketID")]
    pub market_id: MarketId,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    Order(Box<Order>),
    Cancel(CancelPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelPayload {
    #[serde(rename = "orderID")]
    pub order_id: Fingerprint,
    pub price: Price,
    pub side: Side,
}

impl EngineEvent {
    /// NewMarginBatch for leveraged orders, NewOrder otherwise
    pub fn placement(order: Order) -> Self {
        let kind = if order.is_margin() {
            EventKind::NewMarginBatch
        } else {
            EventKind::NewOrder
        };
        Self {
            kind,
            market_id: order.market_id.clone(),
            payload: EventPayload::Order(Box::new(order)),
        }
    }

    pub fn cancel(order: &Order) -> Self {
        Self {
            kind: EventKind::CancelOrder,
            market_id: order.market_id.clone(),
            payload: EventPayload::Cancel(CancelPayload {
                order_id: order.id,
                price: order.price,
                side: order.side,
            }),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CollaboratorError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CollaboratorError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Per-market FIFO toward the matching engine
#[async_trait]
pub trait EventQueue: Send + Sync {
    async fn push(&self, market_id: &MarketId, message: Vec<u8>) -> Result<(), CollaboratorError>;
}
