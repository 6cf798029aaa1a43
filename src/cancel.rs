// 9.1: cancellation. only a pending order gets a cancel event. anything already
// matched, settled or canceled is left alone and reported as resolved.

use crate::events::{EngineEvent, EventQueue};
use crate::order::OrderStore;
use crate::service::ServiceError;
use crate::types::Fingerprint;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// Cancel event handed to the engine
    Requested,
    /// Order was no longer pending, nothing sent
    AlreadyResolved,
}

pub struct CancellationHandler {
    orders: Arc<dyn OrderStore>,
    queue: Arc<dyn EventQueue>,
}

impl CancellationHandler {
    pub fn new(orders: Arc<dyn OrderStore>, queue: Arc<dyn EventQueue>) -> Self {
        Self { orders, queue }
    }

    pub async fn cancel(&self, order_id: &Fingerprint) -> Result<CancelOutcome, ServiceError> {
        let order = self
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(order_id.to_hex()))?;

        if !order.status.is_pending() {
            debug!(id = %order_id, status = ?order.status, "cancel skipped");
            return Ok(CancelOutcome::AlreadyResolved);
        }

        let message = EngineEvent::cancel(&order).to_bytes()?;
        self.queue.push(&order.market_id, message).await?;

        info!(id = %order_id, market = %order.market_id, "cancel requested");
        Ok(CancelOutcome::Requested)
    }
}
