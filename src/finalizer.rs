// 9.0: place = verify signature -> ownership peek -> atomic take -> build order
// -> publish. a consumed entry is never put back, even when publishing fails.

use crate::events::{EngineEvent, EventQueue};
use crate::order::Order;
use crate::service::ServiceError;
use crate::signature::SignatureVerifier;
use crate::staging::OrderStagingCache;
use crate::types::{Address, Fingerprint};
use std::sync::Arc;
use tracing::{info, warn};

pub struct OrderFinalizer {
    verifier: Arc<dyn SignatureVerifier>,
    staging: OrderStagingCache,
    queue: Arc<dyn EventQueue>,
}

impl OrderFinalizer {
    pub fn new(
        verifier: Arc<dyn SignatureVerifier>,
        staging: OrderStagingCache,
        queue: Arc<dyn EventQueue>,
    ) -> Self {
        Self {
            verifier,
            staging,
            queue,
        }
    }

    pub async fn finalize(
        &self,
        fingerprint: Fingerprint,
        trader: Address,
        signature: &str,
    ) -> Result<Order, ServiceError> {
        if !self.verifier.verify(&fingerprint, signature, trader).await? {
            return Err(ServiceError::InvalidSignature);
        }

        // a valid signature from someone else must not burn the owner's entry
        if let Some(staged) = self.staging.peek(&fingerprint).await? {
            if staged.trader != trader {
                warn!(id = %fingerprint, ?trader, "placement by non-owner");
                return Err(ServiceError::InvalidSignature);
            }
        }

        let mut staged = self
            .staging
            .consume(&fingerprint)
            .await?
            .ok_or(ServiceError::StagedOrderExpiredOrMissing(fingerprint))?;
        if staged.trader != trader {
            warn!(
                id = %fingerprint,
                ?trader,
                owner = ?staged.trader,
                "staged order consumed by non-owner, entry lost"
            );
            return Err(ServiceError::InvalidSignature);
        }
        staged.signature = Some(signature.to_string());

        let order = Order::from_staged(staged, signature.to_string());
        let event = EngineEvent::placement(order.clone());
        let kind = event.kind;
        let message = event
            .to_bytes()
            .map_err(|e| ServiceError::PlacementFailed(e.to_string()))?;

        self.queue
            .push(&order.market_id, message)
            .await
            .map_err(|e| {
                warn!(id = %fingerprint, error = %e, "event publish failed, order dropped");
                ServiceError::PlacementFailed(e.to_string())
            })?;

        info!(id = %order.id, market = %order.market_id, ?kind, "order placed");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::CollaboratorError;
    use crate::fee::compute_fee;
    use crate::market::Market;
    use crate::memory::{InMemoryEventQueue, InMemoryStagingStore};
    use crate::staging::{KeyValueStore, StagedOrder};
    use crate::types::{OrderType, Price, Quote, Side, Timestamp};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct AcceptAll;

    #[async_trait]
    impl SignatureVerifier for AcceptAll {
        async fn verify(
            &self,
            _fingerprint: &Fingerprint,
            _signature: &str,
            _trader: Address,
        ) -> Result<bool, CollaboratorError> {
            Ok(true)
        }
    }

    // entry written between the ownership peek and the take
    struct LateWriter(InMemoryStagingStore);

    #[async_trait]
    impl KeyValueStore for LateWriter {
        async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CollaboratorError> {
            self.0.set(key, value, ttl).await
        }

        async fn get(&self, _key: &str) -> Result<Option<String>, CollaboratorError> {
            Ok(None)
        }

        async fn take(&self, key: &str) -> Result<Option<String>, CollaboratorError> {
            self.0.take(key).await
        }
    }

    fn staged(fingerprint: Fingerprint, trader: Address) -> StagedOrder {
        let market = Market::eth_usdc();
        StagedOrder {
            fingerprint,
            trader,
            market_id: market.id.clone(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            price: Price::new_unchecked(dec!(2000)),
            amount: dec!(1),
            expires_at: 1_900_000_000,
            salt: 7,
            protocol_version: 2,
            maker_fee_rate: market.maker_fee_rate,
            taker_fee_rate: market.taker_fee_rate,
            maker_rebate_rate: Decimal::ZERO,
            fee: compute_fee(&market, Quote::new(dec!(2000)), Decimal::ONE, 2),
            margin: None,
            payload: "0x00".to_string(),
            created_at: Timestamp::from_secs(1_700_000_000),
            signature: None,
        }
    }

    #[tokio::test]
    async fn foreign_take_is_rejected_and_nothing_published() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_700_000_000)));
        let store = Arc::new(LateWriter(InMemoryStagingStore::new(clock)));
        let staging = OrderStagingCache::new(store.clone());
        let queue = Arc::new(InMemoryEventQueue::new());
        let finalizer = OrderFinalizer::new(Arc::new(AcceptAll), staging.clone(), queue.clone());

        let owner = Address::from_low_u64_be(1);
        let other = Address::from_low_u64_be(2);
        let fp = Fingerprint::from_bytes([5; 32]);
        staging
            .stage(&staged(fp, owner), Duration::from_secs(60))
            .await
            .unwrap();

        let result = finalizer.finalize(fp, other, "0xsig").await;
        assert!(matches!(result, Err(ServiceError::InvalidSignature)));
        assert_eq!(queue.total(), 0);
        // the take already happened, the entry is gone for the owner too
        assert!(store.0.is_empty());
        let retry = finalizer.finalize(fp, owner, "0xsig").await;
        assert!(matches!(retry, Err(ServiceError::StagedOrderExpiredOrMissing(_))));
    }
}
