// 6.1: staging cache. built orders wait here, keyed by fingerprint, until the
// trader signs them or the ttl runs out. consume is an atomic take so a staged
// order turns into a placed order at most once.

use crate::error::CollaboratorError;
use crate::fee::FeeBreakdown;
use crate::margin::MarginParameters;
use crate::types::{Address, Fingerprint, MarketId, OrderType, Price, Side, Timestamp};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const KEY_PREFIX: &str = "OrderCache:";

/// Key-value store with per-entry expiry. take must remove and return in one step.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CollaboratorError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CollaboratorError>;

    async fn take(&self, key: &str) -> Result<Option<String>, CollaboratorError>;
}

/** 6.1.1: a built order waiting for its signature */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedOrder {
    #[serde(rename = "id")]
    pub fingerprint: Fingerprint,
    pub trader: Address,
    #[serde(rename = "marketID")]
    pub market_id: MarketId,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Price,
    pub amount: Decimal,
    /// Unix seconds
    pub expires_at: i64,
    pub salt: u64,
    pub protocol_version: u32,
    pub maker_fee_rate: Decimal,
    pub taker_fee_rate: Decimal,
    pub maker_rebate_rate: Decimal,
    pub fee: FeeBreakdown,
    pub margin: Option<MarginParameters>,
    /// 0x hex of the encoded terms the fingerprint hashes
    pub payload: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub signature: Option<String>,
}

impl StagedOrder {
    pub fn is_margin(&self) -> bool {
        self.margin.is_some()
    }
}

pub fn cache_key(fingerprint: &Fingerprint) -> String {
    format!("{KEY_PREFIX}{}", fingerprint.to_hex())
}

#[derive(Clone)]
pub struct OrderStagingCache {
    store: Arc<dyn KeyValueStore>,
}

impl OrderStagingCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn stage(
        &self,
        order: &StagedOrder,
        ttl: Duration,
    ) -> Result<Fingerprint, CollaboratorError> {
        let value = serde_json::to_string(order)?;
        self.store
            .set(&cache_key(&order.fingerprint), value, ttl)
            .await?;
        debug!(id = %order.fingerprint, ttl_secs = ttl.as_secs(), "order staged");
        Ok(order.fingerprint)
    }

    /// Non-destructive read
    pub async fn peek(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<StagedOrder>, CollaboratorError> {
        match self.store.get(&cache_key(fingerprint)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Removes and returns the staged order. None once expired or already consumed.
    pub async fn consume(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<StagedOrder>, CollaboratorError> {
        match self.store.take(&cache_key(fingerprint)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
