//! In-memory collaborators.
//!
//! Back the simulation binary and the test suites. Each one is safe to share
//! across tasks; maps are `DashMap` so concurrent requests never block on a
//! global lock.

use crate::account::{MarginPosition, PositionSource};
use crate::balance::BalanceOracle;
use crate::chain::{ChainGateway, CollateralTransfer};
use crate::clock::Clock;
use crate::config::ServiceConfig;
use crate::error::CollaboratorError;
use crate::events::{EngineEvent, EventQueue};
use crate::market::{Market, MarketCatalog, Token};
use crate::order::{Order, OrderFilter, OrderStatus, OrderStore};
use crate::service::Collaborators;
use crate::signature::EcdsaVerifier;
use crate::staging::KeyValueStore;
use crate::types::{Address, Fingerprint, MarketId, Timestamp};
use async_trait::async_trait;
use dashmap::DashMap;
use ethers::types::TxHash;
use ethers::utils::keccak256;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    markets: DashMap<MarketId, Market>,
    tokens: DashMap<String, Token>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the market and both of its tokens
    pub fn add_market(&self, market: Market) {
        self.add_token(market.base_token.clone());
        self.add_token(market.quote_token.clone());
        self.markets.insert(market.id.clone(), market);
    }

    pub fn add_token(&self, token: Token) {
        self.tokens.insert(token.symbol.to_ascii_uppercase(), token);
    }
}

#[async_trait]
impl MarketCatalog for InMemoryCatalog {
    async fn market(&self, id: &MarketId) -> Result<Option<Market>, CollaboratorError> {
        Ok(self.markets.get(id).map(|m| m.value().clone()))
    }

    async fn token(&self, symbol: &str) -> Result<Option<Token>, CollaboratorError> {
        Ok(self
            .tokens
            .get(&symbol.to_ascii_uppercase())
            .map(|t| t.value().clone()))
    }

    async fn tokens(&self) -> Result<Vec<Token>, CollaboratorError> {
        let mut tokens: Vec<Token> = self.tokens.iter().map(|t| t.value().clone()).collect();
        tokens.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(tokens)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Holding {
    balance: Decimal,
    locked: Decimal,
}

/// Balances, locks and allowances. `set_allowance` and `fund` approve the
/// configured spender; any other spender sees no allowance.
#[derive(Debug)]
pub struct InMemoryBalances {
    spender: Address,
    holdings: DashMap<(Address, Address), Holding>,
    allowances: DashMap<(Address, Address, Address), Decimal>,
}

impl Default for InMemoryBalances {
    fn default() -> Self {
        Self::with_spender(ServiceConfig::default().proxy)
    }
}

impl InMemoryBalances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_spender(spender: Address) -> Self {
        Self {
            spender,
            holdings: DashMap::new(),
            allowances: DashMap::new(),
        }
    }

    fn update(&self, token: &Token, owner: Address, f: impl FnOnce(&mut Holding)) {
        let mut entry = self.holdings.entry((token.address, owner)).or_default();
        f(entry.value_mut());
    }

    fn holding(&self, token: &Token, owner: Address) -> Holding {
        self.holdings
            .get(&(token.address, owner))
            .map(|h| *h.value())
            .unwrap_or_default()
    }

    pub fn set_balance(&self, token: &Token, owner: Address, amount: Decimal) {
        self.update(token, owner, |h| h.balance = amount);
    }

    pub fn set_allowance(&self, token: &Token, owner: Address, amount: Decimal) {
        self.allowances
            .insert((token.address, owner, self.spender), amount);
    }

    pub fn set_locked(&self, token: &Token, owner: Address, amount: Decimal) {
        self.update(token, owner, |h| h.locked = amount);
    }

    /// Balance plus a matching allowance
    pub fn fund(&self, token: &Token, owner: Address, amount: Decimal) {
        self.set_balance(token, owner, amount);
        self.set_allowance(token, owner, amount);
    }
}

#[async_trait]
impl BalanceOracle for InMemoryBalances {
    async fn balance(&self, token: &Token, owner: Address) -> Result<Decimal, CollaboratorError> {
        Ok(self.holding(token, owner).balance)
    }

    async fn allowance(
        &self,
        token: &Token,
        owner: Address,
        spender: Address,
    ) -> Result<Decimal, CollaboratorError> {
        Ok(self
            .allowances
            .get(&(token.address, owner, spender))
            .map(|a| *a.value())
            .unwrap_or_default())
    }

    async fn locked_balance(
        &self,
        token: &Token,
        owner: Address,
    ) -> Result<Decimal, CollaboratorError> {
        Ok(self.holding(token, owner).locked)
    }
}

/// TTL map. expiry is judged against the injected clock on every read.
pub struct InMemoryStagingStore {
    clock: Arc<dyn Clock>,
    entries: DashMap<String, (String, Timestamp)>,
}

impl InMemoryStagingStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStagingStore {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CollaboratorError> {
        let now = self.clock.now();
        self.entries.retain(|_, (_, expires)| *expires > now);
        let expires = now.plus_millis(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));
        self.entries.insert(key.to_string(), (value, expires));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CollaboratorError> {
        let now = self.clock.now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.value().1 > now)
            .map(|entry| entry.value().0.clone()))
    }

    async fn take(&self, key: &str) -> Result<Option<String>, CollaboratorError> {
        let now = self.clock.now();
        Ok(self
            .entries
            .remove(key)
            .filter(|(_, (_, expires))| *expires > now)
            .map(|(_, (value, _))| value))
    }
}

/// Per-market message log. `fail_next` makes the following push fail once.
#[derive(Debug, Default)]
pub struct InMemoryEventQueue {
    queues: DashMap<MarketId, Vec<Vec<u8>>>,
    fail_next: AtomicBool,
}

impl InMemoryEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Decoded events for one market, oldest first
    pub fn events(&self, market_id: &MarketId) -> Vec<EngineEvent> {
        self.queues
            .get(market_id)
            .map(|q| {
                q.value()
                    .iter()
                    .filter_map(|bytes| EngineEvent::from_bytes(bytes).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.queues.iter().map(|q| q.value().len()).sum()
    }
}

#[async_trait]
impl EventQueue for InMemoryEventQueue {
    async fn push(&self, market_id: &MarketId, message: Vec<u8>) -> Result<(), CollaboratorError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CollaboratorError::unreachable("event queue", "broker connection reset"));
        }
        self.queues
            .entry(market_id.clone())
            .or_default()
            .push(message);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<Fingerprint, Order>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, order: Order) {
        self.orders.insert(order.id, order);
    }

    /// Returns false when the order is unknown
    pub fn set_status(&self, id: &Fingerprint, status: OrderStatus) -> bool {
        match self.orders.get_mut(id) {
            Some(mut order) => {
                order.status = status;
                true
            }
            None => false,
        }
    }

    /// Stands in for the matching engine: records every placement event
    pub fn ingest(&self, events: &[EngineEvent]) {
        for event in events {
            if let crate::events::EventPayload::Order(order) = &event.payload {
                self.insert(order.as_ref().clone());
            }
        }
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn find_by_id(&self, id: &Fingerprint) -> Result<Option<Order>, CollaboratorError> {
        Ok(self.orders.get(id).map(|o| o.value().clone()))
    }

    async fn find_by_account(
        &self,
        trader: Address,
        filter: &OrderFilter,
    ) -> Result<(u64, Vec<Order>), CollaboratorError> {
        let mut matching: Vec<Order> = self
            .orders
            .iter()
            .map(|o| o.value().clone())
            .filter(|o| o.trader_address == trader && o.status == filter.status)
            .filter(|o| filter.market_id.as_ref().map_or(true, |m| &o.market_id == m))
            .collect();
        // newest first
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.0.cmp(&b.id.0)));

        let count = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(usize::try_from(filter.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(filter.limit).unwrap_or(usize::MAX))
            .collect();
        Ok((count, page))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPositions {
    positions: DashMap<Address, Vec<MarginPosition>>,
}

impl InMemoryPositions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_positions(&self, trader: Address, positions: Vec<MarginPosition>) {
        self.positions.insert(trader, positions);
    }
}

#[async_trait]
impl PositionSource for InMemoryPositions {
    async fn open_positions(&self, trader: Address) -> Result<Vec<MarginPosition>, CollaboratorError> {
        Ok(self
            .positions
            .get(&trader)
            .map(|p| p.value().clone())
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainCall {
    AddCollateral,
    RepayLoan,
}

/// Records submitted transfers and hands back a deterministic hash
#[derive(Debug, Default)]
pub struct InMemoryChain {
    submitted: DashMap<u64, (ChainCall, CollateralTransfer)>,
    nonce: AtomicU64,
    offline: AtomicBool,
}

impl InMemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Submitted calls in nonce order
    pub fn submitted(&self) -> Vec<(ChainCall, CollateralTransfer)> {
        let mut calls: Vec<(u64, (ChainCall, CollateralTransfer))> = self
            .submitted
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        calls.sort_by_key(|(nonce, _)| *nonce);
        calls.into_iter().map(|(_, call)| call).collect()
    }

    fn submit(
        &self,
        call: ChainCall,
        transfer: &CollateralTransfer,
    ) -> Result<TxHash, CollaboratorError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CollaboratorError::unreachable("chain gateway", "rpc node offline"));
        }
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let mut preimage = serde_json::to_vec(transfer)?;
        preimage.extend_from_slice(&nonce.to_be_bytes());
        self.submitted.insert(nonce, (call, transfer.clone()));
        Ok(TxHash::from(keccak256(preimage)))
    }
}

#[async_trait]
impl ChainGateway for InMemoryChain {
    async fn add_collateral(&self, transfer: &CollateralTransfer) -> Result<TxHash, CollaboratorError> {
        self.submit(ChainCall::AddCollateral, transfer)
    }

    async fn repay_loan(&self, transfer: &CollateralTransfer) -> Result<TxHash, CollaboratorError> {
        self.submit(ChainCall::RepayLoan, transfer)
    }
}

/// Every in-memory collaborator, kept typed so callers can seed and inspect them.
pub struct InMemoryBackend {
    pub clock: Arc<dyn Clock>,
    pub catalog: Arc<InMemoryCatalog>,
    pub balances: Arc<InMemoryBalances>,
    pub staging: Arc<InMemoryStagingStore>,
    pub queue: Arc<InMemoryEventQueue>,
    pub orders: Arc<InMemoryOrderStore>,
    pub positions: Arc<InMemoryPositions>,
    pub chain: Arc<InMemoryChain>,
}

impl InMemoryBackend {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            staging: Arc::new(InMemoryStagingStore::new(clock.clone())),
            clock,
            catalog: Arc::new(InMemoryCatalog::new()),
            balances: Arc::new(InMemoryBalances::new()),
            queue: Arc::new(InMemoryEventQueue::new()),
            orders: Arc::new(InMemoryOrderStore::new()),
            positions: Arc::new(InMemoryPositions::new()),
            chain: Arc::new(InMemoryChain::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            clock: self.clock.clone(),
            catalog: self.catalog.clone(),
            balances: self.balances.clone(),
            staging: self.staging.clone(),
            verifier: Arc::new(EcdsaVerifier),
            queue: self.queue.clone(),
            orders: self.orders.clone(),
            positions: self.positions.clone(),
            chain: self.chain.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn take_is_atomic_under_contention() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1)));
        let store = Arc::new(InMemoryStagingStore::new(clock));
        store
            .set("k", "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.take("k").await.unwrap() }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn set_purges_expired() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1)));
        let store = InMemoryStagingStore::new(clock.clone());
        store.set("old", "a".to_string(), Duration::from_secs(1)).await.unwrap();
        clock.advance_secs(5);
        store.set("new", "b".to_string(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn queue_fails_once() {
        let queue = InMemoryEventQueue::new();
        let market = MarketId::new("ETH-USDC");
        queue.fail_next();
        assert!(queue.push(&market, vec![1]).await.is_err());
        assert!(queue.push(&market, vec![2]).await.is_ok());
        assert_eq!(queue.total(), 1);
    }

    #[tokio::test]
    async fn offline_chain_errors() {
        let chain = InMemoryChain::new();
        let transfer = CollateralTransfer {
            trader: Address::from_low_u64_be(1),
            market_id: MarketId::new("ETH-USDC"),
            token: Market::eth_usdc().quote_token,
            amount: Decimal::ONE,
        };
        let first = chain.add_collateral(&transfer).await.unwrap();
        let second = chain.add_collateral(&transfer).await.unwrap();
        assert_ne!(first, second);

        chain.set_offline(true);
        assert!(matches!(
            chain.repay_loan(&transfer).await,
            Err(CollaboratorError::Unreachable { .. })
        ));
        assert_eq!(chain.submitted().len(), 2);
    }
}
