// 8.0 service/core.rs: the service struct and its wiring.

use crate::account::PositionSource;
use crate::balance::BalanceOracle;
use crate::cancel::CancellationHandler;
use crate::chain::ChainGateway;
use crate::clock::Clock;
use crate::config::ServiceConfig;
use crate::events::EventQueue;
use crate::finalizer::OrderFinalizer;
use crate::market::MarketCatalog;
use crate::order::OrderStore;
use crate::signature::SignatureVerifier;
use crate::staging::{KeyValueStore, OrderStagingCache};
use crate::types::Address;
use crate::validation::RequestValidator;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything the service talks to. swap any of them for a test double.
#[derive(Clone)]
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub catalog: Arc<dyn MarketCatalog>,
    pub balances: Arc<dyn BalanceOracle>,
    pub staging: Arc<dyn KeyValueStore>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub queue: Arc<dyn EventQueue>,
    pub orders: Arc<dyn OrderStore>,
    pub positions: Arc<dyn PositionSource>,
    pub chain: Arc<dyn ChainGateway>,
}

/** 8.1: main service struct. holds no mutable state of its own */
pub struct ExchangeService {
    pub(super) config: ServiceConfig,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) catalog: Arc<dyn MarketCatalog>,
    pub(super) balances: Arc<dyn BalanceOracle>,
    pub(super) orders: Arc<dyn OrderStore>,
    pub(super) positions: Arc<dyn PositionSource>,
    pub(super) chain: Arc<dyn ChainGateway>,
    pub(super) validator: RequestValidator,
    pub(super) staging: OrderStagingCache,
    pub(super) finalizer: OrderFinalizer,
    pub(super) canceller: CancellationHandler,
}

impl ExchangeService {
    pub fn new(config: ServiceConfig, deps: Collaborators) -> Self {
        let staging = OrderStagingCache::new(deps.staging);
        let validator =
            RequestValidator::new(deps.catalog.clone(), deps.balances.clone(), config.clone());
        let finalizer = OrderFinalizer::new(deps.verifier, staging.clone(), deps.queue.clone());
        let canceller = CancellationHandler::new(deps.orders.clone(), deps.queue);

        Self {
            config,
            clock: deps.clock,
            catalog: deps.catalog,
            balances: deps.balances,
            orders: deps.orders,
            positions: deps.positions,
            chain: deps.chain,
            validator,
            staging,
            finalizer,
            canceller,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // verbose config promotes per-request logs to info
    pub(super) fn log_request(&self, operation: &'static str, trader: Option<Address>) {
        if self.config.verbose {
            info!(operation, ?trader, "request");
        } else {
            debug!(operation, ?trader, "request");
        }
    }
}
