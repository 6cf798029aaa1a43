// dex-intake: order intake and margin risk engine for a DEX backend.
// build -> stage -> sign -> place. matching and settlement happen elsewhere;
// this crate validates, prices, stages and hands off.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: MarketId, Side, Price, Quote, Leverage, Fingerprint
//   2.x  market.rs: market config, quantization, MarketCatalog
//   3.x  margin.rs: collateral/borrow split, liquidation price, admission
//   4.x  fee.rs: maker/taker/gas fees with hold discount
//   5.x  validation.rs: request validation orchestration
//   6.x  fingerprint.rs: canonical order encoding + expiry rules
//   6.1  staging.rs: TTL staging cache, atomic consume
//   6.2  signature.rs: EIP-191 signer recovery
//   7.x  config.rs: protocol constants, ttls, fee tiers, env presets
//   8.x  service/: intake service: build, place, cancel, queries, margin
//   9.x  finalizer.rs: signed order -> placement event
//   9.1  cancel.rs: cancel events for pending orders
//   10.x account.rs: margin positions + account health summary
//   11.x events.rs: engine event wire format + EventQueue
//   12.x balance.rs: balances, allowances, locked amounts
//   12.3 chain.rs: add collateral / repay loan gateway
//   13.x clock.rs: injected time source
//   14.x api.rs: typed request/response envelopes, error codes
//   15.x memory.rs: in-memory collaborators (sim + tests)

// core modules
pub mod account;
pub mod fee;
pub mod margin;
pub mod market;
pub mod order;
pub mod types;
pub mod validation;

// order lifecycle
pub mod cancel;
pub mod events;
pub mod finalizer;
pub mod fingerprint;
pub mod service;
pub mod signature;
pub mod staging;

// integration modules
pub mod api;
pub mod balance;
pub mod chain;
pub mod clock;
pub mod config;
pub mod error;
pub mod memory;

// re exports for convenience
pub use account::*;
pub use api::{ApiError, ApiRequest, ApiResponse, ErrorCode};
pub use balance::{BalanceOracle, LockedBalance};
pub use cancel::CancelOutcome;
pub use chain::{ChainGateway, CollateralTransfer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, Environment, FeeConfig, ServiceConfig};
pub use error::CollaboratorError;
pub use events::{EngineEvent, EventKind, EventPayload, EventQueue};
pub use fee::*;
pub use margin::*;
pub use market::*;
pub use order::*;
pub use service::*;
pub use staging::{KeyValueStore, OrderStagingCache, StagedOrder};
pub use types::*;
pub use validation::{OrderRequest, ValidatedOrder};
