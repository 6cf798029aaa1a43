// 12.3: on-chain pass-throughs for margin accounts. the gateway builds, signs
// and broadcasts the transaction. here we only validate and forward, then
// return the hash the gateway reports.

use crate::error::CollaboratorError;
use crate::market::Token;
use crate::types::{Address, MarketId};
use async_trait::async_trait;
use ethers::types::TxHash;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/** 12.3.1: move `amount` of `token` between the trader and a market's margin account */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollateralTransfer {
    pub trader: Address,
    pub market_id: MarketId,
    pub token: Token,
    pub amount: Decimal,
}

#[async_trait]
pub trait ChainGateway: Send + Sync {
    async fn add_collateral(&self, transfer: &CollateralTransfer) -> Result<TxHash, CollaboratorError>;

    async fn repay_loan(&self, transfer: &CollateralTransfer) -> Result<TxHash, CollaboratorError>;
}
