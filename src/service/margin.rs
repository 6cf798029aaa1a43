//! Margin account endpoints: positions, account summary, collateral moves.

use super::core::ExchangeService;
use super::results::ServiceError;
use crate::account::{summarize, MarginAccountSummary, MarginPosition, MarketFilter};
use crate::balance::Spendable;
use crate::chain::CollateralTransfer;
use crate::market::Market;
use crate::types::{Address, MarketId};
use ethers::types::TxHash;
use rust_decimal::Decimal;
use tracing::info;

impl ExchangeService {
    pub async fn margin_positions(
        &self,
        trader: Address,
    ) -> Result<Vec<MarginPosition>, ServiceError> {
        self.log_request("margin_positions", Some(trader));
        Ok(self.positions.open_positions(trader).await?)
    }

    /// Health summary over one market, or every market for `All`
    pub async fn margin_account_summary(
        &self,
        trader: Address,
        filter: MarketFilter,
    ) -> Result<MarginAccountSummary, ServiceError> {
        self.log_request("margin_account_summary", Some(trader));
        let positions = self.positions.open_positions(trader).await?;
        let summary = summarize(&positions, &filter);
        info!(
            ?trader,
            market = filter.label(),
            health = ?summary.account_health_ratio,
            "margin summary"
        );
        Ok(summary)
    }

    pub async fn add_collateral(
        &self,
        trader: Address,
        market_id: &MarketId,
        asset_symbol: &str,
        amount: Decimal,
    ) -> Result<TxHash, ServiceError> {
        self.log_request("add_collateral", Some(trader));
        let (_, transfer) = self
            .collateral_transfer(trader, market_id, asset_symbol, amount)
            .await?;
        self.require_transfer_funds(&transfer).await?;
        let tx_hash = self.chain.add_collateral(&transfer).await?;
        info!(?trader, market = %market_id, asset = asset_symbol, %amount, ?tx_hash, "collateral added");
        Ok(tx_hash)
    }

    /// Repay part of a loan. the asset has to be one the market lends.
    pub async fn repay_loan(
        &self,
        trader: Address,
        market_id: &MarketId,
        asset_symbol: &str,
        amount: Decimal,
    ) -> Result<TxHash, ServiceError> {
        self.log_request("repay_loan", Some(trader));
        let (market, transfer) = self
            .collateral_transfer(trader, market_id, asset_symbol, amount)
            .await?;
        if market.token_for_symbol(asset_symbol).is_none() {
            return Err(ServiceError::InvalidParam(format!(
                "{asset_symbol} is not borrowable in {market_id}"
            )));
        }
        self.require_transfer_funds(&transfer).await?;
        let tx_hash = self.chain.repay_loan(&transfer).await?;
        info!(?trader, market = %market_id, asset = asset_symbol, %amount, ?tx_hash, "loan repaid");
        Ok(tx_hash)
    }

    async fn collateral_transfer(
        &self,
        trader: Address,
        market_id: &MarketId,
        asset_symbol: &str,
        amount: Decimal,
    ) -> Result<(Market, CollateralTransfer), ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidParam(format!(
                "amount must be positive, got {amount}"
            )));
        }
        let token = self
            .catalog
            .token(asset_symbol)
            .await?
            .ok_or_else(|| ServiceError::InvalidParam(format!("unknown asset {asset_symbol}")))?;
        let market = self
            .catalog
            .market(market_id)
            .await?
            .ok_or_else(|| ServiceError::MarketNotFound(market_id.clone()))?;

        let transfer = CollateralTransfer {
            trader,
            market_id: market_id.clone(),
            token,
            amount,
        };
        Ok((market, transfer))
    }

    // same balance then proxy allowance order as order validation
    async fn require_transfer_funds(&self, transfer: &CollateralTransfer) -> Result<(), ServiceError> {
        Spendable::load(
            self.balances.as_ref(),
            &transfer.token,
            transfer.trader,
            self.config.proxy,
        )
        .await?
        .require(&transfer.token, transfer.amount)
    }
}
