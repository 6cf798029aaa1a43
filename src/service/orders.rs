//! Order endpoints: build, place, cancel and the order queries.

use super::core::ExchangeService;
use super::results::{BuildOrderResult, OrdersPage, ServiceError};
use crate::balance::LockedBalance;
use crate::cancel::CancelOutcome;
use crate::fingerprint::{
    fingerprint_of, resolve_expiry, to_native_units, BatchAction, MarginBatch, OrderTerms,
    FEE_RATE_DECIMALS,
};
use crate::margin::MarginParameters;
use crate::order::{Order, OrderFilter, OrderStatus};
use crate::staging::StagedOrder;
use crate::types::{Address, Fingerprint, MarketId};
use crate::validation::{OrderRequest, ValidatedOrder};
use ethers::types::U256;
use rand::Rng;
use rust_decimal::Decimal;
use tracing::info;

const DEFAULT_PAGE_SIZE: u64 = 20;

impl ExchangeService {
    /// Validate, price and stage an order. The returned id is what the trader signs.
    pub async fn build_order(
        &self,
        request: &OrderRequest,
        trader: Address,
    ) -> Result<BuildOrderResult, ServiceError> {
        self.log_request("build_order", Some(trader));
        let validated = self.validator.validate(request, trader).await?;

        let now = self.clock.now();
        let expires_at = resolve_expiry(request.expires, now);
        let salt = rand::thread_rng().gen_range(0..i64::MAX as u64);

        let (maker_fee_rate, taker_fee_rate) = validated.fee.effective_rates(&validated.market);
        let terms = self.order_terms(&validated, expires_at, salt, maker_fee_rate, taker_fee_rate)?;
        let payload = match &validated.margin {
            Some(margin) => self.margin_batch(&validated, margin, terms)?.encode(),
            None => terms.encode(),
        };
        let fingerprint = fingerprint_of(&payload);
        let payload_hex = format!("0x{}", hex::encode(&payload));

        let staged = StagedOrder {
            fingerprint,
            trader,
            market_id: validated.market.id.clone(),
            side: validated.side,
            order_type: validated.order_type,
            price: validated.price,
            amount: validated.amount,
            expires_at,
            salt,
            protocol_version: self.config.protocol_version,
            maker_fee_rate,
            taker_fee_rate,
            maker_rebate_rate: Decimal::ZERO,
            fee: validated.fee,
            margin: validated.margin.clone(),
            payload: payload_hex.clone(),
            created_at: now,
            signature: None,
        };
        let ttl = self.config.staging_ttl(staged.is_margin());
        self.staging.stage(&staged, ttl).await?;

        info!(
            id = %fingerprint,
            market = %staged.market_id,
            side = %staged.side,
            margin = staged.is_margin(),
            "order built"
        );

        Ok(BuildOrderResult {
            id: fingerprint,
            json: payload_hex,
            expires_at,
            fee: validated.fee,
            margin: validated.margin,
        })
    }

    /// Turn a signed, staged order into a pending order and hand it to the engine.
    pub async fn place_order(
        &self,
        id: &str,
        trader: Address,
        signature: &str,
    ) -> Result<Order, ServiceError> {
        self.log_request("place_order", Some(trader));
        let fingerprint: Fingerprint = id
            .parse()
            .map_err(|_| ServiceError::InvalidParam(format!("malformed order id {id}")))?;
        self.finalizer.finalize(fingerprint, trader, signature).await
    }

    pub async fn cancel_order(&self, id: &str) -> Result<CancelOutcome, ServiceError> {
        self.log_request("cancel_order", None);
        let fingerprint: Fingerprint = id
            .parse()
            .map_err(|_| ServiceError::OrderNotFound(id.to_string()))?;
        self.canceller.cancel(&fingerprint).await
    }

    /// Trader's orders, newest first. Defaults to pending orders, page 1, 20 per page.
    pub async fn get_orders(
        &self,
        trader: Address,
        market_id: Option<MarketId>,
        status: Option<OrderStatus>,
        page: Option<u64>,
        per_page: Option<u64>,
    ) -> Result<OrdersPage, ServiceError> {
        self.log_request("get_orders", Some(trader));
        let per_page = per_page.filter(|n| *n > 0).unwrap_or(DEFAULT_PAGE_SIZE);
        let page = page.filter(|n| *n > 0).unwrap_or(1);
        let filter = OrderFilter {
            market_id,
            status: status.unwrap_or(OrderStatus::Pending),
            limit: per_page,
            offset: per_page.saturating_mul(page - 1),
        };
        let (count, orders) = self.orders.find_by_account(trader, &filter).await?;
        Ok(OrdersPage { count, orders })
    }

    pub async fn get_single_order(&self, id: &str) -> Result<Order, ServiceError> {
        self.log_request("get_single_order", None);
        let fingerprint: Fingerprint = id
            .parse()
            .map_err(|_| ServiceError::OrderNotFound(id.to_string()))?;
        self.orders
            .find_by_id(&fingerprint)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(id.to_string()))
    }

    /// Amount reserved by open orders, for every listed token
    pub async fn locked_balances(&self, trader: Address) -> Result<Vec<LockedBalance>, ServiceError> {
        self.log_request("locked_balances", Some(trader));
        let mut balances = Vec::new();
        for token in self.catalog.tokens().await? {
            let locked_balance = self.balances.locked_balance(&token, trader).await?;
            balances.push(LockedBalance {
                symbol: token.symbol,
                locked_balance,
            });
        }
        Ok(balances)
    }

    fn order_terms(
        &self,
        validated: &ValidatedOrder,
        expires_at: i64,
        salt: u64,
        maker_fee_rate: Decimal,
        taker_fee_rate: Decimal,
    ) -> Result<OrderTerms, ServiceError> {
        let market = &validated.market;
        Ok(OrderTerms {
            protocol_version: self.config.protocol_version,
            market_id: market.id.clone(),
            trader: validated.trader,
            relayer: self.config.relayer,
            base_token: market.base_token.address,
            quote_token: market.quote_token.address,
            base_token_amount: to_native_units(validated.amount, market.base_token.decimals)?,
            quote_token_amount: to_native_units(
                validated.notional.value(),
                market.quote_token.decimals,
            )?,
            gas_token_amount: to_native_units(
                validated.fee.gas_fee_amount.value(),
                market.quote_token.decimals,
            )?,
            expires_at,
            salt,
            maker_fee_rate: to_native_units(maker_fee_rate, FEE_RATE_DECIMALS)?,
            taker_fee_rate: to_native_units(taker_fee_rate, FEE_RATE_DECIMALS)?,
            maker_rebate_rate: U256::zero(),
            is_sell: validated.side.is_sell(),
            is_market: validated.order_type.is_market(),
        })
    }

    // [transfer collateral, borrow (if any), trade]
    fn margin_batch(
        &self,
        validated: &ValidatedOrder,
        margin: &MarginParameters,
        terms: OrderTerms,
    ) -> Result<MarginBatch, ServiceError> {
        let market = &validated.market;
        let collateral = market
            .token_for_symbol(&margin.collateral_asset)
            .ok_or_else(|| ServiceError::InvalidParam(margin.collateral_asset.clone()))?;
        let mut actions = vec![BatchAction::Transfer {
            asset: collateral.address,
            market_id: market.id.clone(),
            amount: to_native_units(margin.collateral_amount, collateral.decimals)?,
        }];

        if margin.is_leveraged() {
            let borrowed = market
                .token_for_symbol(&margin.borrow_asset)
                .ok_or_else(|| ServiceError::InvalidParam(margin.borrow_asset.clone()))?;
            actions.push(BatchAction::Borrow {
                market_id: market.id.clone(),
                asset: borrowed.address,
                amount: to_native_units(margin.borrow_amount, borrowed.decimals)?,
            });
        }
        actions.push(BatchAction::Trade(terms));

        Ok(MarginBatch {
            trader: validated.trader,
            actions,
        })
    }
}
