// 5.0: request validation. quantization -> notional floor -> fees -> funds.
// spot orders check the asset they give up. margin orders derive the loan first
// and then check the collateral they post.

use crate::balance::{BalanceOracle, Spendable};
use crate::config::ServiceConfig;
use crate::fee::{compute_fee, FeeBreakdown};
use crate::margin::{derive_margin, MarginParameters};
use crate::market::{Market, MarketCatalog, Token};
use crate::service::ServiceError;
use crate::types::{Address, Leverage, MarketId, OrderType, Price, Quote, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/** 5.1: what the client asks to build. amounts and prices are human units */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    #[serde(rename = "marketID")]
    pub market_id: MarketId,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Decimal,
    pub amount: Decimal,
    /// Unix seconds, or a relative lifetime in seconds. 0 means no expiry.
    #[serde(default)]
    pub expires: i64,
    #[serde(default)]
    pub is_margin: bool,
    #[serde(default)]
    pub leverage: Option<Decimal>,
    #[serde(default)]
    pub collateral_symbol: Option<String>,
}

impl OrderRequest {
    pub fn limit(market_id: MarketId, side: Side, price: Decimal, amount: Decimal) -> Self {
        Self {
            market_id,
            side,
            order_type: OrderType::Limit,
            price,
            amount,
            expires: 0,
            is_margin: false,
            leverage: None,
            collateral_symbol: None,
        }
    }

    pub fn with_margin(mut self, leverage: Decimal, collateral: impl Into<String>) -> Self {
        self.is_margin = true;
        self.leverage = Some(leverage);
        self.collateral_symbol = Some(collateral.into());
        self
    }

    pub fn with_expiry(mut self, expires: i64) -> Self {
        self.expires = expires;
        self
    }
}

/** 5.2: a request that passed every check, with fees and loan terms attached */
#[derive(Debug, Clone)]
pub struct ValidatedOrder {
    pub trader: Address,
    pub market: Market,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Price,
    pub amount: Decimal,
    pub notional: Quote,
    pub fee: FeeBreakdown,
    pub margin: Option<MarginParameters>,
}

pub struct RequestValidator {
    catalog: Arc<dyn MarketCatalog>,
    balances: Arc<dyn BalanceOracle>,
    config: ServiceConfig,
}

impl RequestValidator {
    pub fn new(
        catalog: Arc<dyn MarketCatalog>,
        balances: Arc<dyn BalanceOracle>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            catalog,
            balances,
            config,
        }
    }

    pub async fn validate(
        &self,
        request: &OrderRequest,
        trader: Address,
    ) -> Result<ValidatedOrder, ServiceError> {
        let market = self
            .catalog
            .market(&request.market_id)
            .await?
            .ok_or_else(|| ServiceError::MarketNotFound(request.market_id.clone()))?;

        let price = market.validate_price(request.price)?;
        let amount = market.validate_amount(request.amount)?;
        let notional = market.validate_notional(amount, price)?;

        let discount = self.discount_rate(trader).await?;
        let fee = compute_fee(&market, notional, discount, self.config.protocol_version);

        let margin = if request.is_margin {
            Some(self.check_margin(request, &market, trader, price, amount, &fee).await?)
        } else {
            self.check_spot(request.side, &market, trader, amount, notional, &fee)
                .await?;
            None
        };

        debug!(
            market = %market.id,
            side = %request.side,
            %price,
            %amount,
            margin = margin.is_some(),
            "order validated"
        );

        Ok(ValidatedOrder {
            trader,
            market,
            side: request.side,
            order_type: request.order_type,
            price,
            amount,
            notional,
            fee,
            margin,
        })
    }

    async fn discount_rate(&self, trader: Address) -> Result<Decimal, ServiceError> {
        if self.config.fees.discount_tiers.is_empty() {
            return Ok(Decimal::ONE);
        }
        match self.catalog.token(&self.config.fees.discount_token).await? {
            Some(token) => {
                let held = self.balances.balance(&token, trader).await?;
                Ok(self.config.fees.discount_rate(held))
            }
            None => Ok(Decimal::ONE),
        }
    }

    async fn check_spot(
        &self,
        side: Side,
        market: &Market,
        trader: Address,
        amount: Decimal,
        notional: Quote,
        fee: &FeeBreakdown,
    ) -> Result<(), ServiceError> {
        match side {
            Side::Sell => {
                if notional <= fee.as_taker_total_fee_amount {
                    return Err(ServiceError::InvalidParam(format!(
                        "amount less than fee: notional {notional}, fee {}",
                        fee.as_taker_total_fee_amount
                    )));
                }
                self.require_funds(&market.base_token, trader, amount).await
            }
            Side::Buy => {
                let required = notional
                    .checked_add(fee.as_taker_total_fee_amount)
                    .ok_or_else(|| ServiceError::InvalidParam(format!("notional {notional} out of range")))?;
                self.require_funds(&market.quote_token, trader, required.value())
                    .await
            }
        }
    }

    async fn check_margin(
        &self,
        request: &OrderRequest,
        market: &Market,
        trader: Address,
        price: Price,
        amount: Decimal,
        fee: &FeeBreakdown,
    ) -> Result<MarginParameters, ServiceError> {
        let leverage = request
            .leverage
            .and_then(Leverage::new)
            .ok_or_else(|| ServiceError::InvalidParam("leverage must be at least 1".to_string()))?;
        let symbol = request
            .collateral_symbol
            .as_deref()
            .ok_or_else(|| ServiceError::InvalidParam("collateral asset required".to_string()))?;
        if self.catalog.token(symbol).await?.is_none() {
            return Err(ServiceError::InvalidParam(format!(
                "unknown collateral asset {symbol}"
            )));
        }
        if !market.margin_enabled {
            return Err(ServiceError::InvalidParam(format!(
                "margin trading disabled for {}",
                market.id
            )));
        }

        let params = derive_margin(request.side, market, amount, price.value(), leverage, symbol)?;

        let (token, required) = if market.is_quote_symbol(&params.collateral_asset) {
            let required = params
                .collateral_amount
                .checked_add(fee.as_taker_total_fee_amount.value())
                .ok_or_else(|| ServiceError::InvalidParam("collateral out of range".to_string()))?;
            (&market.quote_token, required)
        } else {
            (&market.base_token, params.collateral_amount)
        };
        self.require_funds(token, trader, required).await?;

        Ok(params)
    }

    async fn require_funds(
        &self,
        token: &Token,
        trader: Address,
        required: Decimal,
    ) -> Result<(), ServiceError> {
        Spendable::load(self.balances.as_ref(), token, trader, self.config.proxy)
            .await?
            .require(token, required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MarketError;
    use crate::margin::MarginError;
    use crate::memory::{InMemoryBalances, InMemoryCatalog};
    use rust_decimal_macros::dec;

    fn trader() -> Address {
        Address::from_low_u64_be(0xabc)
    }

    fn setup() -> (RequestValidator, Arc<InMemoryBalances>, Market) {
        let market = Market::eth_usdc();
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.add_market(market.clone());

        let balances = Arc::new(InMemoryBalances::new());
        balances.fund(&market.quote_token, trader(), dec!(10_000));
        balances.fund(&market.base_token, trader(), dec!(10));

        let validator = RequestValidator::new(catalog, balances.clone(), ServiceConfig::default());
        (validator, balances, market)
    }

    #[tokio::test]
    async fn notional_floor_scenario() {
        let (validator, _, market) = setup();

        let small = OrderRequest::limit(market.id.clone(), Side::Buy, dec!(9), dec!(1));
        let err = validator.validate(&small, trader()).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Market(MarketError::OrderTooSmall { .. })
        ));

        let ok = OrderRequest::limit(market.id.clone(), Side::Buy, dec!(9), dec!(2));
        let validated = validator.validate(&ok, trader()).await.unwrap();
        assert_eq!(validated.notional.value(), dec!(18));
        assert!(validated.margin.is_none());
    }

    #[tokio::test]
    async fn oversized_notional_is_rejected() {
        let (validator, _, market) = setup();
        let huge_price = Decimal::from_i128_with_scale(10_i128.pow(20), 0);
        let request = OrderRequest::limit(market.id.clone(), Side::Buy, huge_price, dec!(10_000_000_000));
        let err = validator.validate(&request, trader()).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Market(MarketError::NotionalOverflow { .. })
        ));

        let request = OrderRequest::limit(market.id.clone(), Side::Sell, Decimal::MAX, dec!(2))
            .with_margin(dec!(1.5), "USDC");
        let err = validator.validate(&request, trader()).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Market(MarketError::NotionalOverflow { .. })
        ));

        // fits on its own, overflows once the fee is added
        let request = OrderRequest::limit(market.id.clone(), Side::Buy, Decimal::MAX, dec!(1));
        let err = validator.validate(&request, trader()).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParam(_)));
    }

    #[tokio::test]
    async fn unknown_market() {
        let (validator, _, _) = setup();
        let request = OrderRequest::limit(MarketId::new("NOPE"), Side::Buy, dec!(1), dec!(20));
        let err = validator.validate(&request, trader()).await.unwrap_err();
        assert!(matches!(err, ServiceError::MarketNotFound(_)));
    }

    #[tokio::test]
    async fn buy_needs_notional_plus_fee() {
        let (validator, balances, market) = setup();
        // 10 ETH at 1000 = 10_000 notional, fee pushes it over the balance
        let request = OrderRequest::limit(market.id.clone(), Side::Buy, dec!(1000), dec!(10));
        let err = validator.validate(&request, trader()).await.unwrap_err();
        match err {
            ServiceError::InsufficientBalance { asset, available, required } => {
                assert_eq!(asset, "USDC");
                assert_eq!(available, dec!(10_000));
                assert_eq!(required, dec!(10_030.5));
            }
            other => panic!("unexpected {other:?}"),
        }

        balances.set_locked(&market.quote_token, trader(), dec!(9_000));
        let smaller = OrderRequest::limit(market.id.clone(), Side::Buy, dec!(1000), dec!(1));
        assert!(matches!(
            validator.validate(&smaller, trader()).await,
            Err(ServiceError::InsufficientBalance { .. })
        ));
    }

    #[tokio::test]
    async fn sell_checks_allowance() {
        let (validator, balances, market) = setup();
        balances.set_allowance(&market.base_token, trader(), dec!(1));

        let request = OrderRequest::limit(market.id.clone(), Side::Sell, dec!(1000), dec!(2));
        let err = validator.validate(&request, trader()).await.unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientAllowance { .. }));
    }

    #[tokio::test]
    async fn sell_below_fee_rejected() {
        // flat gas fee larger than the notional
        let mut market = Market::eth_usdc();
        market.id = MarketId::new("TINY-USDC");
        market.min_order_size = dec!(0.01);
        market.gas_fee = crate::market::GasFee::Flat(dec!(5));
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.add_market(market.clone());
        let balances = Arc::new(InMemoryBalances::new());
        balances.fund(&market.base_token, trader(), dec!(10));
        let validator = RequestValidator::new(catalog, balances, ServiceConfig::default());

        let request = OrderRequest::limit(market.id.clone(), Side::Sell, dec!(1), dec!(1));
        let err = validator.validate(&request, trader()).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParam(_)));
    }

    #[tokio::test]
    async fn margin_leverage_scenarios() {
        let (validator, _, market) = setup();

        for leverage in [dec!(5), dec!(2)] {
            let request = OrderRequest::limit(market.id.clone(), Side::Buy, dec!(100), dec!(1))
                .with_margin(leverage, "USDC");
            let err = validator.validate(&request, trader()).await.unwrap_err();
            assert!(matches!(
                err,
                ServiceError::Margin(MarginError::InsufficientCollateral { .. })
            ));
        }

        let request = OrderRequest::limit(market.id.clone(), Side::Buy, dec!(100), dec!(1))
            .with_margin(dec!(1.5), "USDC");
        let validated = validator.validate(&request, trader()).await.unwrap();
        let margin = validated.margin.unwrap();
        assert_eq!(
            margin.collateral_value.add(margin.borrow_value),
            margin.total_position_value
        );
    }

    #[tokio::test]
    async fn margin_param_checks() {
        let (validator, _, market) = setup();

        let mut request = OrderRequest::limit(market.id.clone(), Side::Buy, dec!(100), dec!(1))
            .with_margin(dec!(0.5), "USDC");
        assert!(matches!(
            validator.validate(&request, trader()).await,
            Err(ServiceError::InvalidParam(_))
        ));

        request.leverage = Some(dec!(1.5));
        request.collateral_symbol = Some("WBTC".to_string());
        assert!(matches!(
            validator.validate(&request, trader()).await,
            Err(ServiceError::InvalidParam(_))
        ));

        request.collateral_symbol = None;
        assert!(matches!(
            validator.validate(&request, trader()).await,
            Err(ServiceError::InvalidParam(_))
        ));
    }

    #[tokio::test]
    async fn margin_disabled_market() {
        let market = Market::hot_dai();
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.add_market(market.clone());
        let balances = Arc::new(InMemoryBalances::new());
        balances.fund(&market.quote_token, trader(), dec!(1_000));
        let validator = RequestValidator::new(catalog, balances, ServiceConfig::default());

        let request = OrderRequest::limit(market.id.clone(), Side::Buy, dec!(0.5), dec!(100))
            .with_margin(dec!(1.2), "DAI");
        assert!(matches!(
            validator.validate(&request, trader()).await,
            Err(ServiceError::InvalidParam(_))
        ));
    }

    #[tokio::test]
    async fn margin_collateral_must_be_funded() {
        let (validator, balances, market) = setup();
        balances.set_balance(&market.quote_token, trader(), dec!(50));

        let request = OrderRequest::limit(market.id.clone(), Side::Buy, dec!(100), dec!(1))
            .with_margin(dec!(1.5), "USDC");
        let err = validator.validate(&request, trader()).await.unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn hot_holders_get_discount() {
        let (validator, balances, market) = setup();
        let hot = Token::new("HOT", Address::from_low_u64_be(0x407), 18);
        balances.fund(&hot, trader(), dec!(2_000_000));

        let request = OrderRequest::limit(market.id.clone(), Side::Buy, dec!(1000), dec!(1));
        // discount token not in the catalog yet
        let plain = validator.validate(&request, trader()).await.unwrap();
        assert_eq!(plain.fee.discount_rate, Decimal::ONE);

        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.add_market(market.clone());
        catalog.add_token(hot);
        let discounted = RequestValidator::new(catalog, balances, ServiceConfig::default())
            .validate(&request, trader())
            .await
            .unwrap();
        assert_eq!(discounted.fee.discount_rate, dec!(0.7));
        assert_eq!(discounted.fee.taker_fee_amount.value(), dec!(2.1));
    }
}
