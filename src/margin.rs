//! Margin parameter derivation for leveraged orders.
//!
//! A leveraged order of value V = amount * price is funded by the trader's
//! collateral C = V / leverage and a loan B = V - C from the lending pool.
//! Longs (buys) borrow the quote asset, shorts (sells) borrow the base asset.
//!
//! The order is admitted only while the collateral strictly exceeds the
//! debt scaled by the market's liquidation rate L: C > B * L. That puts the
//! usable leverage strictly below 1 + 1/L.

use crate::market::Market;
use crate::types::{Leverage, Price, Quote, Side};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginParameters {
    pub total_position_value: Quote,
    pub collateral_asset: String,
    /// Collateral in quote units
    pub collateral_value: Quote,
    /// Collateral in native units of the collateral asset
    pub collateral_amount: Decimal,
    pub borrow_asset: String,
    /// Loan in quote units
    pub borrow_value: Quote,
    /// Loan in native units of the borrowed asset
    pub borrow_amount: Decimal,
    pub leverage: Leverage,
    /// None when nothing is borrowed
    pub liquidation_price: Option<Price>,
}

impl MarginParameters {
    pub fn is_leveraged(&self) -> bool {
        !self.borrow_value.is_zero()
    }
}

/// Exclusive upper bound on admissible leverage for liquidation rate L
pub fn max_leverage(liquidation_rate: Decimal) -> Decimal {
    Decimal::ONE + Decimal::ONE / liquidation_rate
}

pub fn derive_margin(
    side: Side,
    market: &Market,
    amount: Decimal,
    price: Decimal,
    leverage: Leverage,
    collateral_symbol: &str,
) -> Result<MarginParameters, MarginError> {
    if price <= Decimal::ZERO || amount <= Decimal::ZERO {
        return Err(MarginError::InvalidParam(format!(
            "price and amount must be positive, got {amount} at {price}"
        )));
    }
    if market.liquidation_rate <= Decimal::ZERO {
        return Err(MarginError::InvalidParam(format!(
            "liquidation rate of {} must be positive",
            market.id
        )));
    }
    let collateral_token = market.token_for_symbol(collateral_symbol).ok_or_else(|| {
        MarginError::InvalidParam(format!(
            "collateral {collateral_symbol} is not traded in {}",
            market.id
        ))
    })?;

    let base = &market.base_token;
    let quote = &market.quote_token;
    let rate = market.liquidation_rate;

    let total_value = amount.checked_mul(price).ok_or_else(|| out_of_range("position value"))?;
    let collateral_value = (total_value / leverage.value())
        .round_dp_with_strategy(quote.decimals, RoundingStrategy::AwayFromZero)
        .min(total_value);
    let borrow_value = total_value - collateral_value;

    let (borrow_asset, borrow_amount) = match side {
        Side::Buy => (quote, borrow_value),
        Side::Sell => (
            base,
            borrow_value
                .checked_div(price)
                .ok_or_else(|| out_of_range("borrowed amount"))?
                .round_dp_with_strategy(base.decimals, RoundingStrategy::ToZero),
        ),
    };

    let required = borrow_value
        .checked_mul(rate)
        .ok_or_else(|| out_of_range("required collateral"))?;
    if collateral_value <= required {
        return Err(MarginError::InsufficientCollateral {
            collateral: Quote::new(collateral_value),
            required: Quote::new(required),
            max_leverage: max_leverage(rate),
        });
    }

    let liquidation_price = if borrow_amount.is_zero() {
        None
    } else {
        let scaled_debt = borrow_amount
            .checked_mul(rate)
            .ok_or_else(|| out_of_range("liquidation price"))?;
        let raw = match side {
            Side::Buy => scaled_debt
                .checked_div(amount)
                .map(|p| p.round_dp_with_strategy(market.price_decimals, RoundingStrategy::AwayFromZero)),
            Side::Sell => total_value
                .checked_div(scaled_debt)
                .map(|p| p.round_dp_with_strategy(market.price_decimals, RoundingStrategy::ToZero)),
        };
        Price::new(raw.ok_or_else(|| out_of_range("liquidation price"))?)
    };

    let collateral_amount = if collateral_token.address == quote.address {
        collateral_value
    } else {
        collateral_value
            .checked_div(price)
            .ok_or_else(|| out_of_range("collateral amount"))?
            .round_dp_with_strategy(base.decimals, RoundingStrategy::AwayFromZero)
    };

    Ok(MarginParameters {
        total_position_value: Quote::new(total_value),
        collateral_asset: collateral_token.symbol.clone(),
        collateral_value: Quote::new(collateral_value),
        collateral_amount,
        borrow_asset: borrow_asset.symbol.clone(),
        borrow_value: Quote::new(borrow_value),
        borrow_amount,
        leverage,
        liquidation_price,
    })
}

fn out_of_range(what: &str) -> MarginError {
    MarginError::InvalidParam(format!("{what} out of range"))
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarginError {
    #[error("collateral {collateral} must exceed {required}; leverage must stay below {max_leverage}")]
    InsufficientCollateral {
        collateral: Quote,
        required: Quote,
        max_leverage: Decimal,
    },

    #[error("invalid margin parameter: {0}")]
    InvalidParam(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn lev(value: Decimal) -> Leverage {
        Leverage::new(value).unwrap()
    }

    #[test]
    fn unleveraged_order_borrows_nothing() {
        let market = Market::eth_usdc();
        let params =
            derive_margin(Side::Buy, &market, dec!(2), dec!(1500), Leverage::one(), "USDC").unwrap();

        assert_eq!(params.collateral_value.value(), dec!(3000));
        assert!(params.borrow_value.is_zero());
        assert!(params.liquidation_price.is_none());
        assert!(!params.is_leveraged());
    }

    #[test]
    fn long_split_and_liquidation_price() {
        let market = Market::eth_usdc();
        let params =
            derive_margin(Side::Buy, &market, dec!(2), dec!(1500), lev(dec!(1.5)), "USDC").unwrap();

        // V = 3000, C = 2000, B = 1000 USDC
        assert_eq!(params.total_position_value.value(), dec!(3000));
        assert_eq!(params.collateral_value.value(), dec!(2000));
        assert_eq!(params.borrow_value.value(), dec!(1000));
        assert_eq!(params.borrow_asset, "USDC");
        assert_eq!(params.borrow_amount, dec!(1000));
        assert_eq!(params.collateral_amount, dec!(2000));

        // 1000 * 1.2 / 2 = 600, below entry
        let liq = params.liquidation_price.unwrap();
        assert_eq!(liq.value(), dec!(600));
        assert!(liq.value() < dec!(1500));
    }

    #[test]
    fn short_borrows_base() {
        let market = Market::eth_usdc();
        let params =
            derive_margin(Side::Sell, &market, dec!(2), dec!(1500), lev(dec!(1.5)), "USDC").unwrap();

        assert_eq!(params.borrow_asset, "ETH");
        // 1000 USDC of ETH at 1500
        assert_eq!(
            params.borrow_amount,
            (dec!(1000) / dec!(1500)).round_dp_with_strategy(18, RoundingStrategy::ToZero)
        );
        // 3000 / (0.666666666666666666 * 1.2) = 3750.0000000000000037..., cut to cents
        let liq = params.liquidation_price.unwrap();
        assert_eq!(liq.value(), dec!(3750));
        assert!(liq.value() > dec!(1500));
    }

    #[test]
    fn base_collateral_converted_at_price() {
        let market = Market::eth_usdc();
        let params =
            derive_margin(Side::Buy, &market, dec!(2), dec!(1500), lev(dec!(1.5)), "ETH").unwrap();
        assert_eq!(params.collateral_asset, "ETH");
        assert_eq!(
            params.collateral_amount,
            (dec!(2000) / dec!(1500)).round_dp_with_strategy(18, RoundingStrategy::AwayFromZero)
        );
    }

    #[test]
    fn leverage_above_bound_rejected() {
        // L = 1.2 puts the bound at 1.8333
        let market = Market::eth_usdc();
        for value in [dec!(5), dec!(2)] {
            let result = derive_margin(Side::Buy, &market, dec!(1), dec!(100), lev(value), "USDC");
            assert!(matches!(
                result,
                Err(MarginError::InsufficientCollateral { .. })
            ));
        }
        assert!(derive_margin(Side::Buy, &market, dec!(1), dec!(100), lev(dec!(1.8)), "USDC").is_ok());
    }

    #[test]
    fn max_leverage_bound() {
        assert_eq!(max_leverage(dec!(1.25)), dec!(1.8));
        assert_eq!(max_leverage(dec!(1)), dec!(2));
    }

    #[test]
    fn unknown_collateral_rejected() {
        let market = Market::eth_usdc();
        let result = derive_margin(Side::Buy, &market, dec!(1), dec!(100), Leverage::one(), "DAI");
        assert!(matches!(result, Err(MarginError::InvalidParam(_))));
    }

    #[test]
    fn oversized_position_rejected() {
        let market = Market::eth_usdc();
        let result = derive_margin(Side::Sell, &market, dec!(1000), Decimal::MAX, lev(dec!(1.5)), "USDC");
        assert!(matches!(result, Err(MarginError::InvalidParam(_))));
    }

    #[test]
    fn zero_price_rejected() {
        let market = Market::eth_usdc();
        let result = derive_margin(Side::Sell, &market, dec!(1), Decimal::ZERO, Leverage::one(), "ETH");
        assert!(matches!(result, Err(MarginError::InvalidParam(_))));
    }
}
