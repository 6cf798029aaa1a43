// 4.0: fee calculation. fee = notional * rate * discount.
// gas surcharge comes from the market rule and is added to both totals.
// everything is in quote units.

use crate::market::Market;
use crate::types::Quote;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/** 4.1: fees the trader would pay, depending on which side of the match they land */
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    pub maker_fee_amount: Quote,
    pub taker_fee_amount: Quote,
    pub gas_fee_amount: Quote,
    pub as_taker_total_fee_amount: Quote,
    pub as_maker_total_fee_amount: Quote,
    /// Multiplier already applied to the maker and taker fees
    pub discount_rate: Decimal,
}

impl FeeBreakdown {
    /// Rates after discount, as stamped into the signed order
    pub fn effective_rates(&self, market: &Market) -> (Decimal, Decimal) {
        (
            market.maker_fee_rate * self.discount_rate,
            market.taker_fee_rate * self.discount_rate,
        )
    }
}

pub fn compute_fee(
    market: &Market,
    notional: Quote,
    discount_rate: Decimal,
    protocol_version: u32,
) -> FeeBreakdown {
    let maker_fee_amount = notional.mul(market.maker_fee_rate * discount_rate);
    let taker_fee_amount = notional.mul(market.taker_fee_rate * discount_rate);
    let gas_fee_amount = market.gas_fee_amount(notional, protocol_version);

    FeeBreakdown {
        maker_fee_amount,
        taker_fee_amount,
        gas_fee_amount,
        as_taker_total_fee_amount: taker_fee_amount.add(gas_fee_amount),
        as_maker_total_fee_amount: maker_fee_amount.add(gas_fee_amount),
        discount_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fee_amounts_without_discount() {
        let market = Market::eth_usdc();
        let fee = compute_fee(&market, Quote::new(dec!(1000)), Decimal::ONE, 2);

        // notional 1000
        assert_eq!(fee.maker_fee_amount.value(), dec!(1));
        assert_eq!(fee.taker_fee_amount.value(), dec!(3));
        assert_eq!(fee.gas_fee_amount.value(), dec!(0.5));
        assert_eq!(fee.as_taker_total_fee_amount.value(), dec!(3.5));
        assert_eq!(fee.as_maker_total_fee_amount.value(), dec!(1.5));
    }

    #[test]
    fn discount_scales_trading_fees_only() {
        let market = Market::eth_usdc();
        let fee = compute_fee(&market, Quote::new(dec!(1000)), dec!(0.7), 2);

        assert_eq!(fee.taker_fee_amount.value(), dec!(2.1));
        assert_eq!(fee.maker_fee_amount.value(), dec!(0.7));
        assert_eq!(fee.gas_fee_amount.value(), dec!(0.5));

        let (maker, taker) = fee.effective_rates(&market);
        assert_eq!(maker, dec!(0.0007));
        assert_eq!(taker, dec!(0.0021));
    }

    #[test]
    fn v1_orders_skip_gas() {
        let market = Market::eth_usdc();
        let fee = compute_fee(&market, Quote::new(dec!(1000)), Decimal::ONE, 1);
        assert!(fee.gas_fee_amount.is_zero());
        assert_eq!(fee.as_taker_total_fee_amount, fee.taker_fee_amount);
    }
}
