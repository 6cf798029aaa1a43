//! Margin account aggregation.
//!
//! Reduces a trader's open leveraged positions into one health summary.
//! Values are all in quote (USD) terms:
//!
//! - leverage = (collateral + borrowed) / collateral
//! - maintenance = sum of borrowed_i * L_i over positions
//! - free collateral = max(0, collateral - maintenance)
//! - health = collateral / maintenance, or `NoDebt` when nothing is owed
//!
//! A health ratio at or below 1 means the account is liquidatable.

use crate::error::CollaboratorError;
use crate::types::{Address, MarketId, Price, Quote};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

/// One open leveraged position as tracked by the lending side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginPosition {
    pub market_id: MarketId,
    pub base_asset_symbol: String,
    pub quote_asset_symbol: String,
    pub side: PositionSide,
    pub leverage: Decimal,
    pub position_size_asset_units: Decimal,
    #[serde(rename = "positionSizeUSD")]
    pub position_size_usd: Quote,
    pub entry_price: Price,
    pub current_mark_price: Price,
    pub collateral_amount: Decimal,
    pub collateral_asset_symbol: String,
    #[serde(rename = "collateralValueUSD")]
    pub collateral_value_usd: Quote,
    pub borrowed_amount: Decimal,
    pub borrowed_asset_symbol: String,
    #[serde(rename = "borrowedValueUSD")]
    pub borrowed_value_usd: Quote,
    pub accrued_interest: Decimal,
    pub current_liquidation_price: Option<Price>,
    pub unrealized_pnl: Quote,
    /// The market's liquidation rate L
    pub liquidation_rate: Decimal,
}

#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn open_positions(&self, trader: Address) -> Result<Vec<MarginPosition>, CollaboratorError>;
}

/// Which positions a summary covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketFilter {
    All,
    Market(MarketId),
}

impl MarketFilter {
    /// Empty and "ALL" both mean every market
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => MarketFilter::All,
            Some(id) if id.eq_ignore_ascii_case("ALL") => MarketFilter::All,
            Some(id) => MarketFilter::Market(MarketId::new(id)),
        }
    }

    pub fn matches(&self, market_id: &MarketId) -> bool {
        match self {
            MarketFilter::All => true,
            MarketFilter::Market(id) => id == market_id,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            MarketFilter::All => "ALL",
            MarketFilter::Market(id) => id.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum HealthRatio {
    NoDebt,
    Ratio(Decimal),
}

impl HealthRatio {
    pub fn is_liquidatable(&self) -> bool {
        match self {
            HealthRatio::NoDebt => false,
            HealthRatio::Ratio(r) => *r <= Decimal::ONE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginAccountSummary {
    pub market_id: String,
    #[serde(rename = "totalCollateralValueUSD")]
    pub total_collateral_value: Quote,
    #[serde(rename = "totalBorrowedValueUSD")]
    pub total_borrowed_value: Quote,
    pub account_leverage: Decimal,
    #[serde(rename = "maintenanceMarginRequiredUSD")]
    pub maintenance_margin_required: Quote,
    #[serde(rename = "availableForNewPositionUSD")]
    pub free_collateral: Quote,
    pub account_health_ratio: HealthRatio,
}

pub fn summarize(positions: &[MarginPosition], filter: &MarketFilter) -> MarginAccountSummary {
    let selected: Vec<&MarginPosition> = positions
        .iter()
        .filter(|p| filter.matches(&p.market_id))
        .collect();

    let collateral: Quote = selected.iter().map(|p| p.collateral_value_usd).sum();
    let borrowed: Quote = selected.iter().map(|p| p.borrowed_value_usd).sum();
    let maintenance: Quote = selected
        .iter()
        .map(|p| p.borrowed_value_usd.mul(p.liquidation_rate))
        .sum();

    let account_leverage = if !collateral.is_zero() {
        collateral.add(borrowed).value() / collateral.value()
    } else if borrowed.is_zero() {
        Decimal::ONE
    } else {
        // debt with nothing backing it
        Decimal::MAX
    };

    let free_collateral = collateral.sub(maintenance).max(Quote::zero());

    let account_health_ratio = if maintenance.is_zero() {
        HealthRatio::NoDebt
    } else {
        HealthRatio::Ratio(collateral.value() / maintenance.value())
    };

    MarginAccountSummary {
        market_id: filter.label().to_string(),
        total_collateral_value: collateral,
        total_borrowed_value: borrowed,
        account_leverage,
        maintenance_margin_required: maintenance,
        free_collateral,
        account_health_ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(market: &str, collateral: Decimal, borrowed: Decimal, rate: Decimal) -> MarginPosition {
        MarginPosition {
            market_id: MarketId::new(market),
            base_asset_symbol: "ETH".to_string(),
            quote_asset_symbol: "USDC".to_string(),
            side: PositionSide::Long,
            leverage: dec!(1.5),
            position_size_asset_units: dec!(1),
            position_size_usd: Quote::new(collateral + borrowed),
            entry_price: Price::new_unchecked(dec!(1500)),
            current_mark_price: Price::new_unchecked(dec!(1500)),
            collateral_amount: collateral,
            collateral_asset_symbol: "USDC".to_string(),
            collateral_value_usd: Quote::new(collateral),
            borrowed_amount: borrowed,
            borrowed_asset_symbol: "USDC".to_string(),
            borrowed_value_usd: Quote::new(borrowed),
            accrued_interest: Decimal::ZERO,
            current_liquidation_price: None,
            unrealized_pnl: Quote::zero(),
            liquidation_rate: rate,
        }
    }

    #[test]
    fn aggregates_across_markets() {
        let positions = vec![
            position("ETH-USDC", dec!(1000), dec!(500), dec!(1.2)),
            position("BTC-USDC", dec!(3000), dec!(1000), dec!(1.1)),
        ];
        let summary = summarize(&positions, &MarketFilter::All);

        assert_eq!(summary.market_id, "ALL");
        assert_eq!(summary.total_collateral_value.value(), dec!(4000));
        assert_eq!(summary.total_borrowed_value.value(), dec!(1500));
        assert_eq!(summary.account_leverage, dec!(1.375));
        // 500*1.2 + 1000*1.1
        assert_eq!(summary.maintenance_margin_required.value(), dec!(1700));
        assert_eq!(summary.free_collateral.value(), dec!(2300));
        assert_eq!(
            summary.account_health_ratio,
            HealthRatio::Ratio(dec!(4000) / dec!(1700))
        );
    }

    #[test]
    fn filter_by_market() {
        let positions = vec![
            position("ETH-USDC", dec!(1000), dec!(500), dec!(1.2)),
            position("BTC-USDC", dec!(3000), dec!(1000), dec!(1.1)),
        ];
        let filter = MarketFilter::parse(Some("ETH-USDC"));
        let summary = summarize(&positions, &filter);
        assert_eq!(summary.total_collateral_value.value(), dec!(1000));
        assert_eq!(summary.maintenance_margin_required.value(), dec!(600));
    }

    #[test]
    fn empty_account() {
        let summary = summarize(&[], &MarketFilter::All);
        assert_eq!(summary.account_leverage, Decimal::ONE);
        assert_eq!(summary.account_health_ratio, HealthRatio::NoDebt);
        assert!(summary.free_collateral.is_zero());
    }

    #[test]
    fn unbacked_debt_is_liquidatable() {
        let positions = vec![position("ETH-USDC", Decimal::ZERO, dec!(100), dec!(1.2))];
        let summary = summarize(&positions, &MarketFilter::All);
        assert_eq!(summary.account_leverage, Decimal::MAX);
        assert!(summary.account_health_ratio.is_liquidatable());
        assert!(summary.free_collateral.is_zero());
    }

    #[test]
    fn filter_parsing() {
        assert_eq!(MarketFilter::parse(None), MarketFilter::All);
        assert_eq!(MarketFilter::parse(Some("all")), MarketFilter::All);
        assert_eq!(MarketFilter::parse(Some("")), MarketFilter::All);
        assert_eq!(
            MarketFilter::parse(Some("ETH-USDC")),
            MarketFilter::Market(MarketId::new("ETH-USDC"))
        );
    }
}
