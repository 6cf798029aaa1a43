//! Market configuration and quantization rules.
//!
//! A market is a single trading pair with its own precision, minimum order
//! notional, fee rates and liquidation rate. Markets are loaded from the
//! catalog once per request and never mutated here.

use crate::error::CollaboratorError;
use crate::types::{Address, MarketId, Price, Quote};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// An ERC20 asset known to the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub symbol: String,
    pub address: Address,
    /// Native decimals of the on-chain token (18 for most ERC20s)
    pub decimals: u32,
}

impl Token {
    pub fn new(symbol: impl Into<String>, address: Address, decimals: u32) -> Self {
        Self {
            symbol: symbol.into(),
            address,
            decimals,
        }
    }
}

/// Gas surcharge charged to the trader, always in the quote asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum GasFee {
    /// Fixed amount of quote per order
    Flat(Decimal),
    /// Fraction of the order notional
    Proportional(Decimal),
}

impl Default for GasFee {
    fn default() -> Self {
        Self::Flat(Decimal::ZERO)
    }
}

/// Static market configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub base_token: Token,
    pub quote_token: Token,
    /// Price precision. minimum price increment is 10^-price_decimals
    pub price_decimals: u32,
    /// Amount precision. minimum amount increment is 10^-amount_decimals
    pub amount_decimals: u32,
    /// Minimum order notional in quote
    pub min_order_size: Decimal,
    pub maker_fee_rate: Decimal,
    pub taker_fee_rate: Decimal,
    pub gas_fee: GasFee,
    /// Debt to collateral threshold. collateral must stay above debt * rate
    pub liquidation_rate: Decimal,
    /// Whether leveraged orders are accepted
    pub margin_enabled: bool,
}

impl Market {
    /// ETH-USDC with cent prices and milli-ETH amounts
    pub fn eth_usdc() -> Self {
        Self {
            id: MarketId::new("ETH-USDC"),
            base_token: Token::new("ETH", Address::from_low_u64_be(0xe7), 18),
            quote_token: Token::new("USDC", Address::from_low_u64_be(0x05dc), 6),
            price_decimals: 2,
            amount_decimals: 3,
            min_order_size: dec!(10),
            maker_fee_rate: dec!(0.001),
            taker_fee_rate: dec!(0.003),
            gas_fee: GasFee::Flat(dec!(0.5)),
            liquidation_rate: dec!(1.2),
            margin_enabled: true,
        }
    }

    /// HOT-DAI, spot only
    pub fn hot_dai() -> Self {
        Self {
            id: MarketId::new("HOT-DAI"),
            base_token: Token::new("HOT", Address::from_low_u64_be(0x407), 18),
            quote_token: Token::new("DAI", Address::from_low_u64_be(0xda1), 18),
            price_decimals: 5,
            amount_decimals: 0,
            min_order_size: dec!(1),
            maker_fee_rate: dec!(0.001),
            taker_fee_rate: dec!(0.003),
            gas_fee: GasFee::Proportional(dec!(0.0005)),
            liquidation_rate: dec!(1.15),
            margin_enabled: false,
        }
    }

    pub fn min_price_unit(&self) -> Decimal {
        Decimal::new(1, self.price_decimals)
    }

    pub fn min_amount_unit(&self) -> Decimal {
        Decimal::new(1, self.amount_decimals)
    }

    /// Price must be positive and an exact multiple of the price unit
    pub fn validate_price(&self, price: Decimal) -> Result<Price, MarketError> {
        let price = Price::new(price).ok_or(MarketError::InvalidPrice(price))?;
        let unit = self.min_price_unit();
        if !(price.value() % unit).is_zero() {
            return Err(MarketError::InvalidPriceUnit {
                price: price.value(),
                unit,
            });
        }
        Ok(price)
    }

    /// Amount must be positive and an exact multiple of the amount unit
    pub fn validate_amount(&self, amount: Decimal) -> Result<Decimal, MarketError> {
        if amount <= Decimal::ZERO {
            return Err(MarketError::InvalidAmount(amount));
        }
        let unit = self.min_amount_unit();
        if !(amount % unit).is_zero() {
            return Err(MarketError::InvalidAmountUnit { amount, unit });
        }
        Ok(amount)
    }

    /// Notional in quote. Rejected below the market minimum, and when the
    /// quote token cannot represent it exactly in its native decimals.
    pub fn validate_notional(&self, amount: Decimal, price: Price) -> Result<Quote, MarketError> {
        let notional = amount
            .checked_mul(price.value())
            .ok_or(MarketError::NotionalOverflow {
                amount,
                price: price.value(),
            })?;
        if notional < self.min_order_size {
            return Err(MarketError::OrderTooSmall {
                notional,
                minimum: self.min_order_size,
            });
        }
        if notional.normalize().scale() > self.quote_token.decimals {
            return Err(MarketError::NotionalPrecision {
                notional,
                decimals: self.quote_token.decimals,
            });
        }
        Ok(Quote::new(notional))
    }

    /// Base or quote token by symbol
    pub fn token_for_symbol(&self, symbol: &str) -> Option<&Token> {
        if self.base_token.symbol.eq_ignore_ascii_case(symbol) {
            Some(&self.base_token)
        } else if self.quote_token.symbol.eq_ignore_ascii_case(symbol) {
            Some(&self.quote_token)
        } else {
            None
        }
    }

    pub fn is_quote_symbol(&self, symbol: &str) -> bool {
        self.quote_token.symbol.eq_ignore_ascii_case(symbol)
    }

    /// Gas surcharge for a trade of this notional. protocol v1 orders carry none.
    pub fn gas_fee_amount(&self, notional: Quote, protocol_version: u32) -> Quote {
        if protocol_version < 2 {
            return Quote::zero();
        }
        match self.gas_fee {
            GasFee::Flat(amount) => Quote::new(amount),
            GasFee::Proportional(rate) => notional.mul(rate),
        }
    }
}

/// Read access to market and token configuration.
#[async_trait]
pub trait MarketCatalog: Send + Sync {
    async fn market(&self, id: &MarketId) -> Result<Option<Market>, CollaboratorError>;

    async fn token(&self, symbol: &str) -> Result<Option<Token>, CollaboratorError>;

    async fn tokens(&self) -> Result<Vec<Token>, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarketError {
    #[error("invalid price {0}: must be positive")]
    InvalidPrice(Decimal),

    #[error("invalid amount {0}: must be positive")]
    InvalidAmount(Decimal),

    #[error("price {price} not a multiple of price unit {unit}")]
    InvalidPriceUnit { price: Decimal, unit: Decimal },

    #[error("amount {amount} not a multiple of amount unit {unit}")]
    InvalidAmountUnit { amount: Decimal, unit: Decimal },

    #[error("order notional {notional} below minimum {minimum}")]
    OrderTooSmall { notional: Decimal, minimum: Decimal },

    #[error("notional of {amount} at {price} out of range")]
    NotionalOverflow { amount: Decimal, price: Decimal },

    #[error("notional {notional} has more than {decimals} quote decimals")]
    NotionalPrecision { notional: Decimal, decimals: u32 },
}
