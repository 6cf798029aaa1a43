// 7.0: service configuration. protocol constants, relayer/proxy addresses,
// staging ttls, fee discount tiers, env presets.
// 7.1 FeeConfig only carries the hold-to-discount rule. market fee rates live on Market.

use crate::types::Address;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// Complete configuration for the intake service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    // Exchange contract protocol version stamped into every order
    pub protocol_version: u32,
    // Relayer that submits matched orders on chain
    pub relayer: Address,
    // Proxy contract that balances are approved to
    pub proxy: Address,
    // How long a built spot order waits for its signature
    pub spot_order_ttl_secs: u64,
    // Margin orders get longer since the batch is bigger to review
    pub margin_order_ttl_secs: u64,
    pub fees: FeeConfig,
    // Log every request at info instead of debug
    pub verbose: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            protocol_version: 2,
            relayer: Address::from_low_u64_be(0x93388b4e),
            proxy: Address::from_low_u64_be(0x7fd8),
            spot_order_ttl_secs: 60,
            margin_order_ttl_secs: 120,
            fees: FeeConfig::default(),
            verbose: false,
        }
    }
}

// Fee discount for holding the exchange token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    // Symbol of the token whose balance earns the discount
    pub discount_token: String,
    // Tiers in ascending order of max_balance. the first tier the balance fits wins.
    pub discount_tiers: Vec<DiscountTier>,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            discount_token: "HOT".to_string(),
            discount_tiers: vec![
                DiscountTier { max_balance: Some(dec!(10_000)), rate: dec!(1) },
                DiscountTier { max_balance: Some(dec!(100_000)), rate: dec!(0.9) },
                DiscountTier { max_balance: Some(dec!(1_000_000)), rate: dec!(0.8) },
                DiscountTier { max_balance: Some(dec!(5_000_000)), rate: dec!(0.7) },
                DiscountTier { max_balance: Some(dec!(10_000_000)), rate: dec!(0.6) },
                DiscountTier { max_balance: None, rate: dec!(0.5) },
            ],
        }
    }
}

impl FeeConfig {
    /// Multiplier applied to maker and taker fees. 1 means no discount.
    pub fn discount_rate(&self, held: Decimal) -> Decimal {
        for tier in &self.discount_tiers {
            match tier.max_balance {
                None => return tier.rate,
                Some(limit) if held <= limit => return tier.rate,
                Some(_) => {}
            }
        }
        Decimal::ONE
    }
}

// Holding tier. None as max_balance catches everything above the previous tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountTier {
    pub max_balance: Option<Decimal>,
    // Fraction of the fee actually paid (0.7 = 30% off)
    pub rate: Decimal,
}

impl ServiceConfig {
    // Testnet: no hold discount, short ttls so stale builds clear fast
    pub fn testnet() -> Self {
        let mut config = Self::default();
        config.fees.discount_tiers.clear();
        config.spot_order_ttl_secs = 30;
        config.margin_order_ttl_secs = 60;
        config.verbose = true;
        config
    }

    // Mainnet relayer and proxy
    pub fn mainnet() -> Self {
        let mut config = Self::default();
        config.relayer = Address::from_low_u64_be(0x49497a4d);
        config.proxy = Address::from_low_u64_be(0x74622073);
        config
    }

    pub fn staging_ttl(&self, is_margin: bool) -> Duration {
        if is_margin {
            Duration::from_secs(self.margin_order_ttl_secs)
        } else {
            Duration::from_secs(self.spot_order_ttl_secs)
        }
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol_version == 0 {
            return Err(ConfigError::InvalidProtocol {
                reason: "protocol version must be at least 1".to_string(),
            });
        }

        if self.relayer.is_zero() || self.proxy.is_zero() {
            return Err(ConfigError::InvalidAddress {
                reason: "relayer and proxy must be set".to_string(),
            });
        }

        if self.spot_order_ttl_secs == 0 || self.margin_order_ttl_secs == 0 {
            return Err(ConfigError::InvalidStaging {
                reason: "staging ttl must be positive".to_string(),
            });
        }

        let mut previous: Option<Decimal> = None;
        for (i, tier) in self.fees.discount_tiers.iter().enumerate() {
            if tier.rate <= Decimal::ZERO || tier.rate > Decimal::ONE {
                return Err(ConfigError::InvalidFees {
                    reason: format!("tier {i} rate must be in (0, 1]"),
                });
            }
            match (previous, tier.max_balance) {
                (Some(prev), Some(limit)) if limit <= prev => {
                    return Err(ConfigError::InvalidFees {
                        reason: format!("tier {i} limit must increase"),
                    });
                }
                (_, None) if i + 1 != self.fees.discount_tiers.len() => {
                    return Err(ConfigError::InvalidFees {
                        reason: "unbounded tier must be last".to_string(),
                    });
                }
                _ => {}
            }
            previous = tier.max_balance;
        }

        Ok(())
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid protocol: {reason}")]
    InvalidProtocol { reason: String },
    #[error("invalid address: {reason}")]
    InvalidAddress { reason: String },
    #[error("invalid staging: {reason}")]
    InvalidStaging { reason: String },
    #[error("invalid fees: {reason}")]
    InvalidFees { reason: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> ServiceConfig {
        match self {
            Environment::Development => ServiceConfig::default(),
            Environment::Testnet => ServiceConfig::testnet(),
            Environment::Mainnet => ServiceConfig::mainnet(),
        }
    }
}
