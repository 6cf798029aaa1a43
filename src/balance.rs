// 12.0: balance and allowance oracle. reads on-chain balances, allowances to a
// spender (the exchange proxy) and the amount already locked by open orders. all
// amounts are human units (already divided by token decimals).

use crate::error::CollaboratorError;
use crate::market::Token;
use crate::service::ServiceError;
use crate::types::Address;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait BalanceOracle: Send + Sync {
    async fn balance(&self, token: &Token, owner: Address) -> Result<Decimal, CollaboratorError>;

    /// Allowance granted by `owner` to `spender`
    async fn allowance(
        &self,
        token: &Token,
        owner: Address,
        spender: Address,
    ) -> Result<Decimal, CollaboratorError>;

    /// Amount reserved by the owner's open orders
    async fn locked_balance(
        &self,
        token: &Token,
        owner: Address,
    ) -> Result<Decimal, CollaboratorError>;
}

/** 12.1: one row of the locked balance report */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedBalance {
    pub symbol: String,
    pub locked_balance: Decimal,
}

// 12.2: what the trader can still commit. balance minus locked, floored at zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spendable {
    pub available: Decimal,
    pub allowance: Decimal,
}

impl Spendable {
    pub async fn load(
        oracle: &dyn BalanceOracle,
        token: &Token,
        owner: Address,
        spender: Address,
    ) -> Result<Self, CollaboratorError> {
        let balance = oracle.balance(token, owner).await?;
        let locked = oracle.locked_balance(token, owner).await?;
        let allowance = oracle.allowance(token, owner, spender).await?;
        Ok(Self {
            available: (balance - locked).max(Decimal::ZERO),
            allowance,
        })
    }

    /// Balance first, then allowance
    pub fn require(&self, token: &Token, required: Decimal) -> Result<(), ServiceError> {
        if required > self.available {
            return Err(ServiceError::InsufficientBalance {
                asset: token.symbol.clone(),
                available: self.available,
                required,
            });
        }
        if required > self.allowance {
            return Err(ServiceError::InsufficientAllowance {
                asset: token.symbol.clone(),
                available: self.allowance,
                required,
            });
        }
        Ok(())
    }
}
