//! Reserve: custody ledger for the pool's liquid settlement currency.
//!
//! Sole mutator of the liquid balance. Lifetime counters back the
//! conservation checks in the test harness.

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, Default)]
pub struct Reserve {
    balance: u128,
    pub lifetime_in: u128,
    pub lifetime_out: u128,
}

impl Reserve {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self) -> u128 {
        self.balance
    }

    pub fn deposit(&mut self, amount: u128) -> Result<()> {
        self.balance = self.balance.checked_add(amount).ok_or(Error::Overflow)?;
        self.lifetime_in = self.lifetime_in.saturating_add(amount);
        Ok(())
    }

    pub fn payout(&mut self, amount: u128) -> Result<()> {
        if amount > self.balance {
            return Err(Error::InsufficientFunds);
        }
        self.balance -= amount;
        self.lifetime_out = self.lifetime_out.saturating_add(amount);
        Ok(())
    }
}
