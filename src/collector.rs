//! Collector: seizure and liquidation of collateral backing bad debt.
//!
//! A loan becomes collectible only once its accrued debt crosses the
//! liquidation threshold, and collection is a two-step explicit process:
//! `seize` shuts the normal repayment path, `collect` swaps the collateral
//! title against the filed ask and writes the debt off.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::host::Host;
use crate::ledger::LoanId;
use crate::pool::Pool;
use crate::registry::LoanStatus;
use crate::Addr;

/// Filed liquidation terms for one loan.
#[derive(Clone, Copy, Debug)]
pub struct LiquidationOrder {
    pub recipient: Addr,
    /// Currency the recipient pays for the collateral title.
    pub ask: u128,
}

#[derive(Clone, Debug, Default)]
pub struct Collector {
    orders: BTreeMap<LoanId, LiquidationOrder>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(&self, loan: LoanId) -> Option<&LiquidationOrder> {
        self.orders.get(&loan)
    }
}

impl Pool {
    /// Debt above the liquidation threshold, the precondition for any
    /// collection step.
    fn collectible(&self, loan: LoanId, now: u64) -> Result<bool> {
        let collateral = self.registry.collateral_of(loan)?;
        let debt = self.ledger.debt(loan, now)?;
        Ok(debt > self.feed.threshold(collateral)?)
    }

    /// Register liquidation terms for a collectible loan.
    pub fn file_collect(
        &mut self,
        caller: Addr,
        loan: LoanId,
        recipient: Addr,
        ask: u128,
        now: u64,
    ) -> Result<()> {
        self.wards.auth(caller)?;
        if !self.collectible(loan, now)? {
            return Err(Error::InvalidState);
        }
        self.collector.orders.insert(loan, LiquidationOrder { recipient, ask });
        Ok(())
    }

    /// Mark a collectible loan as seized; repayment becomes unavailable.
    pub fn seize(&mut self, caller: Addr, loan: LoanId, now: u64) -> Result<()> {
        self.wards.auth(caller)?;
        self.registry.expect_status(loan, LoanStatus::Locked)?;
        if !self.collectible(loan, now)? {
            return Err(Error::InvalidState);
        }
        self.registry.set_status(loan, LoanStatus::Seized)
    }

    /// Swap the collateral title to the filed recipient against the ask,
    /// write the loan's debt off and close it. Requires a prior seize.
    pub fn collect(&mut self, host: &mut impl Host, caller: Addr, loan: LoanId) -> Result<()> {
        let terms = *self.collector.orders.get(&loan).ok_or(Error::NotFound)?;
        if caller != terms.recipient {
            return Err(Error::Unauthorized);
        }
        let record = match self.registry.loan(loan) {
            Ok(l) if l.status == LoanStatus::Seized => *l,
            Ok(_) => return Err(Error::NotSeized),
            Err(e) => return Err(e),
        };
        if host.currency_balance(caller) < terms.ask {
            return Err(Error::InsufficientFunds);
        }
        host.transfer_currency(caller, self.account, terms.ask)?;
        self.reserve.deposit(terms.ask)?;
        host.transfer_collateral(record.collateral, self.account, terms.recipient)?;
        self.ledger.zero(loan)?;
        self.registry.set_status(loan, LoanStatus::Closed)?;
        self.collector.orders.remove(&loan);
        Ok(())
    }
}
