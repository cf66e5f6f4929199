//! Debt ledger: per-rate-class compounding index, normalized per-loan debt.
//!
//! Each rate class carries one monotone accrual index `chi` (RAY). A loan
//! stores only `pie`, its principal normalized by the index at draw time, so
//! current debt is `rmul(pie, chi)` and a single lazy index update accrues
//! interest for every loan in the class in O(1). The index advances in
//! closed form, `chi * rate^dt`, never by stepping missed seconds.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::math::{self, RAY};

pub type LoanId = u64;
pub type RateClassId = u32;

#[derive(Clone, Copy, Debug)]
pub struct RateClass {
    /// Per-second compounding rate, RAY. Always >= RAY so chi never shrinks.
    pub rate_per_second: u128,
    /// Accrual index, RAY. Starts at RAY, non-decreasing.
    pub chi: u128,
    /// Timestamp of the last index update.
    pub last_updated: u64,
    /// Sum of normalized debt across the class.
    pub total_pie: u128,
}

#[derive(Clone, Copy, Debug, Default)]
struct Participation {
    rate: RateClassId,
    pie: u128,
}

#[derive(Clone, Debug, Default)]
pub struct Ledger {
    rates: BTreeMap<RateClassId, RateClass>,
    loans: BTreeMap<LoanId, Participation>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update a rate class. The index is brought current before
    /// the rate changes so the new rate only applies going forward.
    pub fn file_rate(&mut self, class: RateClassId, rate_per_second: u128, now: u64) -> Result<()> {
        if rate_per_second < RAY {
            return Err(Error::InvalidState);
        }
        match self.rates.get_mut(&class) {
            Some(rc) => {
                let chi = projected_chi(rc, now)?;
                rc.chi = chi;
                rc.last_updated = now;
                rc.rate_per_second = rate_per_second;
            }
            None => {
                self.rates.insert(
                    class,
                    RateClass {
                        rate_per_second,
                        chi: RAY,
                        last_updated: now,
                        total_pie: 0,
                    },
                );
            }
        }
        Ok(())
    }

    pub fn rate_class(&self, class: RateClassId) -> Option<&RateClass> {
        self.rates.get(&class)
    }

    /// Bring a class index current. Called before any write touching it.
    pub fn accrue(&mut self, class: RateClassId, now: u64) -> Result<u128> {
        let rc = self.rates.get_mut(&class).ok_or(Error::NotFound)?;
        let chi = projected_chi(rc, now)?;
        rc.chi = chi;
        rc.last_updated = now;
        Ok(chi)
    }

    /// Bind a loan to a rate class. Only allowed while the loan has no debt.
    pub fn set_loan_rate(&mut self, loan: LoanId, class: RateClassId) -> Result<()> {
        if !self.rates.contains_key(&class) {
            return Err(Error::NotFound);
        }
        let p = self.loans.entry(loan).or_default();
        if p.pie != 0 {
            return Err(Error::InvalidState);
        }
        p.rate = class;
        Ok(())
    }

    /// Increase a loan's debt by `amount` currency. Ceiling enforcement is
    /// the caller's job; the ledger only keeps the books.
    pub fn draw(&mut self, loan: LoanId, amount: u128, now: u64) -> Result<()> {
        let class = self.loans.get(&loan).ok_or(Error::NotFound)?.rate;
        let chi = self.accrue(class, now)?;
        let delta = math::rdiv(amount, chi)?;
        let p = self.loans.get_mut(&loan).ok_or(Error::NotFound)?;
        p.pie = math::add(p.pie, delta)?;
        let rc = self.rates.get_mut(&class).ok_or(Error::NotFound)?;
        rc.total_pie = math::add(rc.total_pie, delta)?;
        Ok(())
    }

    /// Reduce a loan's debt by `amount` currency. `amount` must not exceed
    /// current debt; paying the exact debt zeroes the participation so the
    /// collateral can be released without dust.
    pub fn repay(&mut self, loan: LoanId, amount: u128, now: u64) -> Result<()> {
        let class = self.loans.get(&loan).ok_or(Error::NotFound)?.rate;
        let chi = self.accrue(class, now)?;
        let p = self.loans.get_mut(&loan).ok_or(Error::NotFound)?;
        let owed = math::rmul(p.pie, chi)?;
        if amount > owed {
            return Err(Error::InvalidState);
        }
        let delta = if amount == owed {
            p.pie
        } else {
            p.pie.min(math::rdiv(amount, chi)?)
        };
        p.pie -= delta;
        let rc = self.rates.get_mut(&class).ok_or(Error::NotFound)?;
        rc.total_pie = rc.total_pie.saturating_sub(delta);
        Ok(())
    }

    /// Write a loan's debt down to zero (collection path).
    pub fn zero(&mut self, loan: LoanId) -> Result<()> {
        let p = self.loans.get_mut(&loan).ok_or(Error::NotFound)?;
        let (class, pie) = (p.rate, p.pie);
        p.pie = 0;
        if let Some(rc) = self.rates.get_mut(&class) {
            rc.total_pie = rc.total_pie.saturating_sub(pie);
        }
        Ok(())
    }

    /// Current debt, computed against a projected index. Pure read: the
    /// stored index is not touched, so audits at arbitrary timestamps do not
    /// perturb state.
    pub fn debt(&self, loan: LoanId, now: u64) -> Result<u128> {
        let p = self.loans.get(&loan).ok_or(Error::NotFound)?;
        if p.pie == 0 {
            return Ok(0);
        }
        let rc = self.rates.get(&p.rate).ok_or(Error::NotFound)?;
        math::rmul(p.pie, projected_chi(rc, now)?)
    }

    /// Aggregate debt of one rate class.
    pub fn class_debt(&self, class: RateClassId, now: u64) -> Result<u128> {
        let rc = self.rates.get(&class).ok_or(Error::NotFound)?;
        math::rmul(rc.total_pie, projected_chi(rc, now)?)
    }
}

fn projected_chi(rc: &RateClass, now: u64) -> Result<u128> {
    if now <= rc.last_updated {
        return Ok(rc.chi);
    }
    let dt = now - rc.last_updated;
    math::rmul(rc.chi, math::rpow(rc.rate_per_second, dt)?)
}
