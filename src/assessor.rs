//! Valuation and ratio assessor.
//!
//! Tracks the senior coupon liability with the same normalized-debt /
//! compounding-index mechanism as the debt ledger, just against one fixed
//! senior rate. Computes tranche token prices (junior absorbs losses first)
//! and validates candidate epoch solutions against the solvency band and
//! the reserve ceiling. Validation is pure: same inputs, same verdict.

use crate::error::{Error, Result};
use crate::math::{self, RAY};

/// A candidate fulfillment, all four legs in currency (redeem legs are the
/// token orders priced at the epoch-close token price).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Solution {
    pub senior_supply: u128,
    pub junior_supply: u128,
    pub senior_redeem: u128,
    pub junior_redeem: u128,
}

impl Solution {
    /// Scale every leg by a RAY factor (conservative-default search).
    pub fn scaled(&self, factor: u128) -> Result<Solution> {
        Ok(Solution {
            senior_supply: math::rmul(self.senior_supply, factor)?,
            junior_supply: math::rmul(self.junior_supply, factor)?,
            senior_redeem: math::rmul(self.senior_redeem, factor)?,
            junior_redeem: math::rmul(self.junior_redeem, factor)?,
        })
    }

    pub fn is_zero(&self) -> bool {
        self.senior_supply == 0
            && self.junior_supply == 0
            && self.senior_redeem == 0
            && self.junior_redeem == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    SeniorRatioTooLow,
    SeniorRatioTooHigh,
    ReserveExceeded,
    InsufficientReserveForRedeem,
}

impl ValidationResult {
    /// Map a verdict onto the error taxonomy for rejected submissions.
    pub fn into_error(self) -> Option<Error> {
        match self {
            ValidationResult::Valid => None,
            ValidationResult::SeniorRatioTooLow | ValidationResult::SeniorRatioTooHigh => {
                Some(Error::RatioViolation)
            }
            ValidationResult::ReserveExceeded => Some(Error::ReserveExceeded),
            ValidationResult::InsufficientReserveForRedeem => Some(Error::InsufficientFunds),
        }
    }
}

/// State frozen at epoch close; everything validation needs.
#[derive(Clone, Copy, Debug)]
pub struct EpochSnapshot {
    /// Mark-to-model value of the loan book (write-offs applied).
    pub nav: u128,
    /// Liquid reserve at close (order currency excluded, it sits in
    /// tranche custody until settlement).
    pub reserve: u128,
    /// Senior par value at close.
    pub senior_asset: u128,
    /// Order totals in currency, the upper bounds for any solution.
    pub orders: Solution,
    pub min_senior_ratio: u128,
    pub max_senior_ratio: u128,
    pub max_reserve: u128,
}

/// Score: sum of the four fulfillment ratios, RAY-scaled. Higher is better;
/// legs with no orders contribute nothing.
pub fn score(snap: &EpochSnapshot, sol: &Solution) -> Result<u128> {
    let mut total = 0u128;
    for (fulfilled, ordered) in [
        (sol.senior_supply, snap.orders.senior_supply),
        (sol.junior_supply, snap.orders.junior_supply),
        (sol.senior_redeem, snap.orders.senior_redeem),
        (sol.junior_redeem, snap.orders.junior_redeem),
    ] {
        if ordered > 0 {
            total = math::add(total, math::rdiv(fulfilled, ordered)?)?;
        }
    }
    Ok(total)
}

/// Check a candidate fulfillment against reserve and solvency constraints.
pub fn validate(snap: &EpochSnapshot, sol: &Solution) -> Result<ValidationResult> {
    let currency_in = math::add(sol.senior_supply, sol.junior_supply)?;
    let currency_out = math::add(sol.senior_redeem, sol.junior_redeem)?;

    let available = math::add(snap.reserve, currency_in)?;
    if currency_out > available {
        return Ok(ValidationResult::InsufficientReserveForRedeem);
    }
    let new_reserve = available - currency_out;
    if new_reserve > snap.max_reserve {
        return Ok(ValidationResult::ReserveExceeded);
    }

    let senior_after = snap
        .senior_asset
        .saturating_add(sol.senior_supply)
        .saturating_sub(sol.senior_redeem);
    let assets_after = math::add(snap.nav, new_reserve)?;
    if assets_after == 0 {
        return Ok(if senior_after == 0 {
            ValidationResult::Valid
        } else {
            ValidationResult::SeniorRatioTooHigh
        });
    }
    let ratio = math::rdiv(senior_after.min(assets_after), assets_after)?;
    if ratio < snap.min_senior_ratio {
        return Ok(ValidationResult::SeniorRatioTooLow);
    }
    if ratio > snap.max_senior_ratio {
        return Ok(ValidationResult::SeniorRatioTooHigh);
    }
    Ok(ValidationResult::Valid)
}

/// Senior coupon position. `pie`/`chi` exactly as in the debt ledger.
#[derive(Clone, Copy, Debug)]
pub struct Assessor {
    /// Fixed senior rate per second, RAY.
    pub senior_rate: u128,
    senior_pie: u128,
    senior_chi: u128,
    last_updated: u64,
}

impl Assessor {
    pub fn new(senior_rate: u128, now: u64) -> Self {
        Assessor { senior_rate, senior_pie: 0, senior_chi: RAY, last_updated: now }
    }

    fn projected_chi(&self, now: u64) -> Result<u128> {
        if now <= self.last_updated {
            return Ok(self.senior_chi);
        }
        let dt = now - self.last_updated;
        math::rmul(self.senior_chi, math::rpow(self.senior_rate, dt)?)
    }

    /// Bring the senior index current; precedes every mutation.
    pub fn drip(&mut self, now: u64) -> Result<()> {
        self.senior_chi = self.projected_chi(now)?;
        self.last_updated = now;
        Ok(())
    }

    /// Change the fixed senior rate going forward.
    pub fn file_rate(&mut self, rate: u128, now: u64) -> Result<()> {
        if rate < RAY {
            return Err(Error::InvalidState);
        }
        self.drip(now)?;
        self.senior_rate = rate;
        Ok(())
    }

    /// Senior par value: what the senior tranche is owed, coupon included.
    pub fn senior_par(&self, now: u64) -> Result<u128> {
        math::rmul(self.senior_pie, self.projected_chi(now)?)
    }

    /// Apply an executed epoch's net senior flow (supply in, redeem out).
    pub fn adjust_senior(&mut self, supply: u128, redeem: u128, now: u64) -> Result<()> {
        self.drip(now)?;
        if supply > 0 {
            self.senior_pie = math::add(self.senior_pie, math::rdiv(supply, self.senior_chi)?)?;
        }
        if redeem > 0 {
            let par = math::rmul(self.senior_pie, self.senior_chi)?;
            if redeem >= par {
                self.senior_pie = 0;
            } else {
                let delta = math::rdiv(redeem, self.senior_chi)?;
                self.senior_pie = self.senior_pie.saturating_sub(delta);
            }
        }
        Ok(())
    }

    /// Senior token price, RAY. Capped at total assets per token: the
    /// senior claim cannot exceed what the pool holds.
    pub fn senior_token_price(&self, total_assets: u128, senior_supply: u128, now: u64) -> Result<u128> {
        if senior_supply == 0 {
            return Ok(RAY);
        }
        let par = self.senior_par(now)?;
        math::rdiv(par.min(total_assets), senior_supply)
    }

    /// Junior token price, RAY. Junior holds the residual after the senior
    /// par claim, floored at zero: junior absorbs losses first.
    pub fn junior_token_price(&self, total_assets: u128, junior_supply: u128, now: u64) -> Result<u128> {
        if junior_supply == 0 {
            return Ok(RAY);
        }
        let par = self.senior_par(now)?;
        math::rdiv(total_assets.saturating_sub(par), junior_supply)
    }
}
