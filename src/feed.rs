//! Collateral valuation feed.
//!
//! Appraises pledged assets, derives borrowing ceilings and liquidation
//! thresholds per risk class, and marks loan values down around maturity.
//! Re-pricing only moves *future* borrowing capacity: existing debt is never
//! made instantly collectible by an appraisal alone, collection always goes
//! through the explicit seize step.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::host::CollateralRef;
use crate::ledger::RateClassId;
use crate::math::{self, RAY};

pub type RiskClassId = u32;

/// Ceiling write-down toward maturity. Pluggable per risk class; no single
/// curve is canonical across deployments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteDownPolicy {
    /// Full ceiling until maturity, zero after.
    None,
    /// Linear decay from full to zero over the `lead_time` seconds before
    /// maturity.
    Linear { lead_time: u64 },
    /// Step curve: (seconds before maturity, remaining fraction RAY), sorted
    /// by decreasing lead. Fraction drops to zero at maturity.
    Stepped { steps: Vec<(u64, u128)> },
}

/// Expected-loss schedule for overdue loans: (seconds past maturity,
/// fraction of debt written off, RAY), sorted ascending. Feeds the NAV.
pub type WriteOffSchedule = Vec<(u64, u128)>;

#[derive(Clone, Debug)]
pub struct RiskClass {
    /// Loan-to-value ratio, RAY.
    pub ltv: u128,
    /// Liquidation ratio, RAY. Strictly above `ltv` so a grace buffer exists
    /// between the borrowing ceiling and collectability.
    pub liquidation_ratio: u128,
    /// Rate class loans of this risk group accrue under.
    pub rate_class: RateClassId,
    pub write_down: WriteDownPolicy,
    pub write_off: WriteOffSchedule,
}

#[derive(Clone, Copy, Debug)]
pub struct Appraisal {
    pub value: u128,
    pub risk: RiskClassId,
    /// 0 = no maturity set (never written down).
    pub maturity: u64,
}

#[derive(Clone, Debug, Default)]
pub struct Feed {
    classes: BTreeMap<RiskClassId, RiskClass>,
    appraisals: BTreeMap<CollateralRef, Appraisal>,
}

impl Feed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_risk_class(&mut self, id: RiskClassId, class: RiskClass) -> Result<()> {
        if class.liquidation_ratio <= class.ltv {
            return Err(Error::InvalidState);
        }
        self.classes.insert(id, class);
        Ok(())
    }

    pub fn risk_class(&self, id: RiskClassId) -> Option<&RiskClass> {
        self.classes.get(&id)
    }

    /// Record an appraisal. An existing maturity survives re-pricing.
    pub fn price(&mut self, collateral: CollateralRef, value: u128, risk: RiskClassId) -> Result<()> {
        if !self.classes.contains_key(&risk) {
            return Err(Error::NotFound);
        }
        let maturity = self.appraisals.get(&collateral).map_or(0, |a| a.maturity);
        self.appraisals.insert(collateral, Appraisal { value, risk, maturity });
        Ok(())
    }

    pub fn file_maturity(&mut self, collateral: CollateralRef, maturity: u64) -> Result<()> {
        let a = self.appraisals.get_mut(&collateral).ok_or(Error::NotFound)?;
        a.maturity = maturity;
        Ok(())
    }

    pub fn appraisal(&self, collateral: CollateralRef) -> Option<&Appraisal> {
        self.appraisals.get(&collateral)
    }

    /// Rate class the collateral's risk group accrues under.
    pub fn rate_class_of(&self, collateral: CollateralRef) -> Result<RateClassId> {
        let a = self.appraisals.get(&collateral).ok_or(Error::NotFound)?;
        let c = self.classes.get(&a.risk).ok_or(Error::NotFound)?;
        Ok(c.rate_class)
    }

    /// Maximum principal drawable against the collateral at `now`:
    /// `value * ltv * write_down`. Monotonically non-increasing toward and
    /// past maturity.
    pub fn ceiling(&self, collateral: CollateralRef, now: u64) -> Result<u128> {
        let a = self.appraisals.get(&collateral).ok_or(Error::NotFound)?;
        let c = self.classes.get(&a.risk).ok_or(Error::NotFound)?;
        let base = math::rmul(a.value, c.ltv)?;
        let fraction = write_down_fraction(&c.write_down, a.maturity, now);
        math::rmul(base, fraction)
    }

    /// Debt level above which the loan becomes collectible.
    pub fn threshold(&self, collateral: CollateralRef) -> Result<u128> {
        let a = self.appraisals.get(&collateral).ok_or(Error::NotFound)?;
        let c = self.classes.get(&a.risk).ok_or(Error::NotFound)?;
        math::rmul(a.value, c.liquidation_ratio)
    }

    /// Mark-to-model value of one loan's debt: debt minus the expected
    /// write-off for time past maturity.
    pub fn loan_value(&self, collateral: CollateralRef, debt: u128, now: u64) -> Result<u128> {
        if debt == 0 {
            return Ok(0);
        }
        let a = self.appraisals.get(&collateral).ok_or(Error::NotFound)?;
        let c = self.classes.get(&a.risk).ok_or(Error::NotFound)?;
        let written_off = write_off_fraction(&c.write_off, a.maturity, now);
        math::rmul(debt, RAY - written_off)
    }
}

/// Remaining ceiling fraction (RAY) under a write-down policy.
fn write_down_fraction(policy: &WriteDownPolicy, maturity: u64, now: u64) -> u128 {
    if maturity == 0 {
        return RAY;
    }
    if now >= maturity {
        return 0;
    }
    let remaining = maturity - now;
    match policy {
        WriteDownPolicy::None => RAY,
        WriteDownPolicy::Linear { lead_time } => {
            if remaining >= *lead_time || *lead_time == 0 {
                RAY
            } else {
                // remaining/lead_time of the ceiling is left.
                math::mul_div(RAY, remaining as u128, *lead_time as u128).unwrap_or(0)
            }
        }
        WriteDownPolicy::Stepped { steps } => {
            let mut fraction = RAY;
            for (lead, f) in steps {
                if remaining <= *lead {
                    fraction = fraction.min(*f);
                }
            }
            fraction
        }
    }
}

/// Written-off debt fraction (RAY) for a loan `now - maturity` overdue.
fn write_off_fraction(schedule: &WriteOffSchedule, maturity: u64, now: u64) -> u128 {
    if maturity == 0 || now <= maturity {
        return 0;
    }
    let overdue = now - maturity;
    let mut fraction = 0u128;
    for (secs, f) in schedule {
        if overdue >= *secs {
            fraction = fraction.max(*f);
        }
    }
    fraction.min(RAY)
}
