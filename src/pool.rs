//! Pool aggregate: all engine state in one struct, plus the borrower- and
//! investor-facing entry points. The epoch machinery lives in `coordinator`,
//! collection in `collector`; both are `impl Pool` blocks over this state.
//!
//! Every operation is one atomic step: it either completes or returns an
//! error with state untouched. Host-side transfers are sequenced after all
//! precondition checks so a failed check never strands funds.

use crate::assessor::Assessor;
use crate::auth::Wards;
use crate::collector::Collector;
use crate::coordinator::{Coordinator, Phase};
use crate::error::{Error, Result};
use crate::feed::{Feed, RiskClass, RiskClassId};
use crate::host::{CollateralRef, Host, TrancheId};
use crate::ledger::{Ledger, LoanId, RateClassId};
use crate::math;
use crate::registry::{LoanStatus, Registry};
use crate::reserve::Reserve;
use crate::tranche::{Disbursement, Tranche};
use crate::Addr;

/// Governance-adjustable configuration. Mutated only through [`Pool::file`],
/// which bumps `version`; read-only everywhere else.
#[derive(Clone, Copy, Debug)]
pub struct PoolParams {
    pub version: u64,
    /// Minimum seconds an epoch stays open.
    pub min_epoch_time: u64,
    /// Seconds the challenge window stays open after an invalid close.
    pub challenge_time: u64,
    /// Senior ratio band, RAY.
    pub min_senior_ratio: u128,
    pub max_senior_ratio: u128,
    /// Reserve ceiling, currency.
    pub max_reserve: u128,
}

/// One governance knob; applied via the audited `file` setter.
#[derive(Clone, Copy, Debug)]
pub enum Param {
    MinEpochTime(u64),
    ChallengeTime(u64),
    MinSeniorRatio(u128),
    MaxSeniorRatio(u128),
    MaxReserve(u128),
    SeniorRate(u128),
}

#[derive(Clone, Debug)]
pub struct Pool {
    /// The pool's custody account in the host (currency, collateral and
    /// in-flight tranche tokens).
    pub account: Addr,
    pub wards: Wards,
    pub params: PoolParams,
    pub feed: Feed,
    pub ledger: Ledger,
    pub registry: Registry,
    pub senior: Tranche,
    pub junior: Tranche,
    pub reserve: Reserve,
    pub assessor: Assessor,
    pub coordinator: Coordinator,
    pub collector: Collector,
}

impl Pool {
    pub fn new(root: Addr, account: Addr, params: PoolParams, senior_rate: u128, now: u64) -> Self {
        Pool {
            account,
            wards: Wards::with_root(root),
            params,
            feed: Feed::new(),
            ledger: Ledger::new(),
            registry: Registry::new(),
            senior: Tranche::new(TrancheId::Senior),
            junior: Tranche::new(TrancheId::Junior),
            reserve: Reserve::new(),
            assessor: Assessor::new(senior_rate, now),
            coordinator: Coordinator::new(now),
            collector: Collector::new(),
        }
    }

    pub(crate) fn tranche_mut(&mut self, id: TrancheId) -> &mut Tranche {
        match id {
            TrancheId::Senior => &mut self.senior,
            TrancheId::Junior => &mut self.junior,
        }
    }

    pub fn tranche(&self, id: TrancheId) -> &Tranche {
        match id {
            TrancheId::Senior => &self.senior,
            TrancheId::Junior => &self.junior,
        }
    }

    // ========================================
    // Governance
    // ========================================

    pub fn rely(&mut self, caller: Addr, usr: Addr) -> Result<()> {
        self.wards.rely(caller, usr)
    }

    pub fn deny(&mut self, caller: Addr, usr: Addr) -> Result<()> {
        self.wards.deny(caller, usr)
    }

    /// Apply one parameter change; bumps the config version.
    pub fn file(&mut self, caller: Addr, param: Param, now: u64) -> Result<()> {
        self.wards.auth(caller)?;
        match param {
            Param::MinEpochTime(v) => self.params.min_epoch_time = v,
            Param::ChallengeTime(v) => self.params.challenge_time = v,
            Param::MinSeniorRatio(v) => self.params.min_senior_ratio = v,
            Param::MaxSeniorRatio(v) => self.params.max_senior_ratio = v,
            Param::MaxReserve(v) => self.params.max_reserve = v,
            Param::SeniorRate(v) => self.assessor.file_rate(v, now)?,
        }
        self.params.version += 1;
        Ok(())
    }

    pub fn file_risk_class(&mut self, caller: Addr, id: RiskClassId, class: RiskClass) -> Result<()> {
        self.wards.auth(caller)?;
        self.feed.file_risk_class(id, class)
    }

    pub fn file_rate(&mut self, caller: Addr, class: RateClassId, rate_per_second: u128, now: u64) -> Result<()> {
        self.wards.auth(caller)?;
        self.ledger.file_rate(class, rate_per_second, now)
    }

    /// Record an appraisal; requires the pricing capability.
    pub fn price(&mut self, caller: Addr, collateral: CollateralRef, value: u128, risk: RiskClassId) -> Result<()> {
        self.wards.auth(caller)?;
        self.feed.price(collateral, value, risk)
    }

    pub fn file_maturity(&mut self, caller: Addr, collateral: CollateralRef, maturity: u64) -> Result<()> {
        self.wards.auth(caller)?;
        self.feed.file_maturity(collateral, maturity)
    }

    // ========================================
    // Valuation
    // ========================================

    /// Mark-to-model value of the loan book at `now`, write-offs applied.
    pub fn nav(&self, now: u64) -> Result<u128> {
        let mut total = 0u128;
        for loan in self.registry.active() {
            let debt = self.ledger.debt(loan.id, now)?;
            let value = self.feed.loan_value(loan.collateral, debt, now)?;
            total = math::add(total, value)?;
        }
        Ok(total)
    }

    /// Loan book plus idle reserve.
    pub fn total_assets(&self, now: u64) -> Result<u128> {
        math::add(self.nav(now)?, self.reserve.balance())
    }

    pub fn senior_token_price(&self, host: &impl Host, now: u64) -> Result<u128> {
        let supply = host.tranche_total_supply(TrancheId::Senior);
        self.assessor.senior_token_price(self.total_assets(now)?, supply, now)
    }

    pub fn junior_token_price(&self, host: &impl Host, now: u64) -> Result<u128> {
        let supply = host.tranche_total_supply(TrancheId::Junior);
        self.assessor.junior_token_price(self.total_assets(now)?, supply, now)
    }

    // ========================================
    // Borrower side
    // ========================================

    /// Pledge collateral, receive a loan title. Caller must own the asset.
    pub fn issue(&mut self, host: &impl Host, caller: Addr, collateral: CollateralRef) -> Result<LoanId> {
        if host.collateral_owner(collateral) != Some(caller) {
            return Err(Error::Unauthorized);
        }
        self.registry.issue(caller, collateral)
    }

    /// Move the collateral into pool custody and bind the loan to its risk
    /// group's rate class. Requires a prior appraisal.
    pub fn lock(&mut self, host: &mut impl Host, caller: Addr, loan: LoanId, now: u64) -> Result<()> {
        let record = *self.registry.expect_status(loan, LoanStatus::Issued)?;
        if record.borrower != caller {
            return Err(Error::Unauthorized);
        }
        let rate = self.feed.rate_class_of(record.collateral)?;
        if self.ledger.rate_class(rate).is_none() {
            return Err(Error::NotFound);
        }
        self.ledger.accrue(rate, now)?;
        self.ledger.set_loan_rate(loan, rate)?;
        host.transfer_collateral(record.collateral, caller, self.account)?;
        self.registry.set_status(loan, LoanStatus::Locked)
    }

    /// Draw `amount` against the collateral ceiling; pays out of the reserve.
    pub fn borrow(&mut self, host: &mut impl Host, caller: Addr, loan: LoanId, amount: u128, now: u64) -> Result<()> {
        let record = *self.registry.expect_status(loan, LoanStatus::Locked)?;
        if record.borrower != caller {
            return Err(Error::Unauthorized);
        }
        // No draws while an epoch awaits execution: the pending solution
        // was validated against the reserve frozen at close.
        if self.coordinator.phase != Phase::Open {
            return Err(Error::InvalidState);
        }
        let ceiling = self.feed.ceiling(record.collateral, now)?;
        let debt = self.ledger.debt(loan, now)?;
        if math::add(debt, amount)? > ceiling {
            return Err(Error::CeilingExceeded);
        }
        // Reserve check precedes the ledger write so a failed payout cannot
        // leave phantom debt.
        if amount > self.reserve.balance() {
            return Err(Error::InsufficientFunds);
        }
        self.ledger.draw(loan, amount, now)?;
        self.reserve.payout(amount)?;
        host.transfer_currency(self.account, caller, amount)
    }

    /// Pay `amount` toward the loan. Must not exceed current debt; repaying
    /// the exact debt clears the ledger record.
    pub fn repay(&mut self, host: &mut impl Host, caller: Addr, loan: LoanId, amount: u128, now: u64) -> Result<()> {
        let record = *self.registry.expect_status(loan, LoanStatus::Locked)?;
        if record.borrower != caller {
            return Err(Error::Unauthorized);
        }
        let debt = self.ledger.debt(loan, now)?;
        if amount > debt {
            return Err(Error::InvalidState);
        }
        if host.currency_balance(caller) < amount {
            return Err(Error::InsufficientFunds);
        }
        self.ledger.repay(loan, amount, now)?;
        host.transfer_currency(caller, self.account, amount)?;
        self.reserve.deposit(amount)
    }

    /// Return the collateral once the debt is cleared.
    pub fn unlock(&mut self, host: &mut impl Host, caller: Addr, loan: LoanId, now: u64) -> Result<()> {
        let record = *self.registry.expect_status(loan, LoanStatus::Locked)?;
        if record.borrower != caller {
            return Err(Error::Unauthorized);
        }
        if self.ledger.debt(loan, now)? != 0 {
            return Err(Error::InvalidState);
        }
        host.transfer_collateral(record.collateral, self.account, caller)?;
        self.registry.set_status(loan, LoanStatus::Issued)
    }

    /// Retire an unlocked title, freeing the collateral for reissue.
    pub fn close(&mut self, caller: Addr, loan: LoanId) -> Result<()> {
        let record = *self.registry.expect_status(loan, LoanStatus::Issued)?;
        if record.borrower != caller {
            return Err(Error::Unauthorized);
        }
        self.registry.set_status(loan, LoanStatus::Closed)
    }

    // ========================================
    // Investor side
    // ========================================

    fn require_member(&self, host: &impl Host, tranche: TrancheId, addr: Addr, now: u64) -> Result<()> {
        match host.membership_valid_until(tranche, addr) {
            Some(until) if until >= now => Ok(()),
            _ => Err(Error::NotWhitelisted),
        }
    }

    /// Lock `amount` currency into the open epoch's supply queue.
    pub fn supply_order(&mut self, host: &mut impl Host, caller: Addr, tranche: TrancheId, amount: u128, now: u64) -> Result<()> {
        self.require_member(host, tranche, caller, now)?;
        if amount == 0 {
            return Err(Error::InvalidState);
        }
        if host.currency_balance(caller) < amount {
            return Err(Error::InsufficientFunds);
        }
        let epoch = self.coordinator.current_epoch;
        let account = self.account;
        self.tranche_mut(tranche).supply_order(caller, amount, epoch)?;
        host.transfer_currency(caller, account, amount)
    }

    /// Lock `amount` tranche tokens into the open epoch's redeem queue.
    pub fn redeem_order(&mut self, host: &mut impl Host, caller: Addr, tranche: TrancheId, amount: u128, now: u64) -> Result<()> {
        self.require_member(host, tranche, caller, now)?;
        if amount == 0 {
            return Err(Error::InvalidState);
        }
        if host.tranche_balance(tranche, caller) < amount {
            return Err(Error::InsufficientFunds);
        }
        let epoch = self.coordinator.current_epoch;
        let account = self.account;
        self.tranche_mut(tranche).redeem_order(caller, amount, epoch)?;
        host.transfer_tranche(tranche, caller, account, amount)
    }

    /// Collect whatever settled orders owe the caller. Idempotent.
    pub fn disburse(&mut self, host: &mut impl Host, caller: Addr, tranche: TrancheId) -> Result<Disbursement> {
        let account = self.account;
        self.tranche_mut(tranche).disburse(host, account, caller)
    }
}
