//! Epoch coordinator: the settlement state machine.
//!
//! Open -> Closed -> { executed directly | challenge period } -> Executed.
//! Closing an epoch freezes order aggregates and a valuation snapshot, then
//! tries the fulfill-everything solution. If it violates the solvency band
//! or reserve ceiling, a bounded challenge window opens, seeded with a
//! conservative proportional scale-down; anyone may submit a better-scoring
//! valid solution before the window ends. The best known solution executes
//! after the window, so the protocol never deadlocks on an unsolvable epoch.

use bytemuck::{Pod, Zeroable};

use crate::assessor::{self, EpochSnapshot, Solution, ValidationResult};
use crate::error::{Error, Result};
use crate::host::{Host, TrancheId};
use crate::math::{self, RAY};
use crate::pool::Pool;

/// Fixed-layout, append-only audit record of one executed epoch.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct EpochRecord {
    pub nav: u128,
    pub reserve_before: u128,
    pub reserve_after: u128,
    pub senior_asset: u128,
    pub senior_price: u128,
    pub junior_price: u128,
    pub senior_supply_fulfilled: u128,
    pub junior_supply_fulfilled: u128,
    pub senior_redeem_fulfilled: u128,
    pub junior_redeem_fulfilled: u128,
    pub id: u64,
    pub closed_at: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Open,
    /// Closed with constraints violated; accepting solutions until `end`.
    Challenge { end: u64 },
}

/// A closed-but-unexecuted epoch awaiting its challenge window.
#[derive(Clone, Copy, Debug)]
struct PendingEpoch {
    id: u64,
    closed_at: u64,
    snapshot: EpochSnapshot,
    senior_price: u128,
    junior_price: u128,
    best: Solution,
    best_score: u128,
}

#[derive(Clone, Debug)]
pub struct Coordinator {
    /// Id of the epoch currently accepting orders.
    pub current_epoch: u64,
    /// When the open epoch started (last close or genesis).
    pub opened_at: u64,
    pub phase: Phase,
    pending: Option<PendingEpoch>,
    history: Vec<EpochRecord>,
}

impl Coordinator {
    pub fn new(now: u64) -> Self {
        Coordinator {
            current_epoch: 0,
            opened_at: now,
            phase: Phase::Open,
            pending: None,
            history: Vec::new(),
        }
    }

    /// Audit access to an executed epoch. Ids are dense from zero.
    pub fn epoch(&self, id: u64) -> Option<&EpochRecord> {
        self.history.get(id as usize)
    }

    pub fn executed_epochs(&self) -> &[EpochRecord] {
        &self.history
    }

    /// Best known solution during a challenge window.
    pub fn best_solution(&self) -> Option<(Solution, u128)> {
        self.pending.as_ref().map(|p| (p.best, p.best_score))
    }
}

/// Fulfillment ratio of `fulfilled` against `ordered`; a leg with no orders
/// counts as fully fulfilled.
fn fulfillment_ratio(fulfilled: u128, ordered: u128) -> Result<u128> {
    if ordered == 0 {
        Ok(RAY)
    } else {
        math::rdiv(fulfilled, ordered)
    }
}

impl Pool {
    /// Currency a solution would actually move at settlement, truncation
    /// included: (into the reserve, out of the reserve). Settlement applies
    /// the fulfillment ratios to the epoch aggregates, which can round a
    /// leg below its nominal amount, so feasibility is judged on these
    /// amounts and not on the solution's own legs.
    fn settlement_flows(
        &self,
        id: u64,
        senior_price: u128,
        junior_price: u128,
        orders: &Solution,
        solution: &Solution,
    ) -> Result<(u128, u128)> {
        let fs_senior = fulfillment_ratio(solution.senior_supply, orders.senior_supply)?;
        let fr_senior = fulfillment_ratio(solution.senior_redeem, orders.senior_redeem)?;
        let fs_junior = fulfillment_ratio(solution.junior_supply, orders.junior_supply)?;
        let fr_junior = fulfillment_ratio(solution.junior_redeem, orders.junior_redeem)?;
        let s = self.senior.preview(id, senior_price, fs_senior, fr_senior)?;
        let j = self.junior.preview(id, junior_price, fs_junior, fr_junior)?;
        let ins = math::add(s.supply_fulfilled, j.supply_fulfilled)?;
        let outs = math::add(s.redeem_payout, j.redeem_payout)?;
        Ok((ins, outs))
    }

    /// Largest proportional scale-down of the full order book that both
    /// validates and stays payable after settlement truncation.
    /// Fixed-iteration binary search on the RAY factor keeps the result
    /// deterministic across implementations; the zero solution is the
    /// fallback incumbent if nothing validates.
    fn conservative_default(
        &self,
        id: u64,
        snap: &EpochSnapshot,
        senior_price: u128,
        junior_price: u128,
    ) -> Result<(Solution, u128)> {
        let mut best = Solution::default();
        let mut best_score = 0u128;
        let mut lo = 0u128;
        let mut hi = RAY;
        for _ in 0..64 {
            let mid = lo + (hi - lo) / 2;
            let cand = snap.orders.scaled(mid)?;
            let (ins, outs) =
                self.settlement_flows(id, senior_price, junior_price, &snap.orders, &cand)?;
            if assessor::validate(snap, &cand)? == ValidationResult::Valid
                && outs <= math::add(snap.reserve, ins)?
            {
                best = cand;
                best_score = assessor::score(snap, &cand)?;
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Ok((best, best_score))
    }
    /// Close the open epoch. Requires the minimum epoch duration; executes
    /// immediately when the fulfill-everything solution validates (or there
    /// are no orders), otherwise opens the challenge window.
    pub fn close_epoch(&mut self, host: &mut impl Host, caller: crate::Addr, now: u64) -> Result<()> {
        self.wards.auth(caller)?;
        if self.coordinator.phase != Phase::Open {
            return Err(Error::InvalidState);
        }
        if now < self.coordinator.opened_at + self.params.min_epoch_time {
            return Err(Error::InvalidState);
        }

        let id = self.coordinator.current_epoch;
        let nav = self.nav(now)?;
        let reserve = self.reserve.balance();
        self.assessor.drip(now)?;
        let senior_asset = self.assessor.senior_par(now)?;
        let total_assets = math::add(nav, reserve)?;
        let senior_price = self.assessor.senior_token_price(
            total_assets,
            host.tranche_total_supply(TrancheId::Senior),
            now,
        )?;
        let junior_price = self.assessor.junior_token_price(
            total_assets,
            host.tranche_total_supply(TrancheId::Junior),
            now,
        )?;

        let st = self.senior.totals(id);
        let jt = self.junior.totals(id);
        let orders = Solution {
            senior_supply: st.supply,
            junior_supply: jt.supply,
            senior_redeem: math::rmul(st.redeem_tokens, senior_price)?,
            junior_redeem: math::rmul(jt.redeem_tokens, junior_price)?,
        };
        let snapshot = EpochSnapshot {
            nav,
            reserve,
            senior_asset,
            orders,
            min_senior_ratio: self.params.min_senior_ratio,
            max_senior_ratio: self.params.max_senior_ratio,
            max_reserve: self.params.max_reserve,
        };

        // New orders belong to the next epoch from here on.
        self.coordinator.current_epoch = id + 1;
        self.coordinator.opened_at = now;

        let full = orders;
        if orders.is_zero() || assessor::validate(&snapshot, &full)? == ValidationResult::Valid {
            self.execute_solution(host, id, now, now, &snapshot, senior_price, junior_price, &full)
        } else {
            let (best, best_score) =
                self.conservative_default(id, &snapshot, senior_price, junior_price)?;
            self.coordinator.phase = Phase::Challenge { end: now + self.params.challenge_time };
            self.coordinator.pending = Some(PendingEpoch {
                id,
                closed_at: now,
                snapshot,
                senior_price,
                junior_price,
                best,
                best_score,
            });
            Ok(())
        }
    }

    /// Offer a fulfillment for the epoch in challenge. Open to any caller:
    /// the window exists precisely so outside solvers can beat the seeded
    /// default. Rejections change nothing.
    pub fn submit_solution(&mut self, solution: Solution, now: u64) -> Result<u128> {
        let end = match self.coordinator.phase {
            Phase::Challenge { end } => end,
            Phase::Open => return Err(Error::InvalidState),
        };
        if now > end {
            return Err(Error::InvalidState);
        }
        let pending = *self.coordinator.pending.as_ref().ok_or(Error::InvalidState)?;
        let orders = pending.snapshot.orders;
        if solution.senior_supply > orders.senior_supply
            || solution.junior_supply > orders.junior_supply
            || solution.senior_redeem > orders.senior_redeem
            || solution.junior_redeem > orders.junior_redeem
        {
            return Err(Error::InvalidState);
        }
        if let Some(err) = assessor::validate(&pending.snapshot, &solution)?.into_error() {
            return Err(err);
        }
        // An incumbent must stay payable with the amounts settlement will
        // actually move, not the nominal legs, or execution could overdraw
        // the reserve after truncation.
        let (ins, outs) = self.settlement_flows(
            pending.id,
            pending.senior_price,
            pending.junior_price,
            &orders,
            &solution,
        )?;
        if outs > math::add(pending.snapshot.reserve, ins)? {
            return Err(Error::InsufficientFunds);
        }
        let score = assessor::score(&pending.snapshot, &solution)?;
        if score <= pending.best_score {
            return Err(Error::StaleSolution);
        }
        let p = self.coordinator.pending.as_mut().ok_or(Error::InvalidState)?;
        p.best = solution;
        p.best_score = score;
        Ok(score)
    }

    /// Settle the epoch in challenge with the best known solution. Only
    /// after the window end; reopens order flow for the next epoch.
    pub fn execute_epoch(&mut self, host: &mut impl Host, caller: crate::Addr, now: u64) -> Result<()> {
        self.wards.auth(caller)?;
        match self.coordinator.phase {
            Phase::Challenge { end } if now >= end => {}
            _ => return Err(Error::InvalidState),
        }
        // Execute off a copy; the pending epoch is only cleared once the
        // settlement has gone through, so a failure leaves it intact.
        let pending = *self.coordinator.pending.as_ref().ok_or(Error::InvalidState)?;
        self.execute_solution(
            host,
            pending.id,
            pending.closed_at,
            now,
            &pending.snapshot,
            pending.senior_price,
            pending.junior_price,
            &pending.best,
        )?;
        self.coordinator.pending = None;
        self.coordinator.phase = Phase::Open;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn execute_solution(
        &mut self,
        host: &mut impl Host,
        id: u64,
        closed_at: u64,
        now: u64,
        snapshot: &EpochSnapshot,
        senior_price: u128,
        junior_price: u128,
        solution: &Solution,
    ) -> Result<()> {
        let orders = snapshot.orders;
        let fs_senior = fulfillment_ratio(solution.senior_supply, orders.senior_supply)?;
        let fr_senior = fulfillment_ratio(solution.senior_redeem, orders.senior_redeem)?;
        let fs_junior = fulfillment_ratio(solution.junior_supply, orders.junior_supply)?;
        let fr_junior = fulfillment_ratio(solution.junior_redeem, orders.junior_redeem)?;

        let senior = self.senior.preview(id, senior_price, fs_senior, fr_senior)?;
        let junior = self.junior.preview(id, junior_price, fs_junior, fr_junior)?;
        let ins = math::add(senior.supply_fulfilled, junior.supply_fulfilled)?;
        let outs = math::add(senior.redeem_payout, junior.redeem_payout)?;
        // No state changes until the payout is known to be covered; every
        // accepted solution has already passed this check against the
        // smaller close-time reserve.
        if outs > math::add(self.reserve.balance(), ins)? {
            return Err(Error::InsufficientFunds);
        }

        let account = self.account;
        self.senior.settle(host, account, id, &senior)?;
        self.junior.settle(host, account, id, &junior)?;

        // Supplies land before redemptions are paid so the reserve never
        // goes transiently negative.
        self.reserve.deposit(ins)?;
        self.reserve.payout(outs)?;

        self.assessor.adjust_senior(senior.supply_fulfilled, senior.redeem_payout, now)?;

        self.coordinator.history.push(EpochRecord {
            nav: snapshot.nav,
            reserve_before: snapshot.reserve,
            reserve_after: self.reserve.balance(),
            senior_asset: snapshot.senior_asset,
            senior_price,
            junior_price,
            senior_supply_fulfilled: senior.supply_fulfilled,
            junior_supply_fulfilled: junior.supply_fulfilled,
            senior_redeem_fulfilled: senior.redeem_payout,
            junior_redeem_fulfilled: junior.redeem_payout,
            id,
            closed_at,
        });
        Ok(())
    }
}
