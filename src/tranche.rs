//! Tranche order book.
//!
//! Orders accumulate against the open epoch and are settled in aggregate
//! once the coordinator resolves the epoch: every order of the same kind in
//! an epoch gets the same RAY fulfillment ratio, so there is no first-mover
//! advantage inside a window. Settlement mints/burns tokens in aggregate at
//! the epoch price; `disburse` later pays each owner their proportional
//! share plus the unfulfilled remainder. Per-order truncation dust stays in
//! the pool account.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::host::{Host, TrancheId};
use crate::math;
use crate::Addr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fulfillment {
    Unfulfilled,
    PartiallyFulfilled,
    Fulfilled,
}

/// One owner's pending order: supply currency in, redeem tokens in, both
/// tagged with the epoch they were placed in. Immutable until the
/// coordinator settles that epoch.
#[derive(Clone, Copy, Debug)]
pub struct Order {
    pub epoch: u64,
    pub supply: u128,
    pub redeem: u128,
}

/// Aggregates of one epoch's order queue.
#[derive(Clone, Copy, Debug, Default)]
pub struct EpochTotals {
    /// Currency queued for supply.
    pub supply: u128,
    /// Tranche tokens queued for redemption.
    pub redeem_tokens: u128,
}

/// Settlement outcome snapshot for one epoch, the basis for disbursement.
#[derive(Clone, Copy, Debug)]
pub struct SettledEpoch {
    /// Token price at epoch close, RAY.
    pub token_price: u128,
    /// Supply fulfillment ratio, RAY.
    pub supply_fulfillment: u128,
    /// Redeem fulfillment ratio, RAY.
    pub redeem_fulfillment: u128,
}

/// Exact amounts one epoch settlement will move. Computed by
/// [`Tranche::preview`] ahead of any mutation so the coordinator can check
/// that the reserve covers the payout before committing anything.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Settlement {
    /// Token price at epoch close, RAY.
    pub token_price: u128,
    /// Supply fulfillment ratio, RAY.
    pub supply_fulfillment: u128,
    /// Redeem fulfillment ratio, RAY.
    pub redeem_fulfillment: u128,
    /// Currency leaving tranche custody for the reserve.
    pub supply_fulfilled: u128,
    /// Tokens minted against the fulfilled supply.
    pub minted: u128,
    /// Tokens burned out of custody.
    pub tokens_burned: u128,
    /// Currency owed out of the reserve.
    pub redeem_payout: u128,
}

/// What a disbursement handed out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Disbursement {
    pub currency: u128,
    pub tokens: u128,
    pub state: Option<Fulfillment>,
}

#[derive(Clone, Debug)]
pub struct Tranche {
    pub id: TrancheId,
    orders: BTreeMap<Addr, Order>,
    totals: BTreeMap<u64, EpochTotals>,
    settled: BTreeMap<u64, SettledEpoch>,
    /// Currency held for this tranche in the pool account: queued supply,
    /// refunds and redemption payouts not yet disbursed.
    pub currency_held: u128,
    /// Tokens held for this tranche in the pool account: locked redeem
    /// orders and minted-but-undisbursed supply proceeds.
    pub tokens_held: u128,
}

impl Tranche {
    pub fn new(id: TrancheId) -> Self {
        Tranche {
            id,
            orders: BTreeMap::new(),
            totals: BTreeMap::new(),
            settled: BTreeMap::new(),
            currency_held: 0,
            tokens_held: 0,
        }
    }

    pub fn order(&self, owner: Addr) -> Option<&Order> {
        self.orders.get(&owner)
    }

    pub fn totals(&self, epoch: u64) -> EpochTotals {
        self.totals.get(&epoch).copied().unwrap_or_default()
    }

    pub fn settled_epoch(&self, epoch: u64) -> Option<&SettledEpoch> {
        self.settled.get(&epoch)
    }

    /// Queue `amount` currency for supply into the open epoch. The caller
    /// has already moved the currency into the pool account.
    pub fn supply_order(&mut self, owner: Addr, amount: u128, epoch: u64) -> Result<()> {
        self.place(owner, amount, 0, epoch)
    }

    /// Queue `amount` tranche tokens for redemption in the open epoch.
    pub fn redeem_order(&mut self, owner: Addr, amount: u128, epoch: u64) -> Result<()> {
        self.place(owner, 0, amount, epoch)
    }

    fn place(&mut self, owner: Addr, supply: u128, redeem: u128, epoch: u64) -> Result<()> {
        match self.orders.get_mut(&owner) {
            None => {
                self.orders.insert(owner, Order { epoch, supply, redeem });
            }
            Some(existing) if existing.epoch == epoch => {
                // Same window: one supply and one redeem leg per owner.
                if (supply > 0 && existing.supply > 0) || (redeem > 0 && existing.redeem > 0) {
                    return Err(Error::InvalidState);
                }
                existing.supply = math::add(existing.supply, supply)?;
                existing.redeem = math::add(existing.redeem, redeem)?;
            }
            // A stale order must be disbursed before a new one is placed.
            Some(_) => return Err(Error::InvalidState),
        }
        let t = self.totals.entry(epoch).or_default();
        t.supply = math::add(t.supply, supply)?;
        t.redeem_tokens = math::add(t.redeem_tokens, redeem)?;
        if supply > 0 {
            self.currency_held = math::add(self.currency_held, supply)?;
        }
        if redeem > 0 {
            self.tokens_held = math::add(self.tokens_held, redeem)?;
        }
        Ok(())
    }

    /// Compute exactly what settling `epoch` at these ratios would move.
    /// Pure; the coordinator checks feasibility on these amounts before
    /// anything is mutated, and then applies precisely them via [`settle`].
    ///
    /// A zero token price makes the supply leg unfulfillable: no token
    /// amount prices the proceeds, so the currency stays in custody for a
    /// refund at disbursement.
    ///
    /// [`settle`]: Tranche::settle
    pub fn preview(
        &self,
        epoch: u64,
        token_price: u128,
        supply_fulfillment: u128,
        redeem_fulfillment: u128,
    ) -> Result<Settlement> {
        let totals = self.totals.get(&epoch).copied().unwrap_or_default();
        let (supply_fulfillment, supply_fulfilled, minted) = if token_price == 0 {
            (0, 0, 0)
        } else {
            let fulfilled = math::rmul(totals.supply, supply_fulfillment)?;
            let minted = math::mul_div(fulfilled, math::RAY, token_price)?;
            (supply_fulfillment, fulfilled, minted)
        };
        let tokens_burned = math::rmul(totals.redeem_tokens, redeem_fulfillment)?;
        let redeem_payout = math::rmul(tokens_burned, token_price)?;
        Ok(Settlement {
            token_price,
            supply_fulfillment,
            redeem_fulfillment,
            supply_fulfilled,
            minted,
            tokens_burned,
            redeem_payout,
        })
    }

    /// Apply a previewed settlement to epoch `epoch`: mint the aggregate
    /// supply proceeds into the pool account, burn the aggregate redeemed
    /// tokens out of it. Coordinator-only; called exactly once per closed
    /// epoch.
    pub fn settle(
        &mut self,
        host: &mut impl Host,
        pool_account: Addr,
        epoch: u64,
        s: &Settlement,
    ) -> Result<()> {
        if self.settled.contains_key(&epoch) {
            return Err(Error::InvalidState);
        }
        host.mint_tranche(self.id, pool_account, s.minted)?;
        host.burn_tranche(self.id, pool_account, s.tokens_burned)?;

        // Fulfilled supply leaves tranche custody for the reserve; the
        // redemption payout arrives from the reserve.
        self.currency_held = self.currency_held.saturating_sub(s.supply_fulfilled);
        self.currency_held = math::add(self.currency_held, s.redeem_payout)?;
        self.tokens_held = math::add(self.tokens_held, s.minted)?;
        self.tokens_held = self.tokens_held.saturating_sub(s.tokens_burned);

        self.settled.insert(
            epoch,
            SettledEpoch {
                token_price: s.token_price,
                supply_fulfillment: s.supply_fulfillment,
                redeem_fulfillment: s.redeem_fulfillment,
            },
        );
        Ok(())
    }

    /// Pay out whatever a settled order owes its owner: minted tokens and
    /// redemption currency for the fulfilled part, refunds for the rest.
    /// Idempotent; owners with nothing owed get a zero disbursement.
    pub fn disburse(&mut self, host: &mut impl Host, pool_account: Addr, owner: Addr) -> Result<Disbursement> {
        let order = match self.orders.get(&owner) {
            Some(o) => *o,
            None => return Ok(Disbursement::default()),
        };
        let ep = match self.settled.get(&order.epoch) {
            Some(e) => *e,
            // Epoch not resolved yet; nothing owed.
            None => return Ok(Disbursement::default()),
        };

        let supply_fulfilled = math::rmul(order.supply, ep.supply_fulfillment)?;
        let tokens_out = if ep.token_price > 0 {
            math::mul_div(supply_fulfilled, math::RAY, ep.token_price)?
        } else {
            0
        };
        let supply_refund = order.supply - supply_fulfilled;

        let tokens_burned = math::rmul(order.redeem, ep.redeem_fulfillment)?;
        let redeem_payout = math::rmul(tokens_burned, ep.token_price)?;
        let token_refund = order.redeem - tokens_burned;

        // Aggregate settlement truncated independently of the per-order
        // shares; cap at what the tranche actually holds so dust can only
        // accumulate to the pool, never be paid out of someone else's share.
        let currency = math::add(supply_refund, redeem_payout)?.min(self.currency_held);
        let tokens = math::add(tokens_out, token_refund)?.min(self.tokens_held);

        host.transfer_currency(pool_account, owner, currency)?;
        host.transfer_tranche(self.id, pool_account, owner, tokens)?;
        self.currency_held -= currency;
        self.tokens_held -= tokens;
        self.orders.remove(&owner);

        // Judge only the legs this order actually has.
        let full = (order.supply == 0 || supply_fulfilled == order.supply)
            && (order.redeem == 0 || tokens_burned == order.redeem);
        let none = supply_fulfilled == 0 && tokens_burned == 0 && (order.supply > 0 || order.redeem > 0);
        let state = if full {
            Fulfillment::Fulfilled
        } else if none {
            Fulfillment::Unfulfilled
        } else {
            Fulfillment::PartiallyFulfilled
        };
        Ok(Disbursement { currency, tokens, state: Some(state) })
    }
}
