//! External collaborators behind one pluggable trait.
//!
//! Currency, tranche tokens, collateral custody and whitelist membership are
//! owned by the host environment, not by the engine. The engine only ever
//! talks to them through [`Host`], so the settlement and accrual logic stays
//! deterministic and host-agnostic. [`MemoryHost`] is a plain in-memory
//! implementation used by the test and fuzz harnesses.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::Addr;

/// Senior or junior investor pool.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrancheId {
    Senior = 0,
    Junior = 1,
}

/// A pledged non-fungible asset: issuing registry plus token id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CollateralRef {
    pub registry: Addr,
    pub id: u64,
}

pub trait Host {
    // Settlement currency.
    fn transfer_currency(&mut self, from: Addr, to: Addr, amount: u128) -> Result<()>;
    fn currency_balance(&self, addr: Addr) -> u128;

    // Tranche token issuance.
    fn mint_tranche(&mut self, tranche: TrancheId, to: Addr, amount: u128) -> Result<()>;
    fn burn_tranche(&mut self, tranche: TrancheId, from: Addr, amount: u128) -> Result<()>;
    fn transfer_tranche(
        &mut self,
        tranche: TrancheId,
        from: Addr,
        to: Addr,
        amount: u128,
    ) -> Result<()>;
    fn tranche_total_supply(&self, tranche: TrancheId) -> u128;
    fn tranche_balance(&self, tranche: TrancheId, addr: Addr) -> u128;

    // Collateral custody.
    fn transfer_collateral(&mut self, collateral: CollateralRef, from: Addr, to: Addr)
        -> Result<()>;
    fn collateral_owner(&self, collateral: CollateralRef) -> Option<Addr>;

    // Whitelist membership, per tranche, with an expiry timestamp.
    fn membership_valid_until(&self, tranche: TrancheId, addr: Addr) -> Option<u64>;
}

/// In-memory host: plain balance maps, no signatures, no allowances.
#[derive(Clone, Debug, Default)]
pub struct MemoryHost {
    currency: BTreeMap<Addr, u128>,
    tranche_tokens: [BTreeMap<Addr, u128>; 2],
    tranche_supply: [u128; 2],
    collateral: BTreeMap<CollateralRef, Addr>,
    members: [BTreeMap<Addr, u64>; 2],
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit settlement currency out of thin air (test setup).
    pub fn mint_currency(&mut self, to: Addr, amount: u128) {
        let bal = self.currency.entry(to).or_insert(0);
        *bal = bal.saturating_add(amount);
    }

    /// Create a collateral token owned by `owner` (test setup).
    pub fn issue_collateral(&mut self, collateral: CollateralRef, owner: Addr) {
        self.collateral.insert(collateral, owner);
    }

    /// Whitelist `addr` on `tranche` until `valid_until`.
    pub fn update_member(&mut self, tranche: TrancheId, addr: Addr, valid_until: u64) {
        self.members[tranche as usize].insert(addr, valid_until);
    }

    /// Total currency across all holders, for conservation checks.
    pub fn total_currency(&self) -> u128 {
        self.currency.values().fold(0u128, |acc, v| acc.saturating_add(*v))
    }
}

impl Host for MemoryHost {
    fn transfer_currency(&mut self, from: Addr, to: Addr, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let src = self.currency.get(&from).copied().unwrap_or(0);
        if src < amount {
            return Err(Error::InsufficientFunds);
        }
        self.currency.insert(from, src - amount);
        let dst = self.currency.entry(to).or_insert(0);
        *dst = dst.checked_add(amount).ok_or(Error::Overflow)?;
        Ok(())
    }

    fn currency_balance(&self, addr: Addr) -> u128 {
        self.currency.get(&addr).copied().unwrap_or(0)
    }

    fn mint_tranche(&mut self, tranche: TrancheId, to: Addr, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let t = tranche as usize;
        self.tranche_supply[t] = self.tranche_supply[t].checked_add(amount).ok_or(Error::Overflow)?;
        let bal = self.tranche_tokens[t].entry(to).or_insert(0);
        *bal = bal.checked_add(amount).ok_or(Error::Overflow)?;
        Ok(())
    }

    fn burn_tranche(&mut self, tranche: TrancheId, from: Addr, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let t = tranche as usize;
        let bal = self.tranche_tokens[t].get(&from).copied().unwrap_or(0);
        if bal < amount {
            return Err(Error::InsufficientFunds);
        }
        self.tranche_tokens[t].insert(from, bal - amount);
        self.tranche_supply[t] -= amount;
        Ok(())
    }

    fn transfer_tranche(
        &mut self,
        tranche: TrancheId,
        from: Addr,
        to: Addr,
        amount: u128,
    ) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let t = tranche as usize;
        let src = self.tranche_tokens[t].get(&from).copied().unwrap_or(0);
        if src < amount {
            return Err(Error::InsufficientFunds);
        }
        self.tranche_tokens[t].insert(from, src - amount);
        let dst = self.tranche_tokens[t].entry(to).or_insert(0);
        *dst = dst.checked_add(amount).ok_or(Error::Overflow)?;
        Ok(())
    }

    fn tranche_total_supply(&self, tranche: TrancheId) -> u128 {
        self.tranche_supply[tranche as usize]
    }

    fn tranche_balance(&self, tranche: TrancheId, addr: Addr) -> u128 {
        self.tranche_tokens[tranche as usize].get(&addr).copied().unwrap_or(0)
    }

    fn transfer_collateral(
        &mut self,
        collateral: CollateralRef,
        from: Addr,
        to: Addr,
    ) -> Result<()> {
        match self.collateral.get(&collateral) {
            Some(owner) if *owner == from => {
                self.collateral.insert(collateral, to);
                Ok(())
            }
            Some(_) => Err(Error::Unauthorized),
            None => Err(Error::NotFound),
        }
    }

    fn collateral_owner(&self, collateral: CollateralRef) -> Option<Addr> {
        self.collateral.get(&collateral).copied()
    }

    fn membership_valid_until(&self, tranche: TrancheId, addr: Addr) -> Option<u64> {
        self.members[tranche as usize].get(&addr).copied()
    }
}
