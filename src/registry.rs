//! Loan registry: title issuance and collateral lifecycle.
//!
//! A loan is created when collateral is pledged, carries a status through
//! lock/borrow/repay/unlock, and is destroyed when the collateral is
//! released or seized. The borrower holds only the loan id (title); the
//! record itself is owned by the engine.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::host::CollateralRef;
use crate::ledger::LoanId;
use crate::Addr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoanStatus {
    /// Title issued, collateral still with the borrower.
    Issued,
    /// Collateral in pool custody; borrowing and repayment enabled.
    Locked,
    /// Marked for collection; the normal repayment path is shut.
    Seized,
    /// Terminal.
    Closed,
}

#[derive(Clone, Copy, Debug)]
pub struct Loan {
    pub id: LoanId,
    pub borrower: Addr,
    pub collateral: CollateralRef,
    pub status: LoanStatus,
}

#[derive(Clone, Debug, Default)]
pub struct Registry {
    loans: BTreeMap<LoanId, Loan>,
    by_collateral: BTreeMap<CollateralRef, LoanId>,
    next_id: LoanId,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a title for `collateral` to `borrower`. One open loan per
    /// collateral at a time; ids are never recycled.
    pub fn issue(&mut self, borrower: Addr, collateral: CollateralRef) -> Result<LoanId> {
        if self.by_collateral.contains_key(&collateral) {
            return Err(Error::InvalidState);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.loans.insert(
            id,
            Loan { id, borrower, collateral, status: LoanStatus::Issued },
        );
        self.by_collateral.insert(collateral, id);
        Ok(id)
    }

    pub fn loan(&self, id: LoanId) -> Result<&Loan> {
        self.loans.get(&id).ok_or(Error::NotFound)
    }

    pub fn collateral_of(&self, id: LoanId) -> Result<CollateralRef> {
        Ok(self.loan(id)?.collateral)
    }

    /// Status transitions are driven by the pool's lifecycle operations;
    /// external callers only read.
    pub(crate) fn set_status(&mut self, id: LoanId, status: LoanStatus) -> Result<()> {
        let loan = self.loans.get_mut(&id).ok_or(Error::NotFound)?;
        loan.status = status;
        if status == LoanStatus::Closed {
            self.by_collateral.remove(&loan.collateral);
        }
        Ok(())
    }

    /// Require a specific current status.
    pub fn expect_status(&self, id: LoanId, status: LoanStatus) -> Result<&Loan> {
        let loan = self.loan(id)?;
        if loan.status != status {
            return Err(Error::InvalidState);
        }
        Ok(loan)
    }

    /// Loans with collateral in custody (the NAV universe).
    pub fn active(&self) -> impl Iterator<Item = &Loan> {
        self.loans
            .values()
            .filter(|l| matches!(l.status, LoanStatus::Locked | LoanStatus::Seized))
    }
}
