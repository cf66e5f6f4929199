//! Error taxonomy.
//!
//! Every rejected operation leaves state untouched; errors are synchronous
//! and non-retryable with the same arguments. The enum is fieldless and
//! `#[repr(u32)]` so hosts can surface stable numeric codes.

use num_derive::{FromPrimitive, ToPrimitive};
use thiserror::Error;

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error, FromPrimitive, ToPrimitive)]
pub enum Error {
    /// Caller lacks the capability for this operation.
    #[error("unauthorized")]
    Unauthorized = 0,

    /// Wrong epoch or loan state for the operation.
    #[error("invalid state")]
    InvalidState = 1,

    /// Draw would exceed the collateral borrowing ceiling.
    #[error("ceiling exceeded")]
    CeilingExceeded = 2,

    /// Not enough currency or tokens to cover the operation.
    #[error("insufficient funds")]
    InsufficientFunds = 3,

    /// Senior ratio band would be breached.
    #[error("senior ratio violation")]
    RatioViolation = 4,

    /// Reserve would exceed its configured ceiling.
    #[error("reserve exceeded")]
    ReserveExceeded = 5,

    /// Caller is not a whitelisted member of the tranche.
    #[error("not whitelisted")]
    NotWhitelisted = 6,

    /// Collection attempted on a loan that has not been seized.
    #[error("not seized")]
    NotSeized = 7,

    /// Submitted solution does not improve on the incumbent.
    #[error("stale solution")]
    StaleSolution = 8,

    /// Arithmetic overflow or division by zero.
    #[error("overflow")]
    Overflow = 9,

    /// Unknown loan, rate class, collateral or order.
    #[error("not found")]
    NotFound = 10,
}

impl Error {
    /// Stable numeric code for host ABIs and audit logs.
    pub fn code(self) -> u32 {
        self as u32
    }
}

pub type Result<T> = core::result::Result<T, Error>;
