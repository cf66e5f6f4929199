//! Epoch settlement and debt accrual engine for a two-tranche,
//! asset-backed lending pool.
//!
//! Borrowers pledge non-fungible collateral and draw credit against an
//! appraised ceiling; senior and junior investors fund a shared reserve
//! whose inflows and outflows are netted once per epoch. The engine
//! guarantees:
//!
//! 1. O(1) interest accrual: one shared compounding index per rate class,
//!    advanced lazily in closed form, never by iterating elapsed periods.
//! 2. Deterministic fixed-point arithmetic (10^18 currency, 10^27 rates)
//!    with truncating division; rounding residue accrues to the pool and is
//!    bounded per operation.
//! 3. Fair settlement: every order of a kind within an epoch receives the
//!    same fulfillment ratio, so ordering inside a window carries no edge.
//! 4. Solvency: executed epochs respect the senior ratio band and reserve
//!    ceiling, or settle on the best constraint-satisfying solution found
//!    during a bounded challenge window.
//! 5. Liveness: an epoch that cannot be fully fulfilled still executes its
//!    conservative default; the state machine never deadlocks.
//!
//! The engine is a single-threaded, sequentially consistent state machine:
//! every operation is an atomic step taking an explicit `now` timestamp, and
//! all token, currency, collateral and membership mechanics live behind the
//! [`host::Host`] trait.

#![forbid(unsafe_code)]

pub mod assessor;
pub mod auth;
pub mod collector;
pub mod coordinator;
pub mod error;
pub mod feed;
pub mod host;
pub mod ledger;
pub mod math;
pub mod pool;
pub mod registry;
pub mod reserve;
pub mod tranche;

/// Opaque actor id. The engine never interprets addresses; the host maps
/// them to whatever identity scheme it uses.
pub type Addr = u64;

pub use assessor::{Assessor, EpochSnapshot, Solution, ValidationResult};
pub use coordinator::{Coordinator, EpochRecord, Phase};
pub use error::{Error, Result};
pub use feed::{Feed, RiskClass, WriteDownPolicy};
pub use host::{CollateralRef, Host, MemoryHost, TrancheId};
pub use ledger::{Ledger, LoanId, RateClassId};
pub use pool::{Param, Pool, PoolParams};
pub use registry::{LoanStatus, Registry};
pub use tranche::{Disbursement, Fulfillment, Order, Settlement, Tranche};
