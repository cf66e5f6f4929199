//! Fixed-point arithmetic on u128.
//!
//! Currency amounts are scaled by 10^18 (WAD), rates and accrual indexes by
//! 10^27 (RAY). Every division truncates toward zero, so rounding residue
//! always stays with the pool rather than with any one account. All
//! intermediate products go through a 256-bit wide multiply so RAY-scale
//! values can be multiplied without overflow.

use crate::error::{Error, Result};

/// 10^18, scale of currency amounts.
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// 10^27, scale of rates and accrual indexes.
pub const RAY: u128 = 1_000_000_000_000_000_000_000_000_000;

const MASK64: u128 = 0xffff_ffff_ffff_ffff;

#[inline]
pub fn add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or(Error::Overflow)
}

#[inline]
pub fn sub(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b).ok_or(Error::Overflow)
}

/// Full 256-bit product of two u128 values as (hi, lo).
#[inline]
fn full_mul(a: u128, b: u128) -> (u128, u128) {
    let (a_hi, a_lo) = (a >> 64, a & MASK64);
    let (b_hi, b_lo) = (b >> 64, b & MASK64);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    // Middle limbs can carry past 2^128; fold the carry into the high word.
    let (mid, mid_carry) = lh.overflowing_add(hl);
    let (lo, lo_carry) = ll.overflowing_add(mid << 64);
    let hi = hh + (mid >> 64) + ((mid_carry as u128) << 64) + (lo_carry as u128);

    (hi, lo)
}

/// floor(a * b / den) with a 256-bit intermediate.
///
/// Restoring bit-by-bit division: deterministic on every target, no float,
/// no platform intrinsics. Errors if den == 0 or the quotient exceeds u128.
pub fn mul_div(a: u128, b: u128, den: u128) -> Result<u128> {
    if den == 0 {
        return Err(Error::Overflow);
    }
    let (hi, lo) = full_mul(a, b);
    if hi == 0 {
        return Ok(lo / den);
    }
    if hi >= den {
        // Quotient would need more than 128 bits.
        return Err(Error::Overflow);
    }
    let mut rem = hi;
    let mut quot: u128 = 0;
    for i in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> i) & 1);
        if carry != 0 || rem >= den {
            rem = rem.wrapping_sub(den);
            quot |= 1 << i;
        }
    }
    Ok(quot)
}

/// floor(x * y / RAY): multiply a quantity by a RAY-scaled factor.
#[inline]
pub fn rmul(x: u128, y: u128) -> Result<u128> {
    mul_div(x, y, RAY)
}

/// floor(x * RAY / y): divide two like-scaled quantities into a RAY ratio.
#[inline]
pub fn rdiv(x: u128, y: u128) -> Result<u128> {
    mul_div(x, RAY, y)
}

/// x^n in RAY by binary exponentiation, truncating at every step.
///
/// Used for closed-form interest compounding over `n` seconds. Truncation
/// error is bounded by one RAY unit per multiply, at most 2*log2(n) steps,
/// which keeps split-interval accrual within rounding of whole-interval
/// accrual.
pub fn rpow(x: u128, n: u64) -> Result<u128> {
    if n == 0 {
        return Ok(RAY);
    }
    let mut x = x;
    let mut n = n;
    let mut z = if n % 2 != 0 { x } else { RAY };
    n /= 2;
    while n != 0 {
        x = rmul(x, x)?;
        if n % 2 != 0 {
            z = rmul(z, x)?;
        }
        n /= 2;
    }
    Ok(z)
}
