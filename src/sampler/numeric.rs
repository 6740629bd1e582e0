//! Fixed-point descaling and ray math
//!
//! Chain values are integers with implied decimals: rates and indices are
//! ray (27 decimals), oracle prices have 8, token amounts use the reserve's
//! own decimals. Conversions here are exact; the only rounding is the
//! half-up rounding Aave itself applies in `ray_mul` / `ray_div`.

use alloy_primitives::{uint, U256};
use rust_decimal::Decimal;

use crate::error::{Result, SnapshotError};

pub const RAY_DECIMALS: u32 = 27;
pub const ORACLE_DECIMALS: u32 = 8;

pub const RAY: U256 = uint!(1000000000000000000000000000_U256);
pub const HALF_RAY: U256 = uint!(500000000000000000000000000_U256);

pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

/// Largest mantissa a `Decimal` can hold (2^96 - 1).
const MAX_MANTISSA: u128 = (1u128 << 96) - 1;

fn pow10(exp: u32) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

/// Exact `raw / 10^decimals`. Fails instead of rounding.
fn descale_exact(raw: U256, decimals: u32, what: &'static str) -> Result<Decimal> {
    let mantissa = u128::try_from(raw).map_err(|_| SnapshotError::NumericOverflow(what))?;
    if mantissa > MAX_MANTISSA {
        return Err(SnapshotError::NumericOverflow(what));
    }
    Decimal::try_from_i128_with_scale(mantissa as i128, decimals)
        .map_err(|_| SnapshotError::NumericOverflow(what))
}

/// Ray-scaled integer to decimal (divide by 10^27).
pub fn ray_to_decimal(raw: U256) -> Result<Decimal> {
    descale_exact(raw, RAY_DECIMALS, "descaling a ray value")
}

/// Oracle price (8 decimals) to decimal USD.
pub fn price_to_decimal(raw: U256) -> Result<Decimal> {
    descale_exact(raw, ORACLE_DECIMALS, "descaling an oracle price")
}

/// Decimal back to a ray integer, rounding half up past 27 decimals.
pub fn decimal_to_ray(value: Decimal) -> Result<U256> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(SnapshotError::NumericOverflow("scaling a negative value to ray"));
    }
    let mantissa = U256::from(value.mantissa().unsigned_abs());
    let scale = value.scale();
    if scale <= RAY_DECIMALS {
        Ok(mantissa * pow10(RAY_DECIMALS - scale))
    } else {
        let divisor = pow10(scale - RAY_DECIMALS);
        Ok((mantissa + divisor / U256::from(2)) / divisor)
    }
}

/// Token amount in whole tokens. Amounts wider than a `Decimal` mantissa
/// drop their least significant digits (truncation) rather than failing.
pub fn descale_amount(raw: U256, decimals: u8) -> Result<Decimal> {
    let mut raw = raw;
    let mut scale = u32::from(decimals);
    let max = U256::from(MAX_MANTISSA);
    while raw > max && scale > 0 {
        raw /= U256::from(10u64);
        scale -= 1;
    }
    descale_exact(raw, scale, "descaling a token amount")
}

/// USD value of a raw token amount at a descaled oracle price.
pub fn usd_value(raw: U256, decimals: u8, price: Decimal) -> Result<Decimal> {
    descale_amount(raw, decimals)?
        .checked_mul(price)
        .ok_or(SnapshotError::NumericOverflow("computing a USD value"))
}

/// `a * b / RAY`, rounded half up.
pub fn ray_mul(a: U256, b: U256) -> Result<U256> {
    a.checked_mul(b)
        .and_then(|p| p.checked_add(HALF_RAY))
        .map(|p| p / RAY)
        .ok_or(SnapshotError::NumericOverflow("ray multiplication"))
}

/// `a * RAY / b`, rounded half up.
pub fn ray_div(a: U256, b: U256) -> Result<U256> {
    if b.is_zero() {
        return Err(SnapshotError::NumericOverflow("ray division by zero"));
    }
    a.checked_mul(RAY)
        .and_then(|p| p.checked_add(b / U256::from(2)))
        .map(|p| p / b)
        .ok_or(SnapshotError::NumericOverflow("ray division"))
}

/// Aave's three-term binomial approximation of `(1 + rate/year)^elapsed`,
/// matching `MathUtils.calculateCompoundedInterest` bit for bit.
pub fn compounded_interest(rate: U256, last_update: u64, now: u64) -> Result<U256> {
    if now <= last_update {
        return Ok(RAY);
    }
    let exp = U256::from(now - last_update);
    let exp_minus_one = exp - U256::from(1);
    let exp_minus_two = if exp > U256::from(2) { exp - U256::from(2) } else { U256::ZERO };

    let year = U256::from(SECONDS_PER_YEAR);
    let base_power_two = ray_mul(rate, rate)? / (year * year);
    let base_power_three = ray_mul(base_power_two, rate)? / year;

    let second_term = exp * exp_minus_one * base_power_two / U256::from(2);
    let third_term = exp * exp_minus_one * exp_minus_two * base_power_three / U256::from(6);

    Ok(RAY + rate * exp / year + second_term + third_term)
}

/// Borrow index accrued from its last on-chain update to `now`.
pub fn normalized_debt(index: U256, rate: U256, last_update: u64, now: u64) -> Result<U256> {
    if now <= last_update {
        return Ok(index);
    }
    ray_mul(compounded_interest(rate, last_update, now)?, index)
}

/// `numerator / denominator` as a decimal ratio, zero when the denominator is.
pub fn ratio(numerator: U256, denominator: U256) -> Result<Decimal> {
    if denominator.is_zero() {
        return Ok(Decimal::ZERO);
    }
    ray_to_decimal(ray_div(numerator, denominator)?)
}
