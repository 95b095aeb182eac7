//! Constant-product output math with a basis-point fee.

use {
    super::BPS,
    alloy::primitives::{U256, U512},
};

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("pair reserves must be positive")]
    InvalidReserves,
    #[error("fee must lie in [0, 10000) basis points")]
    InvalidFee,
}

/// `out = in·(BPS−fee)·r_out / (r_in·BPS + in·(BPS−fee))` under floor
/// division. The intermediate products are widened so arbitrary `U256`
/// inputs cannot overflow; the quotient is bounded by `reserve_out`.
pub fn amount_out(
    amount_in: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee_bps: u32,
) -> Result<U256, Error> {
    if fee_bps >= BPS {
        return Err(Error::InvalidFee);
    }
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(Error::InvalidReserves);
    }
    if amount_in.is_zero() {
        return Ok(U256::ZERO);
    }
    let effective = U512::from(amount_in) * U512::from(BPS - fee_bps);
    let numerator = effective * U512::from(reserve_out);
    let denominator = U512::from(reserve_in) * U512::from(BPS) + effective;
    // The quotient is bounded by `reserve_out`, so narrowing cannot truncate.
    Ok(U256::from(numerator / denominator))
}
