//! # Fixed-Point Position Math
//!
//! Units are stored per share and scaled by the basket's `unit_scale`.
//! Turning a unit into a real token amount is `unit * supply / scale`, and
//! going back is `amount * scale / supply`. Both products can exceed 128
//! bits long before the result does, so every multiply-then-divide goes
//! through a 256-bit intermediate.
//!
//! No floating point anywhere. Rounding direction is always explicit:
//! amounts the basket *receives* round up, amounts it *pays out* round down,
//! so a holder can never extract more than their proportional share.

use primitive_types::U256;

use crate::config::BPS_DENOMINATOR;
use crate::error::LedgerError;

/// Which way to round a non-exact division.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Toward zero.
    Down,
    /// Away from zero.
    Up,
}

/// Computes `a * b / denominator` without intermediate overflow.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidArgument`] for a zero denominator and
/// [`LedgerError::ArithmeticOverflow`] if the quotient does not fit in a
/// `u128`.
pub fn mul_div(a: u128, b: u128, denominator: u128, rounding: Rounding) -> Result<u128, LedgerError> {
    if denominator == 0 {
        return Err(LedgerError::InvalidArgument("division by zero".into()));
    }
    let product = U256::from(a) * U256::from(b);
    let (quotient, remainder) = product.div_mod(U256::from(denominator));
    let quotient = if rounding == Rounding::Up && !remainder.is_zero() {
        quotient + U256::one()
    } else {
        quotient
    };
    if quotient > U256::from(u128::MAX) {
        return Err(LedgerError::ArithmeticOverflow("mul_div"));
    }
    Ok(quotient.as_u128())
}

/// Signed variant of [`mul_div`]; the rounding applies to the magnitude.
pub fn mul_div_signed(
    a: i128,
    b: u128,
    denominator: u128,
    rounding: Rounding,
) -> Result<i128, LedgerError> {
    let magnitude = to_signed(mul_div(a.unsigned_abs(), b, denominator, rounding)?)?;
    Ok(if a < 0 { -magnitude } else { magnitude })
}

/// Real token amount represented by `unit` per share at `supply`, rounded
/// down.
pub fn precise_mul(unit: u128, supply: u128, scale: u128) -> Result<u128, LedgerError> {
    mul_div(unit, supply, scale, Rounding::Down)
}

/// Like [`precise_mul`] but rounded up. Used for amounts a basket must
/// receive.
pub fn precise_mul_ceil(unit: u128, supply: u128, scale: u128) -> Result<u128, LedgerError> {
    mul_div(unit, supply, scale, Rounding::Up)
}

/// Unit per share that `amount` represents at `supply`, rounded down.
pub fn precise_div(amount: u128, supply: u128, scale: u128) -> Result<u128, LedgerError> {
    if supply == 0 {
        return Err(LedgerError::InvalidArgument(
            "cannot derive a unit from zero supply".into(),
        ));
    }
    mul_div(amount, scale, supply, Rounding::Down)
}

/// `amount * bps / 10_000`, rounded down.
pub fn bps_of(amount: u128, bps: u32) -> Result<u128, LedgerError> {
    mul_div(amount, u128::from(bps), BPS_DENOMINATOR, Rounding::Down)
}

/// Integer square root of `a * b`, rounded down.
pub fn sqrt_product(a: u128, b: u128) -> u128 {
    // sqrt of a 256-bit value always fits in 128 bits.
    (U256::from(a) * U256::from(b)).integer_sqrt().low_u128()
}

/// Converts to `i128`, failing instead of wrapping.
pub fn to_signed(value: u128) -> Result<i128, LedgerError> {
    i128::try_from(value).map_err(|_| LedgerError::ArithmeticOverflow("u128 -> i128"))
}

/// Converts a non-negative `i128` to `u128`.
pub fn to_unsigned(value: i128) -> Result<u128, LedgerError> {
    u128::try_from(value).map_err(|_| {
        LedgerError::InvariantViolation(format!("expected a non-negative quantity, got {value}"))
    })
}

/// New default unit after an operation moved tokens in or out of a basket.
///
/// Balance not represented by the previous unit (dust, airdrops) is carved
/// out first, so it is never silently absorbed into the position:
///
/// ```text
/// unaccounted = pre_balance - pre_unit * supply
/// new_unit    = (post_balance - unaccounted) / supply
/// ```
///
/// # Errors
///
/// [`LedgerError::InvariantViolation`] if the basket ends up holding less
/// than the unaccounted remainder, meaning the operation consumed tokens the
/// position never owned.
pub fn default_unit_after_change(
    supply: u128,
    pre_balance: u128,
    post_balance: u128,
    pre_unit: i128,
    scale: u128,
) -> Result<i128, LedgerError> {
    let pre_unit = to_unsigned(pre_unit)?;
    let represented = precise_mul(pre_unit, supply, scale)?;
    let unaccounted = pre_balance.checked_sub(represented).ok_or_else(|| {
        LedgerError::InvariantViolation(format!(
            "position claims {represented} but basket holds {pre_balance}"
        ))
    })?;
    let accounted = post_balance.checked_sub(unaccounted).ok_or_else(|| {
        LedgerError::InvariantViolation(format!(
            "operation consumed {} of unaccounted balance",
            unaccounted - post_balance
        ))
    })?;
    to_signed(precise_div(accounted, supply, scale)?)
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// Serializes a `u128` as a decimal string; accepts either a string or a
/// plain integer when deserializing. JSON consumers lose precision above
/// 2^53 and TOML integers stop at 2^63, so amounts travel as strings.
pub mod u128_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(u64),
    }

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Text(text) => text.trim().parse().map_err(de::Error::custom),
            Repr::Number(n) => Ok(u128::from(n)),
        }
    }
}

/// [`u128_string`] for a list of amounts.
pub mod u128_string_seq {
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    struct Amount(#[serde(with = "super::u128_string")] u128);

    pub fn serialize<S: Serializer>(values: &[u128], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&value.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u128>, D::Error> {
        let amounts = Vec::<Amount>::deserialize(deserializer)?;
        Ok(amounts.into_iter().map(|Amount(value)| value).collect())
    }
}

/// Signed counterpart of [`u128_string`].
pub mod i128_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(i64),
    }

    pub fn serialize<S: Serializer>(value: &i128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i128, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Text(text) => text.trim().parse().map_err(de::Error::custom),
            Repr::Number(n) => Ok(i128::from(n)),
        }
    }
}

/// [`i128_string`] for a list of units.
pub mod i128_string_seq {
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    struct Unit(#[serde(with = "super::i128_string")] i128);

    pub fn serialize<S: Serializer>(values: &[i128], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&value.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<i128>, D::Error> {
        let units = Vec::<Unit>::deserialize(deserializer)?;
        Ok(units.into_iter().map(|Unit(value)| value).collect())
    }
}
