use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::ValidationError;

/// Fraction digits carried by a published status price.
pub const PRICE_FRACTION_DIGITS: u32 = 2;

/// Format a provider price with exactly two fraction digits.
///
/// Rounding is half-away-from-zero, applied to the shortest decimal string
/// that round-trips the float. `150.505` therefore publishes as `"150.51"`
/// even though its nearest binary value sits slightly below the midpoint.
pub fn format_price(price: f64) -> Result<String, ValidationError> {
    if !price.is_finite() {
        return Err(ValidationError::NonFinitePrice { value: price });
    }

    let shortest = price.to_string();
    let decimal = Decimal::from_str(&shortest)
        .map_err(|_| ValidationError::UnrepresentablePrice { value: price })?;

    let mut rounded = decimal
        .round_dp_with_strategy(PRICE_FRACTION_DIGITS, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(PRICE_FRACTION_DIGITS);
    Ok(rounded.to_string())
}
