use cadence_core::Money;

const BASIS_POINTS: i128 = 10_000;

/// Tax on `price` at `rate_bp` basis points, rounded half away from zero to the
/// minor unit. Saturates at the `Money` range.
pub fn compute_tax(price: Money, rate_bp: u32) -> Money {
    let raw = i128::from(price.minor()) * i128::from(rate_bp);
    let rounded = (raw.abs() + BASIS_POINTS / 2) / BASIS_POINTS;
    let signed = if raw < 0 { -rounded } else { rounded };
    let minor = i64::try_from(signed).unwrap_or(if signed < 0 { i64::MIN } else { i64::MAX });
    Money::from_minor(minor)
}
