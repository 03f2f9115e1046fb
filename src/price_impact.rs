//! Imbalance-based price impact.
//!
//! Impact is the change in a cost curve over the imbalance between two USD
//! values: the two pooled legs for deposits, long vs short open interest for
//! positions. Shrinking the imbalance earns positive impact, growing it costs
//! negative impact. Positive impact is a payout, so it is capped by what the
//! impact pool holds; negative impact is always collectible.
//!
//! All functions here are total: degenerate inputs produce zero, never an error.

use crate::config::ImpactParams;
use crate::types::{round_down, round_up, Price};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};

/// USD values of the two sides an impact is measured over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImbalanceInput {
    pub long_usd: Decimal,
    pub short_usd: Decimal,
    pub long_delta_usd: Decimal,
    pub short_delta_usd: Decimal,
}

impl ImbalanceInput {
    pub fn new(long_usd: Decimal, short_usd: Decimal, long_delta_usd: Decimal, short_delta_usd: Decimal) -> Self {
        Self {
            long_usd,
            short_usd,
            long_delta_usd,
            short_delta_usd,
        }
    }

    fn next_long(&self) -> Decimal {
        (self.long_usd + self.long_delta_usd).max(Decimal::ZERO)
    }

    fn next_short(&self) -> Decimal {
        (self.short_usd + self.short_delta_usd).max(Decimal::ZERO)
    }
}

/// Raw signed USD impact of moving both sides by their deltas.
pub fn imbalance_impact_usd(input: &ImbalanceInput, params: &ImpactParams) -> Decimal {
    // an empty book has no imbalance to measure against
    if (input.long_usd + input.short_usd).is_zero() {
        return Decimal::ZERO;
    }

    let initial_diff = (input.long_usd - input.short_usd).abs();
    let next_long = input.next_long();
    let next_short = input.next_short();
    let next_diff = (next_long - next_short).abs();

    let same_side = (input.long_usd <= input.short_usd) == (next_long <= next_short);

    let (initial_factor, next_factor) = if !same_side {
        // crossover: the old imbalance is removed at the positive rate,
        // the new opposite imbalance is charged at the negative rate
        (params.positive_factor, params.negative_factor)
    } else if next_diff < initial_diff {
        (params.positive_factor, params.positive_factor)
    } else {
        (params.negative_factor, params.negative_factor)
    };

    let initial = checked_impact_factor(initial_diff, initial_factor, params.exponent);
    let next = checked_impact_factor(next_diff, next_factor, params.exponent);
    match (initial, next) {
        // both terms are non-negative, the difference cannot overflow
        (Some(initial), Some(next)) => initial - next,
        (None, Some(_)) => Decimal::MAX,
        (Some(_), None) => Decimal::MIN,
        (None, None) if next_diff >= initial_diff => Decimal::MIN,
        (None, None) => Decimal::MAX,
    }
}

/// factor * diff^exponent. saturates instead of overflowing.
pub fn apply_impact_factor(diff: Decimal, factor: Decimal, exponent: Decimal) -> Decimal {
    checked_impact_factor(diff, factor, exponent).unwrap_or(Decimal::MAX)
}

/// factor * diff^exponent, or None when the result does not fit a Decimal.
///
/// The factor goes in first and the whole powers of diff are multiplied on one
/// at a time, so a small factor keeps a large diff in range.
pub fn checked_impact_factor(diff: Decimal, factor: Decimal, exponent: Decimal) -> Option<Decimal> {
    if diff.is_zero() || factor.is_zero() {
        return Some(Decimal::ZERO);
    }
    let whole = exponent.trunc();
    let fraction = exponent - whole;
    let mut value = if fraction.is_zero() {
        factor
    } else {
        factor.checked_mul(diff.checked_powd(fraction)?)?
    };
    for _ in 0..whole.to_u32()? {
        value = value.checked_mul(diff)?;
    }
    Some(value)
}

/// Impact of a paired deposit: both legs are added to the pool at once.
pub fn swap_impact_usd(
    long_pool_usd: Decimal,
    short_pool_usd: Decimal,
    long_delta_usd: Decimal,
    short_delta_usd: Decimal,
    params: &ImpactParams,
) -> Decimal {
    let input = ImbalanceInput::new(long_pool_usd, short_pool_usd, long_delta_usd, short_delta_usd);
    round_impact(imbalance_impact_usd(&input, params))
}

/// Impact of a position size change on one side's open interest.
pub fn position_impact_usd(
    long_open_interest: Decimal,
    short_open_interest: Decimal,
    is_long: bool,
    size_delta_usd: Decimal,
    params: &ImpactParams,
) -> Decimal {
    let (long_delta, short_delta) = if is_long {
        (size_delta_usd, Decimal::ZERO)
    } else {
        (Decimal::ZERO, size_delta_usd)
    };
    let input = ImbalanceInput::new(long_open_interest, short_open_interest, long_delta, short_delta);
    round_impact(imbalance_impact_usd(&input, params))
}

// payouts round down, charges round away from zero
fn round_impact(impact: Decimal) -> Decimal {
    if impact > Decimal::ZERO {
        round_down(impact)
    } else {
        -round_up(-impact)
    }
}

/// Impact after applying the impact-pool cap, in USD and in impact-pool tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CappedImpact {
    pub impact_usd: Decimal,
    /// signed change of the impact pool: negative = drawn out, positive = paid in
    pub impact_pool_delta: Decimal,
}

impl CappedImpact {
    pub fn none() -> Self {
        Self {
            impact_usd: Decimal::ZERO,
            impact_pool_delta: Decimal::ZERO,
        }
    }
}

/// Caps a positive impact at the impact pool balance. Negative impact passes
/// through unchanged and is converted to the tokens it adds to the pool.
pub fn cap_impact(impact_usd: Decimal, impact_pool_amount: Decimal, price: Price) -> CappedImpact {
    if impact_usd > Decimal::ZERO {
        let wanted = price.tokens_down(impact_usd);
        let drawn = wanted.min(impact_pool_amount.max(Decimal::ZERO));
        let impact_usd = if drawn < wanted {
            round_down(price.usd_value(drawn))
        } else {
            impact_usd
        };
        CappedImpact {
            impact_usd,
            impact_pool_delta: -drawn,
        }
    } else if impact_usd < Decimal::ZERO {
        CappedImpact {
            impact_usd,
            impact_pool_delta: price.tokens_up(-impact_usd),
        }
    } else {
        CappedImpact::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params() -> ImpactParams {
        ImpactParams {
            positive_factor: dec!(0.0001),
            negative_factor: dec!(0.0002),
            exponent: dec!(2),
        }
    }

    #[test]
    fn growing_imbalance_is_negative() {
        // 1000 vs 1000 -> 1100 vs 1000: diff 0 -> 100
        let impact = swap_impact_usd(dec!(1000), dec!(1000), dec!(100), Decimal::ZERO, &params());
        // 0 - 0.0002 * 100^2 = -2
        assert_eq!(impact, dec!(-2));
    }

    #[test]
    fn shrinking_imbalance_is_positive() {
        // diff 200 -> 100
        let impact = swap_impact_usd(dec!(1000), dec!(1200), dec!(100), Decimal::ZERO, &params());
        // 0.0001 * (200^2 - 100^2) = 3
        assert_eq!(impact, dec!(3));
    }

    #[test]
    fn crossover_uses_both_factors() {
        // 1000 vs 1100 -> 1200 vs 1100: diff 100 on short side -> 100 on long side
        let impact = swap_impact_usd(dec!(1000), dec!(1100), dec!(200), Decimal::ZERO, &params());
        // 0.0001 * 100^2 - 0.0002 * 100^2 = 1 - 2
        assert_eq!(impact, dec!(-1));
    }

    #[test]
    fn empty_pool_has_no_impact() {
        let impact = swap_impact_usd(Decimal::ZERO, Decimal::ZERO, dec!(50000), Decimal::ZERO, &params());
        assert_eq!(impact, Decimal::ZERO);
    }

    #[test]
    fn position_impact_on_open_interest() {
        // longs 5000, shorts 5000, open a 1000 short: diff 0 -> 1000
        let impact = position_impact_usd(dec!(5000), dec!(5000), false, dec!(1000), &params());
        assert_eq!(impact, dec!(-200));

        // closing it again restores the balance at the positive rate
        let impact = position_impact_usd(dec!(5000), dec!(6000), false, dec!(-1000), &params());
        assert_eq!(impact, dec!(100));
    }

    #[test]
    fn linear_exponent_path() {
        let linear = ImpactParams {
            positive_factor: dec!(0.001),
            negative_factor: dec!(0.002),
            exponent: Decimal::ONE,
        };
        let impact = swap_impact_usd(dec!(1000), dec!(1000), dec!(500), Decimal::ZERO, &linear);
        assert_eq!(impact, dec!(-1));
    }

    #[test]
    fn positive_impact_capped_by_pool() {
        let price = Price::new_unchecked(dec!(2));
        // wants 10 usd = 5 tokens, pool only has 3 tokens
        let capped = cap_impact(dec!(10), dec!(3), price);
        assert_eq!(capped.impact_usd, dec!(6));
        assert_eq!(capped.impact_pool_delta, dec!(-3));

        let uncapped = cap_impact(dec!(4), dec!(3), price);
        assert_eq!(uncapped.impact_usd, dec!(4));
        assert_eq!(uncapped.impact_pool_delta, dec!(-2));
    }

    #[test]
    fn negative_impact_never_capped() {
        let price = Price::new_unchecked(dec!(3));
        let capped = cap_impact(dec!(-10), Decimal::ZERO, price);
        assert_eq!(capped.impact_usd, dec!(-10));
        assert_eq!(capped.impact_pool_delta, dec!(3.333333334));
    }

    #[test]
    fn empty_impact_pool_pays_nothing() {
        let capped = cap_impact(dec!(10), Decimal::ZERO, Price::new_unchecked(dec!(1)));
        assert_eq!(capped.impact_usd, Decimal::ZERO);
        assert_eq!(capped.impact_pool_delta, Decimal::ZERO);
    }

    #[test]
    fn huge_values_saturate() {
        let value = apply_impact_factor(Decimal::MAX, dec!(2), dec!(3));
        assert_eq!(value, Decimal::MAX);
    }

    #[test]
    fn small_factor_keeps_large_crossover_in_range() {
        // 1 vs 3e14 -> 6e14 + 1 vs 3e14: diff^2 alone would not fit
        let short = Decimal::from(300_000_000_000_000i64);
        let impact = swap_impact_usd(Decimal::ONE, short, short * dec!(2), Decimal::ZERO, &ImpactParams::default());

        // 0.000000005 * 9e28 - 0.00000001 * 9e28 = -4.5e20
        let scale = Decimal::from(1_000_000i64);
        assert!(impact < -Decimal::from(449_000_000_000_000i64) * scale);
        assert!(impact > -Decimal::from(451_000_000_000_000i64) * scale);
    }

    #[test]
    fn overflowing_charge_saturates_negative() {
        let impact = swap_impact_usd(dec!(1000), dec!(1000), Decimal::MAX / dec!(4), Decimal::ZERO, &params());
        assert_eq!(impact, Decimal::MIN);
        assert_eq!(checked_impact_factor(Decimal::MAX, dec!(2), dec!(3)), None);
        assert_eq!(checked_impact_factor(dec!(200), dec!(0.0001), dec!(2)), Some(dec!(4)));
    }
}
