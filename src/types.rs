// 1.0: all the primitives live here. nothing in the engine works without these types.
// IDs, assets, blocks, prices, side/leg tags and the rounding rules the ledgers depend on.
// each id is a newtype so the compiler catches type mixups.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

// token and USD amounts are rounded to this many decimal places whenever they
// leave a computation. cumulative factors are never rounded.
pub const AMOUNT_DP: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarketId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub u64);

// nonce-derived key for deposit and withdrawal requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

// token identity (symbol or address). empty ids are rejected at market creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.1: block height. accrual and oracle freshness are block driven, never wall-clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockNumber(pub u64);

impl BlockNumber {
    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn blocks_since(&self, earlier: BlockNumber) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// 1.2: position side. Long = profit when price goes up. Short = profit when price goes down.
// the size-to-token rounding lives on the tag so callers cannot pick the wrong direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Long, Side::Short];

    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    pub fn is_long(&self) -> bool {
        matches!(self, Side::Long)
    }

    // the pool leg whose token backs this side's pnl
    pub fn pnl_leg(&self) -> Leg {
        match self {
            Side::Long => Leg::Long,
            Side::Short => Leg::Short,
        }
    }

    // tokens bought on increase. longs round down, shorts round up, so the pool
    // never owes more index tokens than were paid for.
    pub fn size_delta_in_tokens(&self, size_delta_usd: Decimal, execution_price: Price) -> Decimal {
        let raw = size_delta_usd / execution_price.value();
        match self {
            Side::Long => round_down(raw),
            Side::Short => round_up(raw),
        }
    }

    // tokens released on decrease: the mirror image of the increase rule
    pub fn closed_size_in_tokens(&self, size_in_tokens: Decimal, size_delta_usd: Decimal, size_in_usd: Decimal) -> Decimal {
        if size_in_usd.is_zero() {
            return Decimal::ZERO;
        }
        let raw = size_in_tokens * size_delta_usd / size_in_usd;
        match self {
            Side::Long => round_up(raw),
            Side::Short => round_down(raw),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

// 1.3: one of the two pooled assets of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Leg {
    Long,
    Short,
}

impl Leg {
    pub const ALL: [Leg; 2] = [Leg::Long, Leg::Short];

    pub fn opposite(&self) -> Self {
        match self {
            Leg::Long => Leg::Short,
            Leg::Short => Leg::Long,
        }
    }
}

// 1.4: price in USD per unit of token. must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn new_unchecked(value: Decimal) -> Self {
        debug_assert!(value > Decimal::ZERO);
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn usd_value(&self, amount: Decimal) -> Decimal {
        amount * self.0
    }

    // amount paid out for a USD value
    pub fn tokens_down(&self, usd: Decimal) -> Decimal {
        round_down(usd / self.0)
    }

    // amount owed for a USD value
    pub fn tokens_up(&self, usd: Decimal) -> Decimal {
        round_up(usd / self.0)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.5: millisecond wall-clock timestamp. only stamps emitted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }
}

// 1.6: protocol-favour rounding. floor for amounts paid out, ceiling for amounts owed.
pub fn round_down(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_DP, RoundingStrategy::ToNegativeInfinity)
}

pub fn round_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_DP, RoundingStrategy::ToPositiveInfinity)
}

// a / b, or zero when b is zero. keeps the pure calculators total.
pub fn safe_div(a: Decimal, b: Decimal) -> Decimal {
    if b.is_zero() {
        Decimal::ZERO
    } else {
        a / b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn side_opposites() {
        assert_eq!(Side::Long.opposite(), Side::Short);
        assert_eq!(Leg::Short.opposite(), Leg::Long);
        assert_eq!(Side::Short.pnl_leg(), Leg::Short);
    }

    #[test]
    fn size_in_tokens_rounding_by_side() {
        let price = Price::new_unchecked(dec!(3));
        // 10 / 3 = 3.333333333...
        assert_eq!(Side::Long.size_delta_in_tokens(dec!(10), price), dec!(3.333333333));
        assert_eq!(Side::Short.size_delta_in_tokens(dec!(10), price), dec!(3.333333334));
    }

    #[test]
    fn closed_tokens_mirror_increase_rounding() {
        let long = Side::Long.closed_size_in_tokens(dec!(10), dec!(1), dec!(3));
        let short = Side::Short.closed_size_in_tokens(dec!(10), dec!(1), dec!(3));
        assert_eq!(long, dec!(3.333333334));
        assert_eq!(short, dec!(3.333333333));
        assert_eq!(Side::Long.closed_size_in_tokens(dec!(10), dec!(1), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn price_conversions_favour_protocol() {
        let price = Price::new_unchecked(dec!(7));
        assert_eq!(price.tokens_down(dec!(1)), dec!(0.142857142));
        assert_eq!(price.tokens_up(dec!(1)), dec!(0.142857143));
        assert!(Price::new(Decimal::ZERO).is_none());
    }

    #[test]
    fn rounding_handles_negative_values() {
        assert_eq!(round_down(dec!(-0.0000000001)), dec!(-0.000000001));
        assert_eq!(round_up(dec!(-0.0000000001)), dec!(0));
    }

    #[test]
    fn empty_asset_detection() {
        assert!(AssetId::new("  ").is_empty());
        assert!(!AssetId::new("ETH").is_empty());
        assert_eq!(BlockNumber(10).blocks_since(BlockNumber(4)), 6);
        assert_eq!(BlockNumber(3).blocks_since(BlockNumber(4)), 0);
    }
}
