// 6.0: deposit requests. created with the raw transferred-in amounts, then either
// executed (shares minted) or cancelled (amounts returned). both remove the record.

use crate::types::{round_down, round_up, AccountId, BlockNumber, Leg, MarketId, RequestId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRequest {
    pub id: RequestId,
    pub account: AccountId,
    pub receiver: AccountId,
    pub market: MarketId,
    pub long_token_amount: Decimal,
    pub short_token_amount: Decimal,
    pub min_pool_shares: Decimal,
    pub execution_fee: Decimal,
    pub callback: Option<AccountId>,
    // oracle prices must be at least this fresh
    pub created_at_block: BlockNumber,
}

impl DepositRequest {
    pub fn amount(&self, leg: Leg) -> Decimal {
        match leg {
            Leg::Long => self.long_token_amount,
            Leg::Short => self.short_token_amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDepositParams {
    pub receiver: AccountId,
    pub market: MarketId,
    pub long_token_amount: Decimal,
    pub short_token_amount: Decimal,
    pub min_pool_shares: Decimal,
    pub execution_fee: Decimal,
    pub callback: Option<AccountId>,
}

impl CreateDepositParams {
    pub fn new(receiver: AccountId, market: MarketId, long_token_amount: Decimal, short_token_amount: Decimal) -> Self {
        Self {
            receiver,
            market,
            long_token_amount,
            short_token_amount,
            min_pool_shares: Decimal::ZERO,
            execution_fee: Decimal::ZERO,
            callback: None,
        }
    }

    pub fn with_min_pool_shares(mut self, min_pool_shares: Decimal) -> Self {
        self.min_pool_shares = min_pool_shares;
        self
    }

    pub fn with_callback(mut self, target: AccountId) -> Self {
        self.callback = Some(target);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositOutcome {
    pub request: RequestId,
    pub receiver: AccountId,
    pub minted: Decimal,
    pub price_impact_usd: Decimal,
}

// what a cancel hands back. the raw amounts, never revalued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRefund {
    pub request: RequestId,
    pub account: AccountId,
    pub long_token_amount: Decimal,
    pub short_token_amount: Decimal,
    pub execution_fee: Decimal,
}

// 6.1: share of a combined impact attributed to one leg, by usd weight.
pub fn apportion_impact(total_impact_usd: Decimal, leg_usd: Decimal, total_usd: Decimal) -> Decimal {
    if total_usd.is_zero() {
        return Decimal::ZERO;
    }
    // divide first only when the product would not fit
    let saturated = if total_impact_usd < Decimal::ZERO { Decimal::MIN } else { Decimal::MAX };
    let share = total_impact_usd
        .checked_mul(leg_usd)
        .and_then(|product| product.checked_div(total_usd))
        .or_else(|| leg_usd.checked_div(total_usd).and_then(|weight| weight.checked_mul(total_impact_usd)))
        .unwrap_or(saturated);
    // payouts round down, charges away from zero
    if share >= Decimal::ZERO {
        round_down(share)
    } else {
        -round_up(-share)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn impact_split_by_usd_share() {
        assert_eq!(apportion_impact(dec!(-10), dec!(750), dec!(1000)), dec!(-7.5));
        assert_eq!(apportion_impact(dec!(9), dec!(1), dec!(3)), dec!(3));
        assert_eq!(apportion_impact(dec!(9), dec!(1), Decimal::ZERO), Decimal::ZERO);
        // 10 / 3 each way
        assert_eq!(apportion_impact(dec!(10), dec!(1), dec!(3)), dec!(3.333333333));
        assert_eq!(apportion_impact(dec!(-10), dec!(1), dec!(3)), dec!(-3.333333334));
    }

    #[test]
    fn large_impact_split_does_not_overflow() {
        let trillion = Decimal::from(1_000_000_000_000i64);
        let impact = -trillion * trillion;
        let leg = Decimal::from(400_000_000_000_000i64);
        // impact * leg is ~4e38, past Decimal range
        assert_eq!(apportion_impact(impact, leg, leg * dec!(2)), impact / dec!(2));
    }

    #[test]
    fn params_builder() {
        let params = CreateDepositParams::new(AccountId(2), MarketId(1), dec!(1), dec!(2))
            .with_min_pool_shares(dec!(3))
            .with_callback(AccountId(9));
        assert_eq!(params.min_pool_shares, dec!(3));
        assert_eq!(params.callback, Some(AccountId(9)));
    }
}
