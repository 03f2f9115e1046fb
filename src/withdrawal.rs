// 7.0: withdrawal requests. shares are escrowed out of the account's balance at
// creation; execute burns them for both pooled tokens, cancel hands them back.

use crate::types::{round_down, AccountId, BlockNumber, Leg, MarketId, RequestId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: RequestId,
    pub account: AccountId,
    pub receiver: AccountId,
    pub market: MarketId,
    pub pool_shares: Decimal,
    pub min_long_token_amount: Decimal,
    pub min_short_token_amount: Decimal,
    pub execution_fee: Decimal,
    pub callback: Option<AccountId>,
    pub created_at_block: BlockNumber,
}

impl WithdrawalRequest {
    pub fn min_amount(&self, leg: Leg) -> Decimal {
        match leg {
            Leg::Long => self.min_long_token_amount,
            Leg::Short => self.min_short_token_amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateWithdrawalParams {
    pub receiver: AccountId,
    pub market: MarketId,
    pub pool_shares: Decimal,
    pub min_long_token_amount: Decimal,
    pub min_short_token_amount: Decimal,
    pub execution_fee: Decimal,
    pub callback: Option<AccountId>,
}

impl CreateWithdrawalParams {
    pub fn new(receiver: AccountId, market: MarketId, pool_shares: Decimal) -> Self {
        Self {
            receiver,
            market,
            pool_shares,
            min_long_token_amount: Decimal::ZERO,
            min_short_token_amount: Decimal::ZERO,
            execution_fee: Decimal::ZERO,
            callback: None,
        }
    }

    pub fn with_min_amounts(mut self, min_long_token_amount: Decimal, min_short_token_amount: Decimal) -> Self {
        self.min_long_token_amount = min_long_token_amount;
        self.min_short_token_amount = min_short_token_amount;
        self
    }

    pub fn with_callback(mut self, target: AccountId) -> Self {
        self.callback = Some(target);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalOutcome {
    pub request: RequestId,
    pub receiver: AccountId,
    pub burned: Decimal,
    pub long_token_amount: Decimal,
    pub short_token_amount: Decimal,
}

impl WithdrawalOutcome {
    pub fn amount(&self, leg: Leg) -> Decimal {
        match leg {
            Leg::Long => self.long_token_amount,
            Leg::Short => self.short_token_amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRefund {
    pub request: RequestId,
    pub account: AccountId,
    pub pool_shares: Decimal,
    pub execution_fee: Decimal,
}

// 7.1: redeemed usd split pro-rata to each leg's share of the pooled usd
pub fn split_withdrawal_usd(usd: Decimal, long_pool_usd: Decimal, short_pool_usd: Decimal) -> (Decimal, Decimal) {
    let total = long_pool_usd + short_pool_usd;
    if total <= Decimal::ZERO {
        return (Decimal::ZERO, Decimal::ZERO);
    }
    let long_usd = round_down(usd * long_pool_usd / total);
    let short_usd = round_down(usd * short_pool_usd / total);
    (long_usd, short_usd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn split_follows_pool_weights() {
        let (long, short) = split_withdrawal_usd(dec!(100), dec!(3000), dec!(1000));
        assert_eq!(long, dec!(75));
        assert_eq!(short, dec!(25));
    }

    #[test]
    fn split_never_exceeds_redeemed_usd() {
        let (long, short) = split_withdrawal_usd(dec!(1), dec!(1), dec!(2));
        assert!(long + short <= dec!(1));
        assert_eq!(split_withdrawal_usd(dec!(1), Decimal::ZERO, Decimal::ZERO), (Decimal::ZERO, Decimal::ZERO));
    }
}
