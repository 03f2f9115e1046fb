//! Fee calculation.
//!
//! Splits a gross token amount into what the fee receiver gets, what stays in
//! the pool, and the referral carve-outs. Nothing here moves value; the engine
//! routes the amounts at commit.
//!
//! Rounding: the fee owed rounds up, every payout (receiver share, affiliate
//! reward, trader discount) rounds down, the pool keeps the exact remainder.

use crate::config::FeeParams;
use crate::funding::{BorrowingFees, FundingFees};
use crate::referral::ReferralInfo;
use crate::types::{round_down, round_up, AccountId, Price};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeePurpose {
    Deposit,
    Withdrawal,
    Position,
}

impl FeeParams {
    /// Base fee factor for a purpose. Impact that helps the pool gets the cheaper rate.
    pub fn fee_factor(&self, purpose: FeePurpose, positive_impact: bool) -> Decimal {
        match (purpose, positive_impact) {
            (FeePurpose::Deposit, true) => self.deposit_fee_factor_positive_impact,
            (FeePurpose::Deposit, false) => self.deposit_fee_factor_negative_impact,
            (FeePurpose::Withdrawal, _) => self.withdrawal_fee_factor,
            (FeePurpose::Position, true) => self.position_fee_factor_positive_impact,
            (FeePurpose::Position, false) => self.position_fee_factor_negative_impact,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeBreakdown {
    /// Base fee before referral carve-outs
    pub fee_amount: Decimal,
    pub fee_receiver_amount: Decimal,
    pub fee_amount_for_pool: Decimal,
    pub affiliate: Option<AccountId>,
    pub affiliate_reward_amount: Decimal,
    pub trader_discount_amount: Decimal,
    /// Gross minus what the account actually pays
    pub amount_after_fees: Decimal,
}

impl FeeBreakdown {
    /// What leaves the account's side: base fee less the trader discount
    pub fn net_cost(&self) -> Decimal {
        self.fee_amount - self.trader_discount_amount
    }
}

/// Fee on a token amount (deposit and withdrawal legs).
pub fn compute_fees(
    amount: Decimal,
    purpose: FeePurpose,
    positive_impact: bool,
    params: &FeeParams,
    referral: Option<&ReferralInfo>,
) -> FeeBreakdown {
    let factor = params.fee_factor(purpose, positive_impact);
    let fee_amount = round_up(amount.max(Decimal::ZERO) * factor).min(amount.max(Decimal::ZERO));
    split_fee(amount, fee_amount, params.fee_receiver_factor, referral)
}

/// Position fee on a usd size change, charged in collateral tokens.
/// `amount_after_fees` is relative to zero: callers only use the split.
pub fn compute_position_fee(
    size_delta_usd: Decimal,
    collateral_price: Price,
    positive_impact: bool,
    params: &FeeParams,
    referral: Option<&ReferralInfo>,
) -> FeeBreakdown {
    let factor = params.fee_factor(FeePurpose::Position, positive_impact);
    let fee_amount = collateral_price.tokens_up(size_delta_usd.abs() * factor);
    split_fee(Decimal::ZERO, fee_amount, params.fee_receiver_factor, referral)
}

fn split_fee(amount: Decimal, fee_amount: Decimal, fee_receiver_factor: Decimal, referral: Option<&ReferralInfo>) -> FeeBreakdown {
    let (affiliate, total_rebate, trader_discount) = match referral {
        Some(info) => {
            let total_rebate = round_down(fee_amount * info.total_rebate_factor);
            let discount = round_down(total_rebate * info.discount_share);
            (Some(info.affiliate), total_rebate, discount)
        }
        None => (None, Decimal::ZERO, Decimal::ZERO),
    };

    let affiliate_reward_amount = total_rebate - trader_discount;
    let protocol_fee = fee_amount - total_rebate;
    let fee_receiver_amount = round_down(protocol_fee * fee_receiver_factor);

    FeeBreakdown {
        fee_amount,
        fee_receiver_amount,
        fee_amount_for_pool: protocol_fee - fee_receiver_amount,
        affiliate,
        affiliate_reward_amount,
        trader_discount_amount: trader_discount,
        amount_after_fees: amount - fee_amount + trader_discount,
    }
}

/// Everything a position interaction owes, in collateral tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PositionFees {
    pub position_fee: FeeBreakdown,
    pub borrowing: BorrowingFees,
    pub funding: FundingFees,
}

impl PositionFees {
    pub fn total_cost_amount(&self) -> Decimal {
        self.position_fee.net_cost() + self.borrowing.borrowing_fee_amount + self.funding.funding_fee_amount
    }

    pub fn fee_receiver_amount(&self) -> Decimal {
        self.position_fee.fee_receiver_amount + self.borrowing.fee_receiver_amount
    }

    // fees that stay in the pool amount of the collateral token
    pub fn fee_amount_for_pool(&self) -> Decimal {
        self.position_fee.fee_amount_for_pool + self.borrowing.amount_for_pool
    }
}
