// 5.0: funding and borrowing accrual. both are cumulative per-market factors
// advanced lazily, once per interaction, by the number of blocks since the last advance.
// 5.0 has the policy trait and default curve. 5.1 splits funding across collateral.
// 5.2+ turns factor deltas into what one position owes or can claim.

use crate::config::AccrualParams;
use crate::position::Position;
use crate::types::{round_down, round_up, safe_div, Leg, Price, Side};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use std::fmt;

// open interest (usd) split by the collateral leg backing it and the position side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpenInterestSplit {
    pub long_collateral_long: Decimal,
    pub long_collateral_short: Decimal,
    pub short_collateral_long: Decimal,
    pub short_collateral_short: Decimal,
}

impl OpenInterestSplit {
    pub fn get(&self, collateral: Leg, side: Side) -> Decimal {
        match (collateral, side) {
            (Leg::Long, Side::Long) => self.long_collateral_long,
            (Leg::Long, Side::Short) => self.long_collateral_short,
            (Leg::Short, Side::Long) => self.short_collateral_long,
            (Leg::Short, Side::Short) => self.short_collateral_short,
        }
    }

    pub fn set(&mut self, collateral: Leg, side: Side, value: Decimal) {
        match (collateral, side) {
            (Leg::Long, Side::Long) => self.long_collateral_long = value,
            (Leg::Long, Side::Short) => self.long_collateral_short = value,
            (Leg::Short, Side::Long) => self.short_collateral_long = value,
            (Leg::Short, Side::Short) => self.short_collateral_short = value,
        }
    }

    pub fn side_total(&self, side: Side) -> Decimal {
        self.get(Leg::Long, side) + self.get(Leg::Short, side)
    }
}

/// Market state an accrual policy prices against. Read once, before any factor moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccrualSnapshot {
    pub open_interest: OpenInterestSplit,
    pub long_reserved_usd: Decimal,
    pub short_reserved_usd: Decimal,
    pub long_pool_usd: Decimal,
    pub short_pool_usd: Decimal,
}

impl AccrualSnapshot {
    pub fn reserved_usd(&self, side: Side) -> Decimal {
        match side {
            Side::Long => self.long_reserved_usd,
            Side::Short => self.short_reserved_usd,
        }
    }

    pub fn pool_usd(&self, side: Side) -> Decimal {
        match side {
            Side::Long => self.long_pool_usd,
            Side::Short => self.short_pool_usd,
        }
    }
}

/// Rate curve behind the cumulative factors. Implementations must be
/// non-negative and depend only on the snapshot, never on wall-clock time.
pub trait AccrualPolicy: fmt::Debug + Send + Sync {
    /// Borrowing factor added per block for one side.
    fn borrowing_factor_per_block(&self, side: Side, snapshot: &AccrualSnapshot, params: &AccrualParams) -> Decimal;

    /// Funding paid per block per USD of the larger side's open interest.
    fn funding_factor_per_block(&self, snapshot: &AccrualSnapshot, params: &AccrualParams) -> Decimal;
}

/// Default curve: borrowing scales with reserve utilization, funding with OI skew.
#[derive(Debug, Clone, Copy, Default)]
pub struct UtilizationPolicy;

impl AccrualPolicy for UtilizationPolicy {
    fn borrowing_factor_per_block(&self, side: Side, snapshot: &AccrualSnapshot, params: &AccrualParams) -> Decimal {
        let utilization = safe_div(snapshot.reserved_usd(side), snapshot.pool_usd(side));
        params.borrowing_factor(side) * pow(utilization, params.borrowing_exponent)
    }

    fn funding_factor_per_block(&self, snapshot: &AccrualSnapshot, params: &AccrualParams) -> Decimal {
        let long_oi = snapshot.open_interest.side_total(Side::Long);
        let short_oi = snapshot.open_interest.side_total(Side::Short);
        let diff = (long_oi - short_oi).abs();
        params.funding_factor * safe_div(pow(diff, params.funding_exponent), long_oi + short_oi)
    }
}

fn pow(base: Decimal, exponent: Decimal) -> Decimal {
    if base.is_zero() {
        return Decimal::ZERO;
    }
    if exponent == Decimal::ONE {
        return base;
    }
    let powered = if exponent.fract().is_zero() {
        exponent.to_i64().and_then(|e| base.checked_powi(e))
    } else {
        base.checked_powd(exponent)
    };
    powered.unwrap_or(Decimal::MAX)
}

// 5.1: one funding-amount-per-size movement for a (collateral leg, side) accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingPerSizeDelta {
    pub collateral: Leg,
    pub side: Side,
    pub delta: Decimal,
}

/// Splits the funding for `blocks` blocks across collateral legs.
/// The larger side pays in its own collateral, spread over the OI that collateral backs;
/// the smaller side receives both tokens, spread over its whole OI.
pub fn funding_per_size_deltas(
    factor_per_block: Decimal,
    blocks: u64,
    open_interest: &OpenInterestSplit,
    long_token_price: Price,
    short_token_price: Price,
) -> Vec<FundingPerSizeDelta> {
    let long_oi = open_interest.side_total(Side::Long);
    let short_oi = open_interest.side_total(Side::Short);

    if blocks == 0 || factor_per_block <= Decimal::ZERO || long_oi.is_zero() || short_oi.is_zero() || long_oi == short_oi {
        return Vec::new();
    }

    let payer = if long_oi > short_oi { Side::Long } else { Side::Short };
    let receiver = payer.opposite();
    let payer_oi = open_interest.side_total(payer);
    let receiver_oi = open_interest.side_total(receiver);
    let funding_usd = payer_oi * factor_per_block * Decimal::from(blocks);

    let mut deltas = Vec::with_capacity(4);
    for leg in Leg::ALL {
        let payer_leg_oi = open_interest.get(leg, payer);
        if payer_leg_oi.is_zero() {
            continue;
        }
        let price = match leg {
            Leg::Long => long_token_price,
            Leg::Short => short_token_price,
        };
        let usd_for_leg = funding_usd * payer_leg_oi / payer_oi;
        let tokens_for_leg = usd_for_leg / price.value();

        deltas.push(FundingPerSizeDelta {
            collateral: leg,
            side: payer,
            delta: tokens_for_leg / payer_leg_oi,
        });
        deltas.push(FundingPerSizeDelta {
            collateral: leg,
            side: receiver,
            delta: -(tokens_for_leg / receiver_oi),
        });
    }
    deltas
}

// 5.2: borrowing owed by one position since its entry snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BorrowingFees {
    pub borrowing_fee_usd: Decimal,
    pub borrowing_fee_amount: Decimal,
    pub fee_receiver_amount: Decimal,
    pub amount_for_pool: Decimal,
    pub latest_borrowing_factor: Decimal,
}

pub fn borrowing_fees(
    position: &Position,
    cumulative_borrowing_factor: Decimal,
    collateral_price: Price,
    borrowing_fee_receiver_factor: Decimal,
) -> BorrowingFees {
    let factor_delta = (cumulative_borrowing_factor - position.borrowing_factor).max(Decimal::ZERO);
    let borrowing_fee_usd = round_up(factor_delta * position.size_in_usd);
    let borrowing_fee_amount = collateral_price.tokens_up(borrowing_fee_usd);
    let fee_receiver_amount = round_down(borrowing_fee_amount * borrowing_fee_receiver_factor);

    BorrowingFees {
        borrowing_fee_usd,
        borrowing_fee_amount,
        fee_receiver_amount,
        amount_for_pool: borrowing_fee_amount - fee_receiver_amount,
        latest_borrowing_factor: cumulative_borrowing_factor,
    }
}

// 5.3: funding owed in collateral and claimable in both pooled tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FundingFees {
    pub funding_fee_amount: Decimal,
    pub claimable_long_token_amount: Decimal,
    pub claimable_short_token_amount: Decimal,
    // snapshots the position should carry forward
    pub latest_long_token_funding_amount_per_size: Decimal,
    pub latest_short_token_funding_amount_per_size: Decimal,
    pub has_pending_long_token_funding_fee: bool,
    pub has_pending_short_token_funding_fee: bool,
}

impl FundingFees {
    pub fn claimable_amount(&self, leg: Leg) -> Decimal {
        match leg {
            Leg::Long => self.claimable_long_token_amount,
            Leg::Short => self.claimable_short_token_amount,
        }
    }
}

// a claimable delta too small to round to one unit stays pending: the old
// snapshot is kept so the dust keeps accumulating instead of being lost
pub fn funding_fees(
    position: &Position,
    collateral_leg: Leg,
    latest_long_token_per_size: Decimal,
    latest_short_token_per_size: Decimal,
) -> FundingFees {
    let size = position.size_in_usd;
    let long_delta = latest_long_token_per_size - position.long_token_funding_amount_per_size;
    let short_delta = latest_short_token_per_size - position.short_token_funding_amount_per_size;

    let owed_delta = match collateral_leg {
        Leg::Long => long_delta,
        Leg::Short => short_delta,
    };
    let funding_fee_amount = if owed_delta > Decimal::ZERO {
        round_up(owed_delta * size)
    } else {
        Decimal::ZERO
    };

    let claimable = |delta: Decimal| {
        if delta < Decimal::ZERO {
            round_down(-delta * size)
        } else {
            Decimal::ZERO
        }
    };
    let claimable_long_token_amount = claimable(long_delta);
    let claimable_short_token_amount = claimable(short_delta);

    let pending_long = long_delta < Decimal::ZERO && claimable_long_token_amount.is_zero() && !size.is_zero();
    let pending_short = short_delta < Decimal::ZERO && claimable_short_token_amount.is_zero() && !size.is_zero();

    FundingFees {
        funding_fee_amount,
        claimable_long_token_amount,
        claimable_short_token_amount,
        latest_long_token_funding_amount_per_size: if pending_long {
            position.long_token_funding_amount_per_size
        } else {
            latest_long_token_per_size
        },
        latest_short_token_funding_amount_per_size: if pending_short {
            position.short_token_funding_amount_per_size
        } else {
            latest_short_token_per_size
        },
        has_pending_long_token_funding_fee: pending_long,
        has_pending_short_token_funding_fee: pending_short,
    }
}
