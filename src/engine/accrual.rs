//! Lazy accrual of the cumulative borrowing and funding factors.

use super::core::{read_open_interest, read_pool_snapshot, Engine};
use super::results::EngineError;
use crate::fees::{compute_position_fee, PositionFees};
use crate::funding::{borrowing_fees, funding_fees, funding_per_size_deltas, AccrualSnapshot};
use crate::oracle::MarketPrices;
use crate::position::Position;
use crate::referral::ReferralInfo;
use crate::store::{KeyValueStore, MarketRecord, StoreExt, StoreKey};
use crate::types::{Leg, Side};
use rust_decimal::Decimal;

impl<S: KeyValueStore> Engine<S> {
    /// Bring a market's accumulators up to the current block. Runs before any
    /// position or pool state is read. The first call only records the block.
    pub(super) fn advance_accrual<T: KeyValueStore + ?Sized>(
        &self,
        tx: &mut T,
        record: &MarketRecord,
        prices: &MarketPrices,
    ) -> Result<u64, EngineError> {
        let market = &record.market;
        let params = &record.config.accrual;
        let last_key = StoreKey::LastAccrualBlock(market.id);

        let blocks = match tx.block(&last_key)? {
            Some(last) if last >= self.current_block => return Ok(0),
            Some(last) => self.current_block.blocks_since(last),
            None => 0,
        };

        if blocks > 0 {
            let pool = read_pool_snapshot(tx, market)?;
            let open_interest = read_open_interest(tx, market)?;
            let snapshot = AccrualSnapshot {
                open_interest,
                long_reserved_usd: pool.reserved_usd(Side::Long, prices.index),
                short_reserved_usd: pool.reserved_usd(Side::Short, prices.index),
                long_pool_usd: pool.leg_usd(Leg::Long, prices),
                short_pool_usd: pool.leg_usd(Leg::Short, prices),
            };
            let elapsed = Decimal::from(blocks);

            for side in Side::ALL {
                // the cumulative factor never decreases, whatever the policy says
                let rate = self
                    .accrual_policy
                    .borrowing_factor_per_block(side, &snapshot, params)
                    .max(Decimal::ZERO);
                tx.apply_delta(StoreKey::CumulativeBorrowingFactor(market.id, side), rate * elapsed)?;
            }

            let funding_rate = self.accrual_policy.funding_factor_per_block(&snapshot, params);
            let deltas = funding_per_size_deltas(funding_rate, blocks, &open_interest, prices.long_token, prices.short_token);
            for delta in deltas {
                let key = StoreKey::FundingAmountPerSize(market.id, market.token(delta.collateral).clone(), delta.side);
                tx.apply_delta(key, delta.delta)?;
            }

            log::trace!("market {:?} accrued {} blocks, funding rate {}", market.id, blocks, funding_rate);
        }

        tx.set_block(last_key, self.current_block);
        Ok(blocks)
    }

    /// Everything owed on one interaction: position fee on the size change
    /// plus borrowing and funding since the position's snapshots.
    pub(super) fn position_fees<T: KeyValueStore + ?Sized>(
        &self,
        tx: &T,
        record: &MarketRecord,
        position: &Position,
        prices: &MarketPrices,
        size_delta_usd: Decimal,
        positive_impact: bool,
        referral: Option<&ReferralInfo>,
    ) -> Result<PositionFees, EngineError> {
        let market = &record.market;
        let fee_params = &record.config.fees;
        let side = position.side();
        let collateral_leg = market
            .leg_of(&position.key.collateral_token)
            .ok_or_else(|| crate::market::MarketError::InvalidCollateral {
                market: market.id,
                asset: position.key.collateral_token.clone(),
            })?;
        let collateral_price = prices.token(collateral_leg);

        let cumulative_borrowing = tx.value(&StoreKey::CumulativeBorrowingFactor(market.id, side))?;
        let latest_long = tx.value(&StoreKey::FundingAmountPerSize(market.id, market.long_token.clone(), side))?;
        let latest_short = tx.value(&StoreKey::FundingAmountPerSize(market.id, market.short_token.clone(), side))?;

        Ok(PositionFees {
            position_fee: compute_position_fee(size_delta_usd, collateral_price, positive_impact, fee_params, referral),
            borrowing: borrowing_fees(position, cumulative_borrowing, collateral_price, fee_params.borrowing_fee_receiver_factor),
            funding: funding_fees(position, collateral_leg, latest_long, latest_short),
        })
    }
}
