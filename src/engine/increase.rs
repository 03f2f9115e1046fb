//! Position increase: open, add size, add collateral.

use super::core::{load_market, read_pool_snapshot, Engine};
use super::results::{EngineError, PositionOutcome};
use super::settlement::{route_position_fees, SettlementLog};
use crate::events::{EventPayload, FeeAction, PositionChangeEvent};
use crate::market::MarketError;
use crate::oracle::{MarketPrices, PriceOracle};
use crate::position::{increase_execution_price, is_acceptable_increase, IncreasePositionParams, Position, PositionKey};
use crate::price_impact::{cap_impact, position_impact_usd};
use crate::risk::{check_collateral, check_reserve};
use crate::store::{KeyValueStore, StoreExt, StoreKey, Transaction};
use crate::types::{AccountId, BlockNumber};
use rust_decimal::Decimal;

impl<S: KeyValueStore> Engine<S> {
    pub fn increase_position(
        &mut self,
        account: AccountId,
        params: IncreasePositionParams,
        oracle: &dyn PriceOracle,
    ) -> Result<PositionOutcome, EngineError> {
        for amount in [params.collateral_delta_amount, params.size_delta_usd] {
            if amount < Decimal::ZERO {
                return Err(EngineError::InvalidAmount(amount));
            }
        }

        let mut tx = Transaction::new(&self.store);
        let mut log = SettlementLog::default();

        let record = load_market(&tx, params.market)?;
        let market = &record.market;
        let config = &record.config;
        let collateral_leg = market
            .leg_of(&params.collateral_token)
            .ok_or_else(|| MarketError::InvalidCollateral {
                market: market.id,
                asset: params.collateral_token.clone(),
            })?;
        let side = params.side;
        let key = PositionKey::new(account, market.id, params.collateral_token.clone(), side);
        let existing = tx.position(&key)?;

        // prices may not predate the position's last update
        let prices = MarketPrices::resolve(oracle, market, config.index_price_source)?;
        let min_block = existing.as_ref().map_or(BlockNumber(0), |p| p.updated_at_block);
        prices.validate_block(min_block, self.current_block)?;

        let mut position = existing.unwrap_or_else(|| Position::new(key.clone(), self.current_block));
        if position.is_empty() && params.size_delta_usd.is_zero() {
            return Err(EngineError::InvalidSizeDelta {
                requested: params.size_delta_usd,
                size: position.size_in_usd,
            });
        }

        // 1: accrual first, everything below reads the advanced factors
        self.advance_accrual(&mut tx, &record, &prices)?;

        // 2: impact on open interest, capped by the impact pool
        let snapshot = read_pool_snapshot(&tx, market)?;
        let impact_usd = position_impact_usd(
            snapshot.long_open_interest_usd,
            snapshot.short_open_interest_usd,
            side.is_long(),
            params.size_delta_usd,
            &config.position_impact,
        );
        let impact_pool = tx.value(&StoreKey::PositionImpactPool(market.id))?;
        let capped = cap_impact(impact_usd, impact_pool, prices.index);

        // 3: execution price and acceptable price bound
        let execution_price = increase_execution_price(side, prices.index, params.size_delta_usd, capped.impact_usd)
            .ok_or(EngineError::PriceImpactLargerThanOrderSize {
                impact_usd: capped.impact_usd,
                size_delta_usd: params.size_delta_usd,
            })?;
        if let Some(acceptable_price) = params.acceptable_price {
            if !is_acceptable_increase(side, execution_price, acceptable_price) {
                return Err(EngineError::AcceptablePriceExceeded {
                    execution_price,
                    acceptable_price,
                });
            }
        }
        let size_delta_in_tokens = side.size_delta_in_tokens(params.size_delta_usd, execution_price);

        // 4: fees come out of existing plus incoming collateral
        let referral = self.referrals.referral_info(account);
        let fees = self.position_fees(
            &tx,
            &record,
            &position,
            &prices,
            params.size_delta_usd,
            capped.impact_usd > Decimal::ZERO,
            referral.as_ref(),
        )?;
        let cost = fees.total_cost_amount();
        let available = position.collateral_amount + params.collateral_delta_amount;
        if cost > available {
            return Err(EngineError::InsufficientCollateral {
                required: cost,
                available,
            });
        }
        let collateral_before = position.collateral_amount;

        position.collateral_amount = available - cost;
        position.size_in_usd += params.size_delta_usd;
        position.size_in_tokens += size_delta_in_tokens;
        position.borrowing_factor = fees.borrowing.latest_borrowing_factor;
        position.long_token_funding_amount_per_size = fees.funding.latest_long_token_funding_amount_per_size;
        position.short_token_funding_amount_per_size = fees.funding.latest_short_token_funding_amount_per_size;
        position.updated_at_block = self.current_block;

        // 5: market accumulators
        let token = &params.collateral_token;
        tx.apply_delta(StoreKey::PositionImpactPool(market.id), capped.impact_pool_delta)?;
        tx.apply_delta(StoreKey::OpenInterest(market.id, token.clone(), side), params.size_delta_usd)?;
        tx.apply_delta(StoreKey::OpenInterestInTokens(market.id, token.clone(), side), size_delta_in_tokens)?;
        tx.apply_delta(
            StoreKey::CollateralSum(market.id, token.clone(), side),
            position.collateral_amount - collateral_before,
        )?;
        route_position_fees(&mut tx, &mut log, market, token, account, &fees, FeeAction::PositionIncrease)?;

        // 6: solvency against the post-trade state
        let after = read_pool_snapshot(&tx, market)?;
        if let Some(violation) = check_reserve(&after, side, &prices, &config.reserve) {
            return Err(violation.into());
        }
        if let Some(violation) = check_collateral(&position, prices.token(collateral_leg), &config.collateral) {
            return Err(violation.into());
        }

        tx.set_position(position.clone());
        log.push_event(EventPayload::PositionIncrease(PositionChangeEvent {
            market: market.id,
            account,
            collateral_token: token.clone(),
            side,
            execution_price,
            size_delta_usd: params.size_delta_usd,
            size_delta_in_tokens,
            collateral_delta_amount: params.collateral_delta_amount,
            price_impact_usd: capped.impact_usd,
            pnl_usd: Decimal::ZERO,
            size_in_usd: position.size_in_usd,
            size_in_tokens: position.size_in_tokens,
            collateral_amount: position.collateral_amount,
        }));

        let settlement = log.into_settlement(tx.into_write_set());
        self.commit(settlement)?;

        log::info!(
            "{:?} increased {} {} by {} usd at {}",
            account,
            side,
            key.collateral_token,
            params.size_delta_usd,
            execution_price
        );
        Ok(PositionOutcome {
            key,
            execution_price,
            size_delta_usd: params.size_delta_usd,
            size_delta_in_tokens,
            price_impact_usd: capped.impact_usd,
            pnl_usd: Decimal::ZERO,
            fees,
            output_amount: Decimal::ZERO,
            secondary_output_amount: Decimal::ZERO,
            position: Some(position),
        })
    }
}
