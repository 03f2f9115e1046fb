//! Position decrease: reduce size, withdraw collateral, close.
//!
//! Gains (profit and positive impact) are paid from the pool in the pnl token.
//! Costs (losses, negative impact, fees) come out of collateral first, then out
//! of whatever the trader would have received in the collateral token.

use super::core::{load_market, read_pool_snapshot, Engine};
use super::results::{EngineError, PositionOutcome};
use super::settlement::{route_position_fees, SettlementLog};
use crate::events::{EventPayload, FeeAction, PositionChangeEvent};
use crate::market::MarketError;
use crate::oracle::{MarketPrices, PriceOracle};
use crate::position::{decrease_execution_price, is_acceptable_decrease, DecreasePositionParams, PositionKey};
use crate::price_impact::{cap_impact, position_impact_usd};
use crate::risk::check_collateral;
use crate::store::{KeyValueStore, StoreExt, StoreKey, Transaction};
use crate::types::AccountId;
use rust_decimal::Decimal;

impl<S: KeyValueStore> Engine<S> {
    pub fn decrease_position(
        &mut self,
        account: AccountId,
        params: DecreasePositionParams,
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
        let side = params.side;
        let key = PositionKey::new(account, market.id, params.collateral_token.clone(), side);
        let mut position = tx.position(&key)?.ok_or_else(|| EngineError::PositionNotFound(key.clone()))?;
        if params.size_delta_usd > position.size_in_usd {
            return Err(EngineError::InvalidSizeDelta {
                requested: params.size_delta_usd,
                size: position.size_in_usd,
            });
        }

        let collateral_leg = market
            .leg_of(&params.collateral_token)
            .ok_or_else(|| MarketError::InvalidCollateral {
                market: market.id,
                asset: params.collateral_token.clone(),
            })?;
        let prices = MarketPrices::resolve(oracle, market, config.index_price_source)?;
        prices.validate_block(position.updated_at_block, self.current_block)?;

        // 1: accrual
        self.advance_accrual(&mut tx, &record, &prices)?;

        // 2: impact of shrinking this side's open interest
        let snapshot = read_pool_snapshot(&tx, market)?;
        let impact_usd = position_impact_usd(
            snapshot.long_open_interest_usd,
            snapshot.short_open_interest_usd,
            side.is_long(),
            -params.size_delta_usd,
            &config.position_impact,
        );
        let impact_pool = tx.value(&StoreKey::PositionImpactPool(market.id))?;
        let capped = cap_impact(impact_usd, impact_pool, prices.index);

        let execution_price = decrease_execution_price(side, prices.index, params.size_delta_usd, capped.impact_usd)
            .ok_or(EngineError::PriceImpactLargerThanOrderSize {
                impact_usd: capped.impact_usd,
                size_delta_usd: params.size_delta_usd,
            })?;
        if let Some(acceptable_price) = params.acceptable_price {
            if !is_acceptable_decrease(side, execution_price, acceptable_price) {
                return Err(EngineError::AcceptablePriceExceeded {
                    execution_price,
                    acceptable_price,
                });
            }
        }

        // 3: pnl on the closed fraction, at the index price
        let realized = position.realized_pnl(params.size_delta_usd, prices.index);
        let is_full_close = params.size_delta_usd == position.size_in_usd;

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

        let collateral_token = &params.collateral_token;
        let collateral_price = prices.token(collateral_leg);
        let pnl_leg = side.pnl_leg();
        let pnl_token = market.token(pnl_leg);
        let same_token = pnl_leg == collateral_leg;

        // 4: optional collateral withdrawal
        let collateral_before = position.collateral_amount;
        let withdrawn = if is_full_close {
            Decimal::ZERO
        } else {
            params.collateral_delta_amount
        };
        if withdrawn > collateral_before {
            return Err(EngineError::InsufficientCollateral {
                required: withdrawn,
                available: collateral_before,
            });
        }
        let mut collateral = collateral_before - withdrawn;
        let mut output_amount = withdrawn;
        let mut secondary_output_amount = Decimal::ZERO;

        // 5: gains out of the pool in the pnl token
        let gain_usd = realized.pnl_usd.max(Decimal::ZERO) + capped.impact_usd.max(Decimal::ZERO);
        let gain_amount = prices.token(pnl_leg).tokens_down(gain_usd);
        if gain_amount > Decimal::ZERO {
            tx.apply_delta(StoreKey::PoolAmount(market.id, pnl_token.clone()), -gain_amount)?;
            if same_token {
                output_amount += gain_amount;
            } else {
                secondary_output_amount += gain_amount;
            }
        }
        tx.apply_delta(StoreKey::PositionImpactPool(market.id), capped.impact_pool_delta)?;

        // 6: costs in the collateral token
        let loss_usd = (-realized.pnl_usd).max(Decimal::ZERO) + (-capped.impact_usd).max(Decimal::ZERO);
        let loss_amount = collateral_price.tokens_up(loss_usd);
        let cost = loss_amount + fees.total_cost_amount();

        let from_collateral = cost.min(collateral);
        collateral -= from_collateral;
        let from_output = (cost - from_collateral).min(output_amount);
        output_amount -= from_output;
        if from_collateral + from_output < cost {
            return Err(EngineError::InsufficientCollateral {
                required: cost,
                available: collateral_before + if same_token { gain_amount } else { Decimal::ZERO },
            });
        }
        if loss_amount > Decimal::ZERO {
            tx.apply_delta(StoreKey::PoolAmount(market.id, collateral_token.clone()), loss_amount)?;
        }

        // 7: closing hands back whatever collateral is left
        if is_full_close {
            output_amount += collateral;
            collateral = Decimal::ZERO;
        }

        position.collateral_amount = collateral;
        position.size_in_usd -= params.size_delta_usd;
        position.size_in_tokens -= realized.size_delta_in_tokens;
        position.borrowing_factor = fees.borrowing.latest_borrowing_factor;
        position.long_token_funding_amount_per_size = fees.funding.latest_long_token_funding_amount_per_size;
        position.short_token_funding_amount_per_size = fees.funding.latest_short_token_funding_amount_per_size;
        position.updated_at_block = self.current_block;

        tx.apply_delta(StoreKey::OpenInterest(market.id, collateral_token.clone(), side), -params.size_delta_usd)?;
        tx.apply_delta(
            StoreKey::OpenInterestInTokens(market.id, collateral_token.clone(), side),
            -realized.size_delta_in_tokens,
        )?;
        tx.apply_delta(
            StoreKey::CollateralSum(market.id, collateral_token.clone(), side),
            collateral - collateral_before,
        )?;
        route_position_fees(&mut tx, &mut log, market, collateral_token, account, &fees, FeeAction::PositionDecrease)?;

        let remaining = if position.is_empty() {
            tx.remove_position(&key);
            None
        } else {
            if let Some(violation) = check_collateral(&position, collateral_price, &config.collateral) {
                return Err(violation.into());
            }
            tx.set_position(position.clone());
            Some(position.clone())
        };

        log.push_event(EventPayload::PositionDecrease(PositionChangeEvent {
            market: market.id,
            account,
            collateral_token: collateral_token.clone(),
            side,
            execution_price,
            size_delta_usd: params.size_delta_usd,
            size_delta_in_tokens: realized.size_delta_in_tokens,
            collateral_delta_amount: withdrawn,
            price_impact_usd: capped.impact_usd,
            pnl_usd: realized.pnl_usd,
            size_in_usd: position.size_in_usd,
            size_in_tokens: position.size_in_tokens,
            collateral_amount: position.collateral_amount,
        }));

        let settlement = log.into_settlement(tx.into_write_set());
        self.commit(settlement)?;

        log::info!(
            "{:?} decreased {} {} by {} usd at {}, pnl {}",
            account,
            side,
            key.collateral_token,
            params.size_delta_usd,
            execution_price,
            realized.pnl_usd
        );
        Ok(PositionOutcome {
            key,
            execution_price,
            size_delta_usd: params.size_delta_usd,
            size_delta_in_tokens: realized.size_delta_in_tokens,
            price_impact_usd: capped.impact_usd,
            pnl_usd: realized.pnl_usd,
            fees,
            output_amount,
            secondary_output_amount,
            position: remaining,
        })
    }
}
