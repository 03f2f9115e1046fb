//! Deposit settlement: mint pool shares for paired tokens.

use super::core::{load_market, read_pool_snapshot, Engine};
use super::results::{DepositSettlement, EngineError};
use super::settlement::{route_fee, SettlementLog};
use crate::deposit::{apportion_impact, CreateDepositParams, DepositOutcome, DepositRefund, DepositRequest};
use crate::events::{
    DepositCreatedEvent, DepositExecutedEvent, EventPayload, FeeAction, FeesCollectedEvent, RequestCancelledEvent,
};
use crate::fees::{compute_fees, FeePurpose};
use crate::oracle::{MarketPrices, PriceOracle};
use crate::pool::usd_to_shares;
use crate::price_impact::{cap_impact, swap_impact_usd};
use crate::referral::ReferralInfo;
use crate::sinks::SettlementOutcome;
use crate::store::{KeyValueStore, MarketRecord, StoreExt, StoreKey, Transaction};
use crate::types::{AccountId, Leg, RequestId};
use rust_decimal::Decimal;

impl<S: KeyValueStore> Engine<S> {
    /// Record a deposit. The amounts are taken as already transferred in.
    pub fn create_deposit(&mut self, account: AccountId, params: CreateDepositParams) -> Result<RequestId, EngineError> {
        for amount in [params.long_token_amount, params.short_token_amount, params.min_pool_shares, params.execution_fee] {
            if amount < Decimal::ZERO {
                return Err(EngineError::InvalidAmount(amount));
            }
        }
        if params.long_token_amount.is_zero() && params.short_token_amount.is_zero() {
            return Err(EngineError::EmptyDeposit);
        }

        let mut tx = Transaction::new(&self.store);
        load_market(&tx, params.market)?;
        let id = RequestId(tx.next_nonce()?);
        let request = DepositRequest {
            id,
            account,
            receiver: params.receiver,
            market: params.market,
            long_token_amount: params.long_token_amount,
            short_token_amount: params.short_token_amount,
            min_pool_shares: params.min_pool_shares,
            execution_fee: params.execution_fee,
            callback: params.callback,
            created_at_block: self.current_block,
        };
        tx.set_deposit(request.clone());

        let mut log = SettlementLog::default();
        log.push_event(EventPayload::DepositCreated(DepositCreatedEvent {
            request: id,
            market: request.market,
            account,
            receiver: request.receiver,
            long_token_amount: request.long_token_amount,
            short_token_amount: request.short_token_amount,
            min_pool_shares: request.min_pool_shares,
        }));
        let settlement = log.into_settlement(tx.into_write_set());
        self.commit(settlement)?;
        Ok(id)
    }

    pub fn execute_deposit(&mut self, id: RequestId, oracle: &dyn PriceOracle) -> Result<DepositOutcome, EngineError> {
        let mut tx = Transaction::new(&self.store);
        let mut log = SettlementLog::default();

        let request = tx.deposit(id)?.ok_or(EngineError::DepositNotFound(id))?;
        let record = load_market(&tx, request.market)?;
        let market = &record.market;
        let prices = MarketPrices::resolve(oracle, market, record.config.index_price_source)?;
        prices.validate_block(request.created_at_block, self.current_block)?;
        self.advance_accrual(&mut tx, &record, &prices)?;

        // 1: impact over the combined deposit, apportioned by usd weight
        let snapshot = read_pool_snapshot(&tx, market)?;
        let long_usd = prices.long_token.usd_value(request.long_token_amount);
        let short_usd = prices.short_token.usd_value(request.short_token_amount);
        let price_impact_usd = swap_impact_usd(
            snapshot.leg_usd(Leg::Long, &prices),
            snapshot.leg_usd(Leg::Short, &prices),
            long_usd,
            short_usd,
            &record.config.swap_impact,
        );

        let referral = self.referrals.referral_info(request.account);
        let mut minted = Decimal::ZERO;
        for (leg, leg_usd) in [(Leg::Long, long_usd), (Leg::Short, short_usd)] {
            let amount = request.amount(leg);
            if amount.is_zero() {
                continue;
            }
            let impact_usd = apportion_impact(price_impact_usd, leg_usd, long_usd + short_usd);
            minted += deposit_leg(&mut tx, &mut log, &record, &prices, &request, leg, impact_usd, referral.as_ref())?;
        }

        if minted < request.min_pool_shares {
            return Err(EngineError::MinSharesNotMet {
                minted,
                minimum: request.min_pool_shares,
            });
        }

        tx.remove_deposit(id);
        log.push_event(EventPayload::DepositExecuted(DepositExecutedEvent {
            request: id,
            market: market.id,
            receiver: request.receiver,
            long_token_amount: request.long_token_amount,
            short_token_amount: request.short_token_amount,
            price_impact_usd,
            minted,
        }));

        let mut settlement = log.into_settlement(tx.into_write_set());
        settlement.callback = request
            .callback
            .map(|target| (target, SettlementOutcome::DepositExecuted { request: id, minted }));
        self.commit(settlement)?;

        log::info!("deposit {:?} executed: minted {} to {:?}", id, minted, request.receiver);
        Ok(DepositOutcome {
            request: id,
            receiver: request.receiver,
            minted,
            price_impact_usd,
        })
    }

    /// Return both raw amounts, whatever prices did since creation.
    pub fn cancel_deposit(&mut self, id: RequestId, reason: &str) -> Result<DepositRefund, EngineError> {
        let mut tx = Transaction::new(&self.store);
        let request = tx.deposit(id)?.ok_or(EngineError::DepositNotFound(id))?;
        tx.remove_deposit(id);

        let mut log = SettlementLog::default();
        log.push_event(EventPayload::DepositCancelled(RequestCancelledEvent {
            request: id,
            market: request.market,
            account: request.account,
            reason: reason.to_string(),
        }));
        let mut settlement = log.into_settlement(tx.into_write_set());
        settlement.callback = request.callback.map(|target| {
            (
                target,
                SettlementOutcome::DepositCancelled {
                    request: id,
                    reason: reason.to_string(),
                },
            )
        });
        self.commit(settlement)?;

        log::info!("deposit {:?} cancelled: {}", id, reason);
        Ok(DepositRefund {
            request: id,
            account: request.account,
            long_token_amount: request.long_token_amount,
            short_token_amount: request.short_token_amount,
            execution_fee: request.execution_fee,
        })
    }

    /// Execute, or cancel when execution fails for a reason a retry will not fix.
    pub fn execute_deposit_or_cancel(&mut self, id: RequestId, oracle: &dyn PriceOracle) -> Result<DepositSettlement, EngineError> {
        match self.execute_deposit(id, oracle) {
            Ok(outcome) => Ok(DepositSettlement::Executed(outcome)),
            Err(err) if err.is_retryable() => Err(err),
            Err(err @ EngineError::DepositNotFound(_)) => Err(err),
            Err(err) => {
                log::warn!("deposit {:?} failed, cancelling: {}", id, err);
                let refund = self.cancel_deposit(id, &err.to_string())?;
                Ok(DepositSettlement::Cancelled { refund, reason: err })
            }
        }
    }
}

// 8.4: one leg of a deposit. pool value and supply are read per leg, so the
// second leg prices against the state the first one left.
#[allow(clippy::too_many_arguments)]
fn deposit_leg<T: KeyValueStore + ?Sized>(
    tx: &mut T,
    log: &mut SettlementLog,
    record: &MarketRecord,
    prices: &MarketPrices,
    request: &DepositRequest,
    leg: Leg,
    impact_usd: Decimal,
    referral: Option<&ReferralInfo>,
) -> Result<Decimal, EngineError> {
    let market = &record.market;
    let token = market.token(leg);
    let price = prices.token(leg);
    let amount = request.amount(leg);

    let fees = compute_fees(amount, FeePurpose::Deposit, impact_usd > Decimal::ZERO, &record.config.fees, referral);

    let snapshot = read_pool_snapshot(tx, market)?;
    let pool_value_usd = snapshot.pool_value_usd(prices);
    let supply = snapshot.share_supply;
    let to_shares = |usd: Decimal| {
        usd_to_shares(usd, pool_value_usd, supply).ok_or(EngineError::InvalidPoolValue {
            market: market.id,
            pool_value_usd,
        })
    };

    let mut minted = Decimal::ZERO;
    let mut amount_after_fees = fees.amount_after_fees;

    if impact_usd > Decimal::ZERO {
        // paid in the other token, out of its swap impact pool
        let other = leg.opposite();
        let other_token = market.token(other);
        let other_price = prices.token(other);
        let impact_pool = tx.value(&StoreKey::SwapImpactPool(market.id, other_token.clone()))?;
        let capped = cap_impact(impact_usd, impact_pool, other_price);
        let drawn = -capped.impact_pool_delta;
        if drawn > Decimal::ZERO {
            tx.apply_delta(StoreKey::SwapImpactPool(market.id, other_token.clone()), capped.impact_pool_delta)?;
            tx.apply_delta(StoreKey::PoolAmount(market.id, other_token.clone()), drawn)?;
            minted += to_shares(other_price.usd_value(drawn))?;
        }
    } else if impact_usd < Decimal::ZERO {
        let capped = cap_impact(impact_usd, Decimal::ZERO, price);
        let impact_amount = capped.impact_pool_delta;
        if impact_amount > amount_after_fees {
            return Err(EngineError::PriceImpactLargerThanOrderSize {
                impact_usd,
                size_delta_usd: price.usd_value(amount),
            });
        }
        amount_after_fees -= impact_amount;
        tx.apply_delta(StoreKey::SwapImpactPool(market.id, token.clone()), impact_amount)?;
    }

    minted += to_shares(price.usd_value(amount_after_fees))?;
    tx.apply_delta(StoreKey::PoolAmount(market.id, token.clone()), amount_after_fees + fees.fee_amount_for_pool)?;

    if minted > Decimal::ZERO {
        tx.apply_delta(StoreKey::ShareSupply(market.id), minted)?;
        tx.apply_delta(StoreKey::ShareBalance(market.id, request.receiver), minted)?;
    }

    route_fee(tx, log, market, token, request.account, &fees)?;
    log.push_event(EventPayload::FeesCollected(FeesCollectedEvent {
        market: market.id,
        asset: token.clone(),
        action: FeeAction::Deposit,
        fee_receiver_amount: fees.fee_receiver_amount,
        fee_amount_for_pool: fees.fee_amount_for_pool,
        borrowing_fee_amount: Decimal::ZERO,
        funding_fee_amount: Decimal::ZERO,
    }));
    Ok(minted)
}
