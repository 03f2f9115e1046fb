//! Withdrawal settlement: burn pool shares for both pooled tokens.

use super::core::{load_market, read_pool_snapshot, Engine};
use super::results::{EngineError, WithdrawalSettlement};
use super::settlement::{route_fee, SettlementLog};
use crate::events::{
    EventPayload, FeeAction, FeesCollectedEvent, RequestCancelledEvent, WithdrawalCreatedEvent, WithdrawalExecutedEvent,
};
use crate::fees::{compute_fees, FeePurpose};
use crate::oracle::{MarketPrices, PriceOracle};
use crate::pool::shares_to_usd;
use crate::risk::check_reserve;
use crate::sinks::SettlementOutcome;
use crate::store::{KeyValueStore, StoreExt, StoreKey, Transaction};
use crate::types::{AccountId, Leg, RequestId, Side};
use crate::withdrawal::{split_withdrawal_usd, CreateWithdrawalParams, WithdrawalOutcome, WithdrawalRefund, WithdrawalRequest};
use rust_decimal::Decimal;

impl<S: KeyValueStore> Engine<S> {
    /// Escrow shares from the account's balance and record the withdrawal.
    pub fn create_withdrawal(&mut self, account: AccountId, params: CreateWithdrawalParams) -> Result<RequestId, EngineError> {
        for amount in [params.min_long_token_amount, params.min_short_token_amount, params.execution_fee] {
            if amount < Decimal::ZERO {
                return Err(EngineError::InvalidAmount(amount));
            }
        }
        if params.pool_shares <= Decimal::ZERO {
            return Err(EngineError::EmptyWithdrawal);
        }

        let mut tx = Transaction::new(&self.store);
        load_market(&tx, params.market)?;

        let balance_key = StoreKey::ShareBalance(params.market, account);
        let balance = tx.value(&balance_key)?;
        if balance < params.pool_shares {
            return Err(EngineError::InsufficientShareBalance {
                balance,
                requested: params.pool_shares,
            });
        }
        tx.apply_delta(balance_key, -params.pool_shares)?;

        let id = RequestId(tx.next_nonce()?);
        let request = WithdrawalRequest {
            id,
            account,
            receiver: params.receiver,
            market: params.market,
            pool_shares: params.pool_shares,
            min_long_token_amount: params.min_long_token_amount,
            min_short_token_amount: params.min_short_token_amount,
            execution_fee: params.execution_fee,
            callback: params.callback,
            created_at_block: self.current_block,
        };
        tx.set_withdrawal(request.clone());

        let mut log = SettlementLog::default();
        log.push_event(EventPayload::WithdrawalCreated(WithdrawalCreatedEvent {
            request: id,
            market: request.market,
            account,
            receiver: request.receiver,
            pool_shares: request.pool_shares,
        }));
        let settlement = log.into_settlement(tx.into_write_set());
        self.commit(settlement)?;
        Ok(id)
    }

    pub fn execute_withdrawal(&mut self, id: RequestId, oracle: &dyn PriceOracle) -> Result<WithdrawalOutcome, EngineError> {
        let mut tx = Transaction::new(&self.store);
        let mut log = SettlementLog::default();

        let request = tx.withdrawal(id)?.ok_or(EngineError::WithdrawalNotFound(id))?;
        let record = load_market(&tx, request.market)?;
        let market = &record.market;
        let prices = MarketPrices::resolve(oracle, market, record.config.index_price_source)?;
        prices.validate_block(request.created_at_block, self.current_block)?;
        self.advance_accrual(&mut tx, &record, &prices)?;

        let snapshot = read_pool_snapshot(&tx, market)?;
        let pool_value_usd = snapshot.pool_value_usd(&prices);
        let redeemed_usd = shares_to_usd(request.pool_shares, pool_value_usd, snapshot.share_supply).ok_or(
            EngineError::InvalidPoolValue {
                market: market.id,
                pool_value_usd,
            },
        )?;
        let (long_usd, short_usd) = split_withdrawal_usd(
            redeemed_usd,
            snapshot.leg_usd(Leg::Long, &prices),
            snapshot.leg_usd(Leg::Short, &prices),
        );

        let referral = self.referrals.referral_info(request.account);
        let mut outputs = [Decimal::ZERO; 2];
        for (i, (leg, leg_usd)) in [(Leg::Long, long_usd), (Leg::Short, short_usd)].into_iter().enumerate() {
            let token = market.token(leg);
            let gross = prices.token(leg).tokens_down(leg_usd);
            let fees = compute_fees(gross, FeePurpose::Withdrawal, false, &record.config.fees, referral.as_ref());

            if fees.amount_after_fees < request.min_amount(leg) {
                return Err(EngineError::InsufficientOutputAmount {
                    asset: token.clone(),
                    amount: fees.amount_after_fees,
                    minimum: request.min_amount(leg),
                });
            }

            // the pool's fee share never leaves the pool
            tx.apply_delta(StoreKey::PoolAmount(market.id, token.clone()), -(gross - fees.fee_amount_for_pool))?;
            route_fee(&mut tx, &mut log, market, token, request.account, &fees)?;
            log.push_event(EventPayload::FeesCollected(FeesCollectedEvent {
                market: market.id,
                asset: token.clone(),
                action: FeeAction::Withdrawal,
                fee_receiver_amount: fees.fee_receiver_amount,
                fee_amount_for_pool: fees.fee_amount_for_pool,
                borrowing_fee_amount: Decimal::ZERO,
                funding_fee_amount: Decimal::ZERO,
            }));
            outputs[i] = fees.amount_after_fees;
        }

        tx.apply_delta(StoreKey::ShareSupply(market.id), -request.pool_shares)?;

        // open interest must stay coverable by what is left
        let after = read_pool_snapshot(&tx, market)?;
        for side in Side::ALL {
            if let Some(violation) = check_reserve(&after, side, &prices, &record.config.reserve) {
                return Err(violation.into());
            }
        }

        tx.remove_withdrawal(id);
        let outcome = WithdrawalOutcome {
            request: id,
            receiver: request.receiver,
            burned: request.pool_shares,
            long_token_amount: outputs[0],
            short_token_amount: outputs[1],
        };
        log.push_event(EventPayload::WithdrawalExecuted(WithdrawalExecutedEvent {
            request: id,
            market: market.id,
            receiver: request.receiver,
            burned: outcome.burned,
            long_token_amount: outcome.long_token_amount,
            short_token_amount: outcome.short_token_amount,
        }));

        let mut settlement = log.into_settlement(tx.into_write_set());
        settlement.callback = request.callback.map(|target| {
            (
                target,
                SettlementOutcome::WithdrawalExecuted {
                    request: id,
                    long_token_amount: outcome.long_token_amount,
                    short_token_amount: outcome.short_token_amount,
                },
            )
        });
        self.commit(settlement)?;

        log::info!(
            "withdrawal {:?} executed: burned {} for {} long / {} short",
            id,
            outcome.burned,
            outcome.long_token_amount,
            outcome.short_token_amount
        );
        Ok(outcome)
    }

    /// Return the escrowed shares to the account.
    pub fn cancel_withdrawal(&mut self, id: RequestId, reason: &str) -> Result<WithdrawalRefund, EngineError> {
        let mut tx = Transaction::new(&self.store);
        let request = tx.withdrawal(id)?.ok_or(EngineError::WithdrawalNotFound(id))?;
        tx.apply_delta(StoreKey::ShareBalance(request.market, request.account), request.pool_shares)?;
        tx.remove_withdrawal(id);

        let mut log = SettlementLog::default();
        log.push_event(EventPayload::WithdrawalCancelled(RequestCancelledEvent {
            request: id,
            market: request.market,
            account: request.account,
            reason: reason.to_string(),
        }));
        let mut settlement = log.into_settlement(tx.into_write_set());
        settlement.callback = request.callback.map(|target| {
            (
                target,
                SettlementOutcome::WithdrawalCancelled {
                    request: id,
                    reason: reason.to_string(),
                },
            )
        });
        self.commit(settlement)?;

        log::info!("withdrawal {:?} cancelled: {}", id, reason);
        Ok(WithdrawalRefund {
            request: id,
            account: request.account,
            pool_shares: request.pool_shares,
            execution_fee: request.execution_fee,
        })
    }

    pub fn execute_withdrawal_or_cancel(
        &mut self,
        id: RequestId,
        oracle: &dyn PriceOracle,
    ) -> Result<WithdrawalSettlement, EngineError> {
        match self.execute_withdrawal(id, oracle) {
            Ok(outcome) => Ok(WithdrawalSettlement::Executed(outcome)),
            Err(err) if err.is_retryable() => Err(err),
            Err(err @ EngineError::WithdrawalNotFound(_)) => Err(err),
            Err(err) => {
                log::warn!("withdrawal {:?} failed, cancelling: {}", id, err);
                let refund = self.cancel_withdrawal(id, &err.to_string())?;
                Ok(WithdrawalSettlement::Cancelled { refund, reason: err })
            }
        }
    }
}
