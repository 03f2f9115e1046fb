//! Commit path shared by every settlement.
//!
//! Planning runs against a `Transaction` and produces a [`Settlement`]. Commit
//! hands the fee batch to the receiver first, since that is the only step that
//! can still fail. Then the write set lands, events go out, and finally the
//! callback runs, whose failure is only logged.

use super::core::Engine;
use super::results::EngineError;
use crate::events::{
    AffiliateRewardEvent, CallbackFailedEvent, EventPayload, FeeAction, FeesCollectedEvent,
};
use crate::fees::{FeeBreakdown, PositionFees};
use crate::market::Market;
use crate::sinks::{FeeTransfer, SettlementOutcome};
use crate::store::{KeyValueStore, StoreExt, StoreKey, WriteSet};
use crate::types::{AccountId, AssetId, Leg};
use rust_decimal::Decimal;

#[derive(Debug)]
pub(super) struct Settlement {
    pub(super) write_set: WriteSet,
    pub(super) fee_transfers: Vec<FeeTransfer>,
    pub(super) events: Vec<EventPayload>,
    pub(super) callback: Option<(AccountId, SettlementOutcome)>,
}

/// Fee transfers and events gathered while planning.
#[derive(Debug, Default)]
pub(super) struct SettlementLog {
    pub(super) fee_transfers: Vec<FeeTransfer>,
    pub(super) events: Vec<EventPayload>,
}

impl SettlementLog {
    pub(super) fn into_settlement(self, write_set: WriteSet) -> Settlement {
        Settlement {
            write_set,
            fee_transfers: self.fee_transfers,
            events: self.events,
            callback: None,
        }
    }

    pub(super) fn push_fee(&mut self, market: &Market, asset: &AssetId, amount: Decimal) {
        if amount > Decimal::ZERO {
            self.fee_transfers.push(FeeTransfer {
                market: market.id,
                asset: asset.clone(),
                amount,
            });
        }
    }

    pub(super) fn push_event(&mut self, payload: EventPayload) {
        self.events.push(payload);
    }
}

// 8.3: routing of a fee split. the receiver share leaves through the batch,
// the affiliate reward stays in the market as a claimable balance.
pub(super) fn route_fee<T: KeyValueStore + ?Sized>(
    tx: &mut T,
    log: &mut SettlementLog,
    market: &Market,
    asset: &AssetId,
    trader: AccountId,
    fees: &FeeBreakdown,
) -> Result<(), EngineError> {
    log.push_fee(market, asset, fees.fee_receiver_amount);

    if let Some(affiliate) = fees.affiliate {
        if fees.affiliate_reward_amount > Decimal::ZERO {
            tx.apply_delta(
                StoreKey::AffiliateReward(market.id, asset.clone(), affiliate),
                fees.affiliate_reward_amount,
            )?;
        }
        log.push_event(EventPayload::AffiliateRewardRouted(AffiliateRewardEvent {
            market: market.id,
            asset: asset.clone(),
            trader,
            affiliate,
            affiliate_reward_amount: fees.affiliate_reward_amount,
            trader_discount_amount: fees.trader_discount_amount,
        }));
    }
    Ok(())
}

/// Routes everything a position interaction owes, and credits its claimable funding.
pub(super) fn route_position_fees<T: KeyValueStore + ?Sized>(
    tx: &mut T,
    log: &mut SettlementLog,
    market: &Market,
    collateral_token: &AssetId,
    trader: AccountId,
    fees: &PositionFees,
    action: FeeAction,
) -> Result<(), EngineError> {
    route_fee(tx, log, market, collateral_token, trader, &fees.position_fee)?;
    log.push_fee(market, collateral_token, fees.borrowing.fee_receiver_amount);

    let for_pool = fees.fee_amount_for_pool();
    if for_pool > Decimal::ZERO {
        tx.apply_delta(StoreKey::PoolAmount(market.id, collateral_token.clone()), for_pool)?;
    }

    for leg in Leg::ALL {
        let claimable = fees.funding.claimable_amount(leg);
        if claimable > Decimal::ZERO {
            tx.apply_delta(
                StoreKey::ClaimableFunding(market.id, market.token(leg).clone(), trader),
                claimable,
            )?;
        }
    }

    log.push_event(EventPayload::FeesCollected(FeesCollectedEvent {
        market: market.id,
        asset: collateral_token.clone(),
        action,
        fee_receiver_amount: fees.fee_receiver_amount(),
        fee_amount_for_pool: for_pool,
        borrowing_fee_amount: fees.borrowing.borrowing_fee_amount,
        funding_fee_amount: fees.funding.funding_fee_amount,
    }));
    Ok(())
}

impl<S: KeyValueStore> Engine<S> {
    pub(super) fn commit(&mut self, settlement: Settlement) -> Result<(), EngineError> {
        let Settlement {
            write_set,
            fee_transfers,
            events,
            callback,
        } = settlement;

        if !fee_transfers.is_empty() {
            // refusal drops the write set: nothing of this settlement lands
            self.fee_receiver.accept(&fee_transfers)?;
        }

        log::trace!("committing {} writes", write_set.len());
        write_set.apply_to(&mut self.store);

        for payload in events {
            self.emit_event(payload);
        }

        if let Some((target, outcome)) = callback {
            if let Err(err) = self.callbacks.on_settlement(target, &outcome) {
                log::warn!("callback to {:?} failed: {}", target, err);
                self.emit_event(EventPayload::CallbackFailed(CallbackFailedEvent {
                    target,
                    reason: err.to_string(),
                }));
            }
        }
        Ok(())
    }
}
