// 11.0: every committed settlement produces events. used for audit trails and for
// notifying external systems. the EventPayload enum lists all event types.
// events are only built from committed plans, so a failed settlement emits nothing.

use crate::types::{AccountId, AssetId, BlockNumber, MarketId, Price, RequestId, Side, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub block: BlockNumber,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, block: BlockNumber, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            block,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    // Pool events
    DepositCreated(DepositCreatedEvent),
    DepositExecuted(DepositExecutedEvent),
    DepositCancelled(RequestCancelledEvent),
    WithdrawalCreated(WithdrawalCreatedEvent),
    WithdrawalExecuted(WithdrawalExecutedEvent),
    WithdrawalCancelled(RequestCancelledEvent),

    // Fee events
    FeesCollected(FeesCollectedEvent),
    AffiliateRewardRouted(AffiliateRewardEvent),

    // Position events
    PositionIncrease(PositionChangeEvent),
    PositionDecrease(PositionChangeEvent),

    // Claims
    FundingFeesClaimed(ClaimEvent),
    AffiliateRewardClaimed(ClaimEvent),

    // Collaborator events
    CallbackFailed(CallbackFailedEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositCreatedEvent {
    pub request: RequestId,
    pub market: MarketId,
    pub account: AccountId,
    pub receiver: AccountId,
    pub long_token_amount: Decimal,
    pub short_token_amount: Decimal,
    pub min_pool_shares: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositExecutedEvent {
    pub request: RequestId,
    pub market: MarketId,
    pub receiver: AccountId,
    pub long_token_amount: Decimal,
    pub short_token_amount: Decimal,
    pub price_impact_usd: Decimal,
    pub minted: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestCancelledEvent {
    pub request: RequestId,
    pub market: MarketId,
    pub account: AccountId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalCreatedEvent {
    pub request: RequestId,
    pub market: MarketId,
    pub account: AccountId,
    pub receiver: AccountId,
    pub pool_shares: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalExecutedEvent {
    pub request: RequestId,
    pub market: MarketId,
    pub receiver: AccountId,
    pub burned: Decimal,
    pub long_token_amount: Decimal,
    pub short_token_amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeAction {
    Deposit,
    Withdrawal,
    PositionIncrease,
    PositionDecrease,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeesCollectedEvent {
    pub market: MarketId,
    pub asset: AssetId,
    pub action: FeeAction,
    pub fee_receiver_amount: Decimal,
    pub fee_amount_for_pool: Decimal,
    pub borrowing_fee_amount: Decimal,
    pub funding_fee_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffiliateRewardEvent {
    pub market: MarketId,
    pub asset: AssetId,
    pub trader: AccountId,
    pub affiliate: AccountId,
    pub affiliate_reward_amount: Decimal,
    pub trader_discount_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionChangeEvent {
    pub market: MarketId,
    pub account: AccountId,
    pub collateral_token: AssetId,
    pub side: Side,
    pub execution_price: Price,
    pub size_delta_usd: Decimal,
    pub size_delta_in_tokens: Decimal,
    pub collateral_delta_amount: Decimal,
    pub price_impact_usd: Decimal,
    // realized pnl, zero on increase
    pub pnl_usd: Decimal,
    pub size_in_usd: Decimal,
    pub size_in_tokens: Decimal,
    pub collateral_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimEvent {
    pub market: MarketId,
    pub asset: AssetId,
    pub account: AccountId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackFailedEvent {
    pub target: AccountId,
    pub reason: String,
}

/// Subscriber for committed events. Fire-and-forget: it cannot fail a settlement.
pub trait EventEmitter: fmt::Debug {
    fn emit(&mut self, event: &Event);
}

// collects everything it is sent. handy in tests and the simulator
#[derive(Debug, Clone, Default)]
pub struct EventCollector {
    pub events: Vec<Event>,
}

impl EventEmitter for EventCollector {
    fn emit(&mut self, event: &Event) {
        self.events.push(event.clone());
    }
}

impl<T: EventEmitter> EventEmitter for Arc<Mutex<T>> {
    fn emit(&mut self, event: &Event) {
        match self.lock() {
            Ok(mut inner) => inner.emit(event),
            Err(_) => log::warn!("event subscriber lock poisoned, dropping {:?}", event.id),
        }
    }
}
