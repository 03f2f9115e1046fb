// 8.0 engine/core.rs: main engine. owns the store, the collaborators and the event log.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::config::MarketConfig;
use crate::deposit::DepositRequest;
use crate::events::{Event, EventEmitter, EventId, EventPayload};
use crate::funding::{AccrualPolicy, OpenInterestSplit, UtilizationPolicy};
use crate::market::{Market, MarketError};
use crate::oracle::{MarketPrices, PriceOracle};
use crate::pool::{share_price, PoolSnapshot};
use crate::position::{Position, PositionKey};
use crate::referral::{ReferralRegistry, ReferralTier};
use crate::sinks::{FeeReceiver, FeeVault, NoopCallback, SettlementCallback};
use crate::store::{KeyValueStore, MarketRecord, MemoryStore, StoreError, StoreExt, StoreKey};
use crate::types::{AccountId, AssetId, BlockNumber, Leg, MarketId, RequestId, Side, Timestamp};
use crate::withdrawal::WithdrawalRequest;
use rust_decimal::Decimal;

/** 8.1: main engine struct. all market state lives in the store */
#[derive(Debug)]
pub struct Engine<S: KeyValueStore = MemoryStore> {
    pub(super) config: EngineConfig,
    pub(super) store: S,
    pub(super) current_block: BlockNumber,
    pub(super) referrals: ReferralRegistry,
    pub(super) accrual_policy: Box<dyn AccrualPolicy>,
    pub(super) fee_receiver: Box<dyn FeeReceiver>,
    pub(super) callbacks: Box<dyn SettlementCallback>,
    pub(super) subscriber: Option<Box<dyn EventEmitter>>,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
}

impl Engine<MemoryStore> {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_store(config, MemoryStore::new())
    }
}

impl<S: KeyValueStore> Engine<S> {
    pub fn with_store(config: EngineConfig, store: S) -> Self {
        Self {
            config,
            store,
            current_block: BlockNumber(0),
            referrals: ReferralRegistry::new(),
            accrual_policy: Box::new(UtilizationPolicy),
            fee_receiver: Box::new(FeeVault::new()),
            callbacks: Box::new(NoopCallback),
            subscriber: None,
            events: Vec::new(),
            next_event_id: 1,
        }
    }

    pub fn set_accrual_policy(&mut self, policy: Box<dyn AccrualPolicy>) {
        self.accrual_policy = policy;
    }

    pub fn set_fee_receiver(&mut self, receiver: Box<dyn FeeReceiver>) {
        self.fee_receiver = receiver;
    }

    pub fn set_callbacks(&mut self, callbacks: Box<dyn SettlementCallback>) {
        self.callbacks = callbacks;
    }

    pub fn set_subscriber(&mut self, subscriber: Box<dyn EventEmitter>) {
        self.subscriber = Some(subscriber);
    }

    pub fn set_block(&mut self, block: BlockNumber) {
        self.current_block = block;
    }

    pub fn block(&self) -> BlockNumber {
        self.current_block
    }

    pub fn advance_blocks(&mut self, blocks: u64) {
        self.current_block = BlockNumber(self.current_block.0 + blocks);
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn referrals(&self) -> &ReferralRegistry {
        &self.referrals
    }

    pub fn set_referral_tier(&mut self, tier_id: u32, tier: ReferralTier) -> Result<(), EngineError> {
        self.referrals.set_tier(tier_id, tier)?;
        log::info!("referral tier {} set", tier_id);
        Ok(())
    }

    pub fn set_affiliate_tier(&mut self, affiliate: AccountId, tier_id: u32) -> Result<(), EngineError> {
        self.referrals.set_affiliate_tier(affiliate, tier_id)?;
        log::info!("affiliate {:?} moved to tier {}", affiliate, tier_id);
        Ok(())
    }

    /// Link a trader to the affiliate whose code they used.
    pub fn set_referrer(&mut self, trader: AccountId, affiliate: AccountId) -> Result<(), EngineError> {
        self.referrals.set_referrer(trader, affiliate)?;
        log::info!("trader {:?} referred by {:?}", trader, affiliate);
        Ok(())
    }

    pub fn add_market(&mut self, market: Market, config: MarketConfig) -> Result<MarketId, EngineError> {
        market.validate()?;
        config.validate()?;
        if self.store.market(market.id)?.is_some() {
            return Err(MarketError::AlreadyExists(market.id).into());
        }

        let market_id = market.id;
        log::info!("market {:?} added: index {} pool {}/{}", market_id, market.index_token, market.long_token, market.short_token);
        self.store.set_market(MarketRecord { market, config });
        Ok(market_id)
    }

    pub fn market(&self, market_id: MarketId) -> Result<MarketRecord, EngineError> {
        load_market(&self.store, market_id)
    }

    pub fn position(&self, key: &PositionKey) -> Result<Option<Position>, EngineError> {
        Ok(self.store.position(key)?)
    }

    pub fn deposit_request(&self, id: RequestId) -> Result<Option<DepositRequest>, EngineError> {
        Ok(self.store.deposit(id)?)
    }

    pub fn withdrawal_request(&self, id: RequestId) -> Result<Option<WithdrawalRequest>, EngineError> {
        Ok(self.store.withdrawal(id)?)
    }

    pub fn pool_amount(&self, market_id: MarketId, leg: Leg) -> Result<Decimal, EngineError> {
        let record = self.market(market_id)?;
        Ok(self.store.value(&StoreKey::PoolAmount(market_id, record.market.token(leg).clone()))?)
    }

    pub fn collateral_sum(&self, market_id: MarketId, asset: &AssetId, side: Side) -> Result<Decimal, EngineError> {
        Ok(self.store.value(&StoreKey::CollateralSum(market_id, asset.clone(), side))?)
    }

    pub fn swap_impact_pool(&self, market_id: MarketId, leg: Leg) -> Result<Decimal, EngineError> {
        let record = self.market(market_id)?;
        Ok(self.store.value(&StoreKey::SwapImpactPool(market_id, record.market.token(leg).clone()))?)
    }

    pub fn position_impact_pool(&self, market_id: MarketId) -> Result<Decimal, EngineError> {
        Ok(self.store.value(&StoreKey::PositionImpactPool(market_id))?)
    }

    pub fn share_supply(&self, market_id: MarketId) -> Result<Decimal, EngineError> {
        Ok(self.store.value(&StoreKey::ShareSupply(market_id))?)
    }

    pub fn share_balance(&self, market_id: MarketId, account: AccountId) -> Result<Decimal, EngineError> {
        Ok(self.store.value(&StoreKey::ShareBalance(market_id, account))?)
    }

    pub fn cumulative_borrowing_factor(&self, market_id: MarketId, side: Side) -> Result<Decimal, EngineError> {
        Ok(self.store.value(&StoreKey::CumulativeBorrowingFactor(market_id, side))?)
    }

    pub fn funding_amount_per_size(&self, market_id: MarketId, leg: Leg, side: Side) -> Result<Decimal, EngineError> {
        let record = self.market(market_id)?;
        let key = StoreKey::FundingAmountPerSize(market_id, record.market.token(leg).clone(), side);
        Ok(self.store.value(&key)?)
    }

    pub fn claimable_funding(&self, market_id: MarketId, asset: &AssetId, account: AccountId) -> Result<Decimal, EngineError> {
        Ok(self.store.value(&StoreKey::ClaimableFunding(market_id, asset.clone(), account))?)
    }

    pub fn affiliate_reward(&self, market_id: MarketId, asset: &AssetId, affiliate: AccountId) -> Result<Decimal, EngineError> {
        Ok(self.store.value(&StoreKey::AffiliateReward(market_id, asset.clone(), affiliate))?)
    }

    pub fn pool_snapshot(&self, market_id: MarketId) -> Result<PoolSnapshot, EngineError> {
        let record = self.market(market_id)?;
        Ok(read_pool_snapshot(&self.store, &record.market)?)
    }

    /// Pool value at the oracle's current prices. Read-only: no accrual is advanced.
    pub fn pool_value_usd(&self, market_id: MarketId, oracle: &dyn PriceOracle) -> Result<Decimal, EngineError> {
        let record = self.market(market_id)?;
        let prices = MarketPrices::resolve(oracle, &record.market, record.config.index_price_source)?;
        let snapshot = read_pool_snapshot(&self.store, &record.market)?;
        Ok(snapshot.pool_value_usd(&prices))
    }

    /// Usd value of one pool share, None while the pool is empty.
    pub fn share_price(&self, market_id: MarketId, oracle: &dyn PriceOracle) -> Result<Option<Decimal>, EngineError> {
        let record = self.market(market_id)?;
        let prices = MarketPrices::resolve(oracle, &record.market, record.config.index_price_source)?;
        let snapshot = read_pool_snapshot(&self.store, &record.market)?;
        Ok(share_price(snapshot.pool_value_usd(&prices), snapshot.share_supply))
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), Timestamp::now(), self.current_block, payload);
        self.next_event_id += 1;

        log::debug!("[Event {}] {:?}", event.id.0, event.payload);
        if let Some(subscriber) = self.subscriber.as_mut() {
            subscriber.emit(&event);
        }

        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }
}

// 8.2: store readers shared by every settlement path

pub(super) fn load_market<T: KeyValueStore + ?Sized>(store: &T, market_id: MarketId) -> Result<MarketRecord, EngineError> {
    store.market(market_id)?.ok_or(EngineError::MarketNotFound(market_id))
}

pub(super) fn read_open_interest<T: KeyValueStore + ?Sized>(store: &T, market: &Market) -> Result<OpenInterestSplit, StoreError> {
    let mut split = OpenInterestSplit::default();
    for leg in Leg::ALL {
        for side in Side::ALL {
            let key = StoreKey::OpenInterest(market.id, market.token(leg).clone(), side);
            split.set(leg, side, store.value(&key)?);
        }
    }
    Ok(split)
}

pub(super) fn read_pool_snapshot<T: KeyValueStore + ?Sized>(store: &T, market: &Market) -> Result<PoolSnapshot, StoreError> {
    let id = market.id;
    let sum_over_collateral = |side: Side, tokens: bool| -> Result<Decimal, StoreError> {
        let mut total = Decimal::ZERO;
        for leg in Leg::ALL {
            let asset = market.token(leg).clone();
            let key = if tokens {
                StoreKey::OpenInterestInTokens(id, asset, side)
            } else {
                StoreKey::OpenInterest(id, asset, side)
            };
            total += store.value(&key)?;
        }
        Ok(total)
    };

    Ok(PoolSnapshot {
        long_token_amount: store.value(&StoreKey::PoolAmount(id, market.long_token.clone()))?,
        short_token_amount: store.value(&StoreKey::PoolAmount(id, market.short_token.clone()))?,
        position_impact_pool_amount: store.value(&StoreKey::PositionImpactPool(id))?,
        long_open_interest_usd: sum_over_collateral(Side::Long, false)?,
        long_open_interest_in_tokens: sum_over_collateral(Side::Long, true)?,
        short_open_interest_usd: sum_over_collateral(Side::Short, false)?,
        short_open_interest_in_tokens: sum_over_collateral(Side::Short, true)?,
        share_supply: store.value(&StoreKey::ShareSupply(id))?,
    })
}
