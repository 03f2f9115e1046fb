//! Keyed state store.
//!
//! All market state lives behind [`KeyValueStore`]. Keys are a closed enum
//! built from identifying fields, so two records can never collide. Numeric
//! accumulators change only through [`StoreExt::apply_delta`]; nothing assigns
//! them directly.
//!
//! A [`Transaction`] overlays a store and buffers every write. Settlement runs
//! entirely inside one, then either drops it or applies the [`WriteSet`] in one
//! infallible step.

use crate::config::MarketConfig;
use crate::deposit::DepositRequest;
use crate::market::Market;
use crate::position::{Position, PositionKey};
use crate::types::{AccountId, AssetId, BlockNumber, MarketId, RequestId, Side};
use crate::withdrawal::WithdrawalRequest;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreKey {
    Market(MarketId),
    PoolAmount(MarketId, AssetId),
    SwapImpactPool(MarketId, AssetId),
    // index-token units
    PositionImpactPool(MarketId),
    CollateralSum(MarketId, AssetId, Side),
    OpenInterest(MarketId, AssetId, Side),
    OpenInterestInTokens(MarketId, AssetId, Side),
    CumulativeBorrowingFactor(MarketId, Side),
    FundingAmountPerSize(MarketId, AssetId, Side),
    LastAccrualBlock(MarketId),
    ClaimableFunding(MarketId, AssetId, AccountId),
    AffiliateReward(MarketId, AssetId, AccountId),
    ShareSupply(MarketId),
    ShareBalance(MarketId, AccountId),
    Position(PositionKey),
    Deposit(RequestId),
    Withdrawal(RequestId),
    Nonce,
}

impl StoreKey {
    // receivers of funding move their accumulator down, so it may go below zero
    pub fn allows_negative(&self) -> bool {
        matches!(self, StoreKey::FundingAmountPerSize(..))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRecord {
    pub market: Market,
    pub config: MarketConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    Value(Decimal),
    Block(BlockNumber),
    Counter(u64),
    Market(Box<MarketRecord>),
    Position(Box<Position>),
    Deposit(Box<DepositRequest>),
    Withdrawal(Box<WithdrawalRequest>),
}

pub trait KeyValueStore {
    fn get(&self, key: &StoreKey) -> Option<Record>;
    fn set(&mut self, key: StoreKey, record: Record);
    fn remove(&mut self, key: &StoreKey) -> Option<Record>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: HashMap<StoreKey, Record>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StoreKey, &Record)> {
        self.records.iter()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &StoreKey) -> Option<Record> {
        self.records.get(key).cloned()
    }

    fn set(&mut self, key: StoreKey, record: Record) {
        self.records.insert(key, record);
    }

    fn remove(&mut self, key: &StoreKey) -> Option<Record> {
        self.records.remove(key)
    }
}

/// Buffered writes over a read-only base store.
#[derive(Debug)]
pub struct Transaction<'s, S: KeyValueStore + ?Sized> {
    base: &'s S,
    writes: HashMap<StoreKey, Option<Record>>,
}

impl<'s, S: KeyValueStore + ?Sized> Transaction<'s, S> {
    pub fn new(base: &'s S) -> Self {
        Self {
            base,
            writes: HashMap::new(),
        }
    }

    pub fn is_dirty(&self) -> bool {
        !self.writes.is_empty()
    }

    pub fn into_write_set(self) -> WriteSet {
        WriteSet {
            writes: self.writes.into_iter().collect(),
        }
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Transaction<'_, S> {
    fn get(&self, key: &StoreKey) -> Option<Record> {
        match self.writes.get(key) {
            Some(buffered) => buffered.clone(),
            None => self.base.get(key),
        }
    }

    fn set(&mut self, key: StoreKey, record: Record) {
        self.writes.insert(key, Some(record));
    }

    fn remove(&mut self, key: &StoreKey) -> Option<Record> {
        let previous = self.get(key);
        self.writes.insert(key.clone(), None);
        previous
    }
}

/// Writes of a finished transaction, detached from the borrow of the base.
#[derive(Debug, Clone, Default)]
pub struct WriteSet {
    writes: Vec<(StoreKey, Option<Record>)>,
}

impl WriteSet {
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn apply_to<S: KeyValueStore + ?Sized>(self, store: &mut S) {
        for (key, record) in self.writes {
            match record {
                Some(record) => store.set(key, record),
                None => {
                    store.remove(&key);
                }
            }
        }
    }
}

/// Typed accessors over any store. Misuse of a key shows up as `UnexpectedRecord`.
pub trait StoreExt: KeyValueStore {
    fn value(&self, key: &StoreKey) -> Result<Decimal, StoreError> {
        match self.get(key) {
            None => Ok(Decimal::ZERO),
            Some(Record::Value(value)) => Ok(value),
            Some(_) => Err(StoreError::UnexpectedRecord(key.clone())),
        }
    }

    /// The only way an accumulator changes. Returns the new value.
    fn apply_delta(&mut self, key: StoreKey, delta: Decimal) -> Result<Decimal, StoreError> {
        let current = self.value(&key)?;
        let next = current + delta;
        if next < Decimal::ZERO && !key.allows_negative() {
            return Err(StoreError::NegativeBalance { key, current, delta });
        }
        if !delta.is_zero() {
            self.set(key, Record::Value(next));
        }
        Ok(next)
    }

    fn block(&self, key: &StoreKey) -> Result<Option<BlockNumber>, StoreError> {
        match self.get(key) {
            None => Ok(None),
            Some(Record::Block(block)) => Ok(Some(block)),
            Some(_) => Err(StoreError::UnexpectedRecord(key.clone())),
        }
    }

    fn set_block(&mut self, key: StoreKey, block: BlockNumber) {
        self.set(key, Record::Block(block));
    }

    fn next_nonce(&mut self) -> Result<u64, StoreError> {
        let current = match self.get(&StoreKey::Nonce) {
            None => 0,
            Some(Record::Counter(n)) => n,
            Some(_) => return Err(StoreError::UnexpectedRecord(StoreKey::Nonce)),
        };
        let next = current + 1;
        self.set(StoreKey::Nonce, Record::Counter(next));
        Ok(next)
    }

    fn market(&self, id: MarketId) -> Result<Option<MarketRecord>, StoreError> {
        let key = StoreKey::Market(id);
        match self.get(&key) {
            None => Ok(None),
            Some(Record::Market(record)) => Ok(Some(*record)),
            Some(_) => Err(StoreError::UnexpectedRecord(key)),
        }
    }

    fn set_market(&mut self, record: MarketRecord) {
        self.set(StoreKey::Market(record.market.id), Record::Market(Box::new(record)));
    }

    fn position(&self, key: &PositionKey) -> Result<Option<Position>, StoreError> {
        let store_key = StoreKey::Position(key.clone());
        match self.get(&store_key) {
            None => Ok(None),
            Some(Record::Position(position)) => Ok(Some(*position)),
            Some(_) => Err(StoreError::UnexpectedRecord(store_key)),
        }
    }

    fn set_position(&mut self, position: Position) {
        self.set(StoreKey::Position(position.key.clone()), Record::Position(Box::new(position)));
    }

    fn remove_position(&mut self, key: &PositionKey) {
        self.remove(&StoreKey::Position(key.clone()));
    }

    fn deposit(&self, id: RequestId) -> Result<Option<DepositRequest>, StoreError> {
        let key = StoreKey::Deposit(id);
        match self.get(&key) {
            None => Ok(None),
            Some(Record::Deposit(request)) => Ok(Some(*request)),
            Some(_) => Err(StoreError::UnexpectedRecord(key)),
        }
    }

    fn set_deposit(&mut self, request: DepositRequest) {
        self.set(StoreKey::Deposit(request.id), Record::Deposit(Box::new(request)));
    }

    fn remove_deposit(&mut self, id: RequestId) {
        self.remove(&StoreKey::Deposit(id));
    }

    fn withdrawal(&self, id: RequestId) -> Result<Option<WithdrawalRequest>, StoreError> {
        let key = StoreKey::Withdrawal(id);
        match self.get(&key) {
            None => Ok(None),
            Some(Record::Withdrawal(request)) => Ok(Some(*request)),
            Some(_) => Err(StoreError::UnexpectedRecord(key)),
        }
    }

    fn set_withdrawal(&mut self, request: WithdrawalRequest) {
        self.set(StoreKey::Withdrawal(request.id), Record::Withdrawal(Box::new(request)));
    }

    fn remove_withdrawal(&mut self, id: RequestId) {
        self.remove(&StoreKey::Withdrawal(id));
    }
}

impl<S: KeyValueStore + ?Sized> StoreExt for S {}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Delta {delta} would take {key:?} below zero (current {current})")]
    NegativeBalance { key: StoreKey, current: Decimal, delta: Decimal },

    #[error("Unexpected record type under {0:?}")]
    UnexpectedRecord(StoreKey),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pool_key() -> StoreKey {
        StoreKey::PoolAmount(MarketId(1), AssetId::new("ETH"))
    }

    #[test]
    fn missing_value_reads_as_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.value(&pool_key()), Ok(Decimal::ZERO));
    }

    #[test]
    fn apply_delta_accumulates() {
        let mut store = MemoryStore::new();
        store.apply_delta(pool_key(), dec!(10)).unwrap();
        let next = store.apply_delta(pool_key(), dec!(-4)).unwrap();
        assert_eq!(next, dec!(6));
        assert_eq!(store.value(&pool_key()), Ok(dec!(6)));
    }

    #[test]
    fn negative_balance_rejected() {
        let mut store = MemoryStore::new();
        store.apply_delta(pool_key(), dec!(1)).unwrap();
        let err = store.apply_delta(pool_key(), dec!(-2)).unwrap_err();
        assert!(matches!(err, StoreError::NegativeBalance { .. }));
        assert_eq!(store.value(&pool_key()), Ok(dec!(1)));
    }

    #[test]
    fn funding_per_size_may_go_negative() {
        let mut store = MemoryStore::new();
        let key = StoreKey::FundingAmountPerSize(MarketId(1), AssetId::new("USDC"), Side::Short);
        assert_eq!(store.apply_delta(key, dec!(-0.5)), Ok(dec!(-0.5)));
    }

    #[test]
    fn transaction_isolated_until_applied() {
        let mut store = MemoryStore::new();
        store.apply_delta(pool_key(), dec!(5)).unwrap();

        let write_set = {
            let mut tx = Transaction::new(&store);
            tx.apply_delta(pool_key(), dec!(3)).unwrap();
            tx.remove(&StoreKey::Nonce);
            assert_eq!(tx.value(&pool_key()), Ok(dec!(8)));
            tx.into_write_set()
        };
        assert_eq!(store.value(&pool_key()), Ok(dec!(5)));

        write_set.apply_to(&mut store);
        assert_eq!(store.value(&pool_key()), Ok(dec!(8)));
    }

    #[test]
    fn dropped_transaction_leaves_no_trace() {
        let store = MemoryStore::new();
        {
            let mut tx = Transaction::new(&store);
            tx.next_nonce().unwrap();
            assert!(tx.is_dirty());
        }
        assert!(store.is_empty());
    }

    #[test]
    fn wrong_record_type_reported() {
        let mut store = MemoryStore::new();
        store.set_block(pool_key(), BlockNumber(3));
        assert_eq!(store.value(&pool_key()), Err(StoreError::UnexpectedRecord(pool_key())));
    }

    #[test]
    fn nonce_increments() {
        let mut store = MemoryStore::new();
        assert_eq!(store.next_nonce(), Ok(1));
        assert_eq!(store.next_nonce(), Ok(2));
    }
}
