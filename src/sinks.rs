// 9.0: outbound collaborators. the fee receiver takes protocol fees in one batch per
// settlement and can veto it. callbacks are told about outcomes after commit and
// cannot veto anything.

use crate::types::{AccountId, AssetId, MarketId, RequestId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTransfer {
    pub market: MarketId,
    pub asset: AssetId,
    pub amount: Decimal,
}

pub trait FeeReceiver: fmt::Debug {
    // all-or-nothing: an error aborts the settlement that produced the batch
    fn accept(&mut self, transfers: &[FeeTransfer]) -> Result<(), FeeReceiverError>;
}

// 9.1: in-memory fee receiver. tallies per (market, asset).
#[derive(Debug, Clone, Default)]
pub struct FeeVault {
    balances: HashMap<(MarketId, AssetId), Decimal>,
}

impl FeeVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, market: MarketId, asset: &AssetId) -> Decimal {
        self.balances
            .get(&(market, asset.clone()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

impl FeeReceiver for FeeVault {
    fn accept(&mut self, transfers: &[FeeTransfer]) -> Result<(), FeeReceiverError> {
        if let Some(bad) = transfers.iter().find(|t| t.amount < Decimal::ZERO) {
            return Err(FeeReceiverError::Rejected(format!(
                "negative fee transfer of {} {}",
                bad.amount, bad.asset
            )));
        }
        for transfer in transfers {
            *self
                .balances
                .entry((transfer.market, transfer.asset.clone()))
                .or_insert(Decimal::ZERO) += transfer.amount;
        }
        Ok(())
    }
}

// shared handle so the owner can inspect balances after handing the vault to an engine
impl<T: FeeReceiver> FeeReceiver for Arc<Mutex<T>> {
    fn accept(&mut self, transfers: &[FeeTransfer]) -> Result<(), FeeReceiverError> {
        let mut inner = self
            .lock()
            .map_err(|_| FeeReceiverError::Rejected("fee receiver lock poisoned".to_string()))?;
        inner.accept(transfers)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeeReceiverError {
    #[error("Fee transfer rejected: {0}")]
    Rejected(String),
}

// 9.2: what a callback target is told after commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementOutcome {
    DepositExecuted { request: RequestId, minted: Decimal },
    DepositCancelled { request: RequestId, reason: String },
    WithdrawalExecuted { request: RequestId, long_token_amount: Decimal, short_token_amount: Decimal },
    WithdrawalCancelled { request: RequestId, reason: String },
}

pub trait SettlementCallback: fmt::Debug {
    fn on_settlement(&mut self, target: AccountId, outcome: &SettlementOutcome) -> Result<(), CallbackError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallback;

impl SettlementCallback for NoopCallback {
    fn on_settlement(&mut self, _target: AccountId, _outcome: &SettlementOutcome) -> Result<(), CallbackError> {
        Ok(())
    }
}

// 9.3: records every notification. used by the simulator and tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingCallback {
    pub received: Vec<(AccountId, SettlementOutcome)>,
    // targets whose callback always fails
    pub failing: Vec<AccountId>,
}

impl SettlementCallback for RecordingCallback {
    fn on_settlement(&mut self, target: AccountId, outcome: &SettlementOutcome) -> Result<(), CallbackError> {
        if self.failing.contains(&target) {
            return Err(CallbackError::Failed {
                target,
                reason: "callback reverted".to_string(),
            });
        }
        self.received.push((target, outcome.clone()));
        Ok(())
    }
}

impl<T: SettlementCallback> SettlementCallback for Arc<Mutex<T>> {
    fn on_settlement(&mut self, target: AccountId, outcome: &SettlementOutcome) -> Result<(), CallbackError> {
        let mut inner = self.lock().map_err(|_| CallbackError::Failed {
            target,
            reason: "callback lock poisoned".to_string(),
        })?;
        inner.on_settlement(target, outcome)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackError {
    #[error("Callback target {target:?} failed: {reason}")]
    Failed { target: AccountId, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn vault_tallies_batches() {
        let mut vault = FeeVault::new();
        let usdc = AssetId::new("USDC");
        let transfer = FeeTransfer {
            market: MarketId(1),
            asset: usdc.clone(),
            amount: dec!(1.5),
        };
        vault.accept(&[transfer.clone(), transfer]).unwrap();
        assert_eq!(vault.balance(MarketId(1), &usdc), dec!(3));
        assert_eq!(vault.balance(MarketId(2), &usdc), Decimal::ZERO);
    }

    #[test]
    fn vault_rejects_negative_batch_whole() {
        let mut vault = FeeVault::new();
        let usdc = AssetId::new("USDC");
        let batch = [
            FeeTransfer { market: MarketId(1), asset: usdc.clone(), amount: dec!(1) },
            FeeTransfer { market: MarketId(1), asset: usdc.clone(), amount: dec!(-1) },
        ];
        assert!(vault.accept(&batch).is_err());
        assert_eq!(vault.balance(MarketId(1), &usdc), Decimal::ZERO);
    }
}
