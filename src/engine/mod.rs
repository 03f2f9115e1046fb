// 8.0: market engine. executes deposits, withdrawals, position changes and claims
// against one keyed store. every operation plans on a transaction overlay and
// commits all-or-nothing: fee batch, write set, events, then the callback.

mod accrual;
mod claims;
mod config;
mod core;
mod decrease;
mod deposits;
mod increase;
mod results;
mod settlement;
mod withdrawals;

pub use config::EngineConfig;
pub use core::Engine;
pub use results::{ClaimedAmounts, DepositSettlement, EngineError, ErrorKind, PositionOutcome, WithdrawalSettlement};
