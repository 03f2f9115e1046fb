// 8.0.2: result types and errors for engine operations.

use crate::config::ConfigError;
use crate::deposit::{DepositOutcome, DepositRefund};
use crate::fees::PositionFees;
use crate::market::MarketError;
use crate::oracle::OracleError;
use crate::position::{Position, PositionKey};
use crate::referral::ReferralError;
use crate::risk::RiskViolation;
use crate::sinks::FeeReceiverError;
use crate::store::StoreError;
use crate::types::{AssetId, MarketId, Price, RequestId, Side};
use crate::withdrawal::{WithdrawalOutcome, WithdrawalRefund};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionOutcome {
    pub key: PositionKey,
    pub execution_price: Price,
    pub size_delta_usd: Decimal,
    pub size_delta_in_tokens: Decimal,
    pub price_impact_usd: Decimal,
    pub pnl_usd: Decimal,
    pub fees: PositionFees,
    // paid out in the collateral token
    pub output_amount: Decimal,
    // paid out in the pnl token when it differs from the collateral token
    pub secondary_output_amount: Decimal,
    // None once the position is closed
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClaimedAmounts {
    pub long_token_amount: Decimal,
    pub short_token_amount: Decimal,
}

impl ClaimedAmounts {
    pub fn is_empty(&self) -> bool {
        self.long_token_amount.is_zero() && self.short_token_amount.is_zero()
    }
}

/// What a two-phase execute-or-cancel ended in.
#[derive(Debug, Clone, PartialEq)]
pub enum DepositSettlement {
    Executed(DepositOutcome),
    Cancelled { refund: DepositRefund, reason: EngineError },
}

#[derive(Debug, Clone, PartialEq)]
pub enum WithdrawalSettlement {
    Executed(WithdrawalOutcome),
    Cancelled { refund: WithdrawalRefund, reason: EngineError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The request itself cannot settle against current state
    Validation,
    /// Market or parameter setup is wrong
    Configuration,
    /// Price inputs missing or out of their block window
    Oracle,
    /// An external collaborator refused
    Collaborator,
    /// Stored state is inconsistent
    State,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Market {0:?} not found")]
    MarketNotFound(MarketId),

    #[error("Deposit {0:?} not found")]
    DepositNotFound(RequestId),

    #[error("Withdrawal {0:?} not found")]
    WithdrawalNotFound(RequestId),

    #[error("Position {0:?} not found")]
    PositionNotFound(PositionKey),

    #[error("Deposit has no tokens")]
    EmptyDeposit,

    #[error("Withdrawal has no pool shares")]
    EmptyWithdrawal,

    #[error("Amount {0} must not be negative")]
    InvalidAmount(Decimal),

    #[error("Size delta {requested} is invalid for position size {size}")]
    InvalidSizeDelta { requested: Decimal, size: Decimal },

    #[error("Insufficient collateral: required {required}, available {available}")]
    InsufficientCollateral { required: Decimal, available: Decimal },

    #[error("Collateral {collateral_usd} usd below required {required_usd} usd")]
    CollateralTooLow { collateral_usd: Decimal, required_usd: Decimal },

    #[error("Reserve exceeded on {side}: {reserved_usd} reserved, max {max_reserve_usd}")]
    ReserveExceeded {
        side: Side,
        reserved_usd: Decimal,
        max_reserve_usd: Decimal,
    },

    #[error("Execution price {execution_price} outside acceptable price {acceptable_price}")]
    AcceptablePriceExceeded { execution_price: Price, acceptable_price: Price },

    #[error("Price impact {impact_usd} consumes size delta {size_delta_usd}")]
    PriceImpactLargerThanOrderSize { impact_usd: Decimal, size_delta_usd: Decimal },

    #[error("Minted {minted} pool shares, minimum {minimum}")]
    MinSharesNotMet { minted: Decimal, minimum: Decimal },

    #[error("Output {amount} {asset} below minimum {minimum}")]
    InsufficientOutputAmount {
        asset: AssetId,
        amount: Decimal,
        minimum: Decimal,
    },

    #[error("Pool value {pool_value_usd} of market {market:?} cannot price shares")]
    InvalidPoolValue { market: MarketId, pool_value_usd: Decimal },

    #[error("Share balance {balance} below requested {requested}")]
    InsufficientShareBalance { balance: Decimal, requested: Decimal },

    #[error("Market error: {0}")]
    Market(#[from] MarketError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Referral error: {0}")]
    Referral(#[from] ReferralError),

    #[error("Fee transfer failed: {0}")]
    FeeTransfer(#[from] FeeReceiverError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Market(_) | EngineError::Config(_) => ErrorKind::Configuration,
            EngineError::Oracle(_) => ErrorKind::Oracle,
            EngineError::FeeTransfer(_) => ErrorKind::Collaborator,
            EngineError::Store(_) => ErrorKind::State,
            _ => ErrorKind::Validation,
        }
    }

    // only a missing price can resolve itself on retry
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Oracle(err) => err.is_retryable(),
            _ => false,
        }
    }
}

impl From<RiskViolation> for EngineError {
    fn from(violation: RiskViolation) -> Self {
        match violation {
            RiskViolation::ReserveExceeded {
                side,
                reserved_usd,
                max_reserve_usd,
            } => EngineError::ReserveExceeded {
                side,
                reserved_usd,
                max_reserve_usd,
            },
            RiskViolation::CollateralBelowMinimum {
                collateral_usd,
                min_collateral_usd,
            } => EngineError::CollateralTooLow {
                collateral_usd,
                required_usd: min_collateral_usd,
            },
            RiskViolation::LeverageTooHigh {
                collateral_usd,
                required_usd,
            } => EngineError::CollateralTooLow {
                collateral_usd,
                required_usd,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockNumber;

    #[test]
    fn only_missing_prices_retry() {
        let missing: EngineError = OracleError::PriceUnavailable(AssetId::new("ETH")).into();
        assert!(missing.is_retryable());
        assert_eq!(missing.kind(), ErrorKind::Oracle);

        let stale: EngineError = OracleError::Stale {
            oracle_block: BlockNumber(1),
            min_block: BlockNumber(2),
        }
        .into();
        assert!(!stale.is_retryable());
        assert!(!EngineError::EmptyDeposit.is_retryable());
    }

    #[test]
    fn kinds() {
        assert_eq!(EngineError::EmptyDeposit.kind(), ErrorKind::Validation);
        let fee: EngineError = FeeReceiverError::Rejected("down".into()).into();
        assert_eq!(fee.kind(), ErrorKind::Collaborator);
        let market: EngineError = MarketError::AlreadyExists(MarketId(1)).into();
        assert_eq!(market.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn risk_violation_maps_to_reserve_error() {
        let err: EngineError = RiskViolation::ReserveExceeded {
            side: Side::Long,
            reserved_usd: Decimal::ONE,
            max_reserve_usd: Decimal::ZERO,
        }
        .into();
        assert!(matches!(err, EngineError::ReserveExceeded { side: Side::Long, .. }));
    }
}
