//! Solvency checks.
//!
//! Run against the post-settlement state, before anything is committed.
//! Reserve limits keep open interest coverable by the pool; collateral limits
//! keep each open position backed.

use crate::config::{CollateralParams, ReserveParams};
use crate::oracle::MarketPrices;
use crate::pool::PoolSnapshot;
use crate::position::Position;
use crate::types::{Price, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Details about why a settlement was blocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskViolation {
    ReserveExceeded {
        side: Side,
        reserved_usd: Decimal,
        max_reserve_usd: Decimal,
    },
    CollateralBelowMinimum {
        collateral_usd: Decimal,
        min_collateral_usd: Decimal,
    },
    LeverageTooHigh {
        collateral_usd: Decimal,
        required_usd: Decimal,
    },
}

/// Reserved usd on `side` must fit in the pool value of the token backing its pnl.
pub fn check_reserve(
    snapshot: &PoolSnapshot,
    side: Side,
    prices: &MarketPrices,
    params: &ReserveParams,
) -> Option<RiskViolation> {
    let reserved_usd = snapshot.reserved_usd(side, prices.index);
    if reserved_usd.is_zero() {
        return None;
    }

    let max_reserve_usd = snapshot.leg_usd(side.pnl_leg(), prices) * params.factor(side);
    if reserved_usd > max_reserve_usd {
        return Some(RiskViolation::ReserveExceeded {
            side,
            reserved_usd,
            max_reserve_usd,
        });
    }
    None
}

/// Open positions need collateral above both the floor and size * min factor.
/// Closed positions pass.
pub fn check_collateral(
    position: &Position,
    collateral_price: Price,
    params: &CollateralParams,
) -> Option<RiskViolation> {
    if position.is_empty() {
        return None;
    }

    let collateral_usd = position.collateral_usd(collateral_price);
    if collateral_usd < params.min_collateral_usd {
        return Some(RiskViolation::CollateralBelowMinimum {
            collateral_usd,
            min_collateral_usd: params.min_collateral_usd,
        });
    }

    let required_usd = position.size_in_usd * params.min_collateral_factor;
    if collateral_usd < required_usd {
        return Some(RiskViolation::LeverageTooHigh {
            collateral_usd,
            required_usd,
        });
    }
    None
}
