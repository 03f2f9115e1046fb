// 4.0: open position tracking. one record per (account, market, collateral, side).
// pnl = tokens * index price - usd size for longs, the reverse for shorts.
// 4.1 has the decrease helpers at the bottom.

use crate::types::{round_down, round_up, AccountId, AssetId, BlockNumber, MarketId, Price, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionKey {
    pub account: AccountId,
    pub market: MarketId,
    pub collateral_token: AssetId,
    pub side: Side,
}

impl PositionKey {
    pub fn new(account: AccountId, market: MarketId, collateral_token: AssetId, side: Side) -> Self {
        Self {
            account,
            market,
            collateral_token,
            side,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub key: PositionKey,
    pub collateral_amount: Decimal,
    pub size_in_usd: Decimal,
    pub size_in_tokens: Decimal,
    // entry snapshots of the market accumulators
    pub borrowing_factor: Decimal,
    pub long_token_funding_amount_per_size: Decimal,
    pub short_token_funding_amount_per_size: Decimal,
    pub updated_at_block: BlockNumber,
}

impl Position {
    pub fn new(key: PositionKey, block: BlockNumber) -> Self {
        Self {
            key,
            collateral_amount: Decimal::ZERO,
            size_in_usd: Decimal::ZERO,
            size_in_tokens: Decimal::ZERO,
            borrowing_factor: Decimal::ZERO,
            long_token_funding_amount_per_size: Decimal::ZERO,
            short_token_funding_amount_per_size: Decimal::ZERO,
            updated_at_block: block,
        }
    }

    pub fn side(&self) -> Side {
        self.key.side
    }

    pub fn account(&self) -> AccountId {
        self.key.account
    }

    pub fn is_empty(&self) -> bool {
        self.size_in_usd.is_zero()
    }

    // 4.1: paper gains/losses at the index price
    pub fn pnl_usd(&self, index_price: Price) -> Decimal {
        pnl_for_tokens(self.side(), self.size_in_tokens, self.size_in_usd, index_price)
    }

    /// Realized pnl and released tokens for closing `size_delta_usd` of the position.
    pub fn realized_pnl(&self, size_delta_usd: Decimal, index_price: Price) -> RealizedPnl {
        let side = self.side();
        let closed_tokens = if size_delta_usd >= self.size_in_usd {
            self.size_in_tokens
        } else {
            side.closed_size_in_tokens(self.size_in_tokens, size_delta_usd, self.size_in_usd)
        };
        let pnl_usd = pnl_for_tokens(side, closed_tokens, size_delta_usd, index_price);

        RealizedPnl {
            size_delta_in_tokens: closed_tokens,
            pnl_usd,
        }
    }

    pub fn collateral_usd(&self, collateral_price: Price) -> Decimal {
        collateral_price.usd_value(self.collateral_amount)
    }

    pub fn leverage(&self, collateral_price: Price) -> Option<Decimal> {
        let collateral_usd = self.collateral_usd(collateral_price);
        if collateral_usd <= Decimal::ZERO {
            None
        } else {
            Some(self.size_in_usd / collateral_usd)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncreasePositionParams {
    pub market: MarketId,
    pub collateral_token: AssetId,
    pub side: Side,
    // collateral transferred in with the order
    pub collateral_delta_amount: Decimal,
    pub size_delta_usd: Decimal,
    pub acceptable_price: Option<Price>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecreasePositionParams {
    pub market: MarketId,
    pub collateral_token: AssetId,
    pub side: Side,
    // collateral withdrawn on top of the size change
    pub collateral_delta_amount: Decimal,
    pub size_delta_usd: Decimal,
    pub acceptable_price: Option<Price>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealizedPnl {
    pub size_delta_in_tokens: Decimal,
    pub pnl_usd: Decimal,
}

// 4.2: pnl of a token amount against the usd paid for it. profits round down, losses up.
pub fn pnl_for_tokens(side: Side, tokens: Decimal, size_usd: Decimal, index_price: Price) -> Decimal {
    let value = index_price.usd_value(tokens);
    let raw = match side {
        Side::Long => value - size_usd,
        Side::Short => size_usd - value,
    };
    if raw >= Decimal::ZERO {
        round_down(raw)
    } else {
        -round_up(-raw)
    }
}

// 4.3: execution price after impact. None when the impact eats the whole size.
pub fn increase_execution_price(side: Side, index_price: Price, size_delta_usd: Decimal, impact_usd: Decimal) -> Option<Price> {
    if size_delta_usd.is_zero() {
        return Some(index_price);
    }
    // positive impact means the trader gets more tokens for the same usd
    let denominator = match side {
        Side::Long => size_delta_usd + impact_usd,
        Side::Short => size_delta_usd - impact_usd,
    };
    if denominator <= Decimal::ZERO {
        return None;
    }
    Price::new(index_price.value() * size_delta_usd / denominator)
}

pub fn decrease_execution_price(side: Side, index_price: Price, size_delta_usd: Decimal, impact_usd: Decimal) -> Option<Price> {
    if size_delta_usd.is_zero() {
        return Some(index_price);
    }
    let numerator = match side {
        Side::Long => size_delta_usd + impact_usd,
        Side::Short => size_delta_usd - impact_usd,
    };
    Price::new(index_price.value() * numerator / size_delta_usd)
}

// acceptable price bounds: buying must not pay more, selling must not receive less
pub fn is_acceptable_increase(side: Side, execution_price: Price, acceptable_price: Price) -> bool {
    match side {
        Side::Long => execution_price <= acceptable_price,
        Side::Short => execution_price >= acceptable_price,
    }
}

pub fn is_acceptable_decrease(side: Side, execution_price: Price, acceptable_price: Price) -> bool {
    match side {
        Side::Long => execution_price >= acceptable_price,
        Side::Short => execution_price <= acceptable_price,
    }
}
