//! Pool valuation and share conversion.
//!
//! Pool value is what share holders own: the pooled amounts at current prices,
//! less the position impact pool (owed back to traders), less the net pnl
//! traders could realize right now.

use crate::oracle::MarketPrices;
use crate::types::{round_down, round_up, Leg, Price, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Everything pool valuation reads from the store, for one market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub long_token_amount: Decimal,
    pub short_token_amount: Decimal,
    pub position_impact_pool_amount: Decimal,
    pub long_open_interest_usd: Decimal,
    pub long_open_interest_in_tokens: Decimal,
    pub short_open_interest_usd: Decimal,
    pub short_open_interest_in_tokens: Decimal,
    pub share_supply: Decimal,
}

impl PoolSnapshot {
    pub fn token_amount(&self, leg: Leg) -> Decimal {
        match leg {
            Leg::Long => self.long_token_amount,
            Leg::Short => self.short_token_amount,
        }
    }

    pub fn open_interest_usd(&self, side: Side) -> Decimal {
        match side {
            Side::Long => self.long_open_interest_usd,
            Side::Short => self.short_open_interest_usd,
        }
    }

    pub fn open_interest_in_tokens(&self, side: Side) -> Decimal {
        match side {
            Side::Long => self.long_open_interest_in_tokens,
            Side::Short => self.short_open_interest_in_tokens,
        }
    }

    /// USD of one pooled leg at current prices.
    pub fn leg_usd(&self, leg: Leg, prices: &MarketPrices) -> Decimal {
        prices.token(leg).usd_value(self.token_amount(leg))
    }

    /// Aggregate trader pnl of one side at the index price.
    pub fn trader_pnl_usd(&self, side: Side, index_price: Price) -> Decimal {
        let value = index_price.usd_value(self.open_interest_in_tokens(side));
        match side {
            Side::Long => value - self.long_open_interest_usd,
            Side::Short => self.short_open_interest_usd - value,
        }
    }

    pub fn net_trader_pnl_usd(&self, index_price: Price) -> Decimal {
        self.trader_pnl_usd(Side::Long, index_price) + self.trader_pnl_usd(Side::Short, index_price)
    }

    pub fn pool_value_usd(&self, prices: &MarketPrices) -> Decimal {
        self.leg_usd(Leg::Long, prices) + self.leg_usd(Leg::Short, prices)
            - prices.index.usd_value(self.position_impact_pool_amount)
            - self.net_trader_pnl_usd(prices.index)
    }

    /// USD reserved against open interest on one side.
    /// Longs reserve their current token value, shorts their entry usd.
    pub fn reserved_usd(&self, side: Side, index_price: Price) -> Decimal {
        match side {
            Side::Long => index_price.usd_value(self.long_open_interest_in_tokens),
            Side::Short => self.short_open_interest_usd,
        }
    }
}

/// Shares minted for `usd`. None when the pool is worth nothing but has holders.
pub fn usd_to_shares(usd: Decimal, pool_value_usd: Decimal, share_supply: Decimal) -> Option<Decimal> {
    if share_supply.is_zero() {
        // bootstrap: one share per usd
        return Some(round_down(usd));
    }
    if pool_value_usd <= Decimal::ZERO {
        return None;
    }
    Some(round_down(usd * share_supply / pool_value_usd))
}

/// USD a share amount redeems for.
pub fn shares_to_usd(shares: Decimal, pool_value_usd: Decimal, share_supply: Decimal) -> Option<Decimal> {
    if share_supply.is_zero() || pool_value_usd <= Decimal::ZERO {
        return None;
    }
    Some(round_down(shares * pool_value_usd / share_supply))
}

/// Price of one share, rounded up so mints never undercount it.
pub fn share_price(pool_value_usd: Decimal, share_supply: Decimal) -> Option<Decimal> {
    if share_supply.is_zero() || pool_value_usd <= Decimal::ZERO {
        return None;
    }
    Some(round_up(pool_value_usd / share_supply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockNumber;
    use rust_decimal_macros::dec;

    fn prices(index: Decimal) -> MarketPrices {
        MarketPrices {
            index: Price::new_unchecked(index),
            long_token: Price::new_unchecked(index),
            short_token: Price::new_unchecked(dec!(1)),
            block: BlockNumber(1),
        }
    }

    #[test]
    fn pool_value_of_idle_pool() {
        let snapshot = PoolSnapshot {
            long_token_amount: dec!(10),
            short_token_amount: dec!(20000),
            ..Default::default()
        };
        assert_eq!(snapshot.pool_value_usd(&prices(dec!(2000))), dec!(40000));
    }

    #[test]
    fn trader_profit_reduces_pool_value() {
        let snapshot = PoolSnapshot {
            long_token_amount: dec!(10),
            short_token_amount: dec!(20000),
            long_open_interest_usd: dec!(10000),
            long_open_interest_in_tokens: dec!(5),
            ..Default::default()
        };
        // longs bought 5 tokens at 2000, price now 2200: +1000 pnl
        // pool 10 * 2200 + 20000 - 1000
        assert_eq!(snapshot.pool_value_usd(&prices(dec!(2200))), dec!(41000));
    }

    #[test]
    fn impact_pool_is_deducted() {
        let snapshot = PoolSnapshot {
            short_token_amount: dec!(1000),
            position_impact_pool_amount: dec!(0.1),
            ..Default::default()
        };
        assert_eq!(snapshot.pool_value_usd(&prices(dec!(2000))), dec!(800));
    }

    #[test]
    fn reserved_usd_by_side() {
        let snapshot = PoolSnapshot {
            long_open_interest_in_tokens: dec!(2),
            short_open_interest_usd: dec!(3000),
            ..Default::default()
        };
        assert_eq!(snapshot.reserved_usd(Side::Long, Price::new_unchecked(dec!(100))), dec!(200));
        assert_eq!(snapshot.reserved_usd(Side::Short, Price::new_unchecked(dec!(100))), dec!(3000));
    }

    #[test]
    fn bootstrap_mint_is_usd_value() {
        assert_eq!(usd_to_shares(dec!(50000), Decimal::ZERO, Decimal::ZERO), Some(dec!(50000)));
    }

    #[test]
    fn mint_at_share_price() {
        // 100 shares worth 200 usd: 50 usd buys 25 shares
        assert_eq!(usd_to_shares(dec!(50), dec!(200), dec!(100)), Some(dec!(25)));
        assert_eq!(shares_to_usd(dec!(25), dec!(200), dec!(100)), Some(dec!(50)));
        assert_eq!(share_price(dec!(200), dec!(100)), Some(dec!(2)));
    }

    #[test]
    fn worthless_pool_with_holders_cannot_mint() {
        assert_eq!(usd_to_shares(dec!(50), Decimal::ZERO, dec!(100)), None);
        assert_eq!(usd_to_shares(dec!(50), dec!(-5), dec!(100)), None);
    }
}
