//! Market identity.
//!
//! A market is one pool instance: a pool-share token, two pooled assets
//! (long-side and short-side) and the index asset positions are priced in.
//! The identities are fixed at creation. Everything that changes lives in the
//! store under keys derived from the market id.

use crate::types::{AssetId, Leg, MarketId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    /// Pool-share token minted to depositors
    pub pool_token: AssetId,
    /// Asset priced by the market's positions
    pub index_token: AssetId,
    /// Pooled asset backing long pnl
    pub long_token: AssetId,
    /// Pooled asset backing short pnl
    pub short_token: AssetId,
}

impl Market {
    pub fn new(
        id: MarketId,
        pool_token: impl Into<String>,
        index_token: impl Into<String>,
        long_token: impl Into<String>,
        short_token: impl Into<String>,
    ) -> Result<Self, MarketError> {
        let market = Self {
            id,
            pool_token: AssetId::new(pool_token),
            index_token: AssetId::new(index_token),
            long_token: AssetId::new(long_token),
            short_token: AssetId::new(short_token),
        };
        market.validate()?;
        Ok(market)
    }

    /// ETH/USD market backed by ETH and USDC
    pub fn eth_usd() -> Self {
        Self {
            id: MarketId(1),
            pool_token: AssetId::new("GM-ETH-USDC"),
            index_token: AssetId::new("ETH"),
            long_token: AssetId::new("ETH"),
            short_token: AssetId::new("USDC"),
        }
    }

    pub fn validate(&self) -> Result<(), MarketError> {
        for (role, asset) in [
            ("pool", &self.pool_token),
            ("index", &self.index_token),
            ("long", &self.long_token),
            ("short", &self.short_token),
        ] {
            if asset.is_empty() {
                return Err(MarketError::EmptyAsset { market: self.id, role });
            }
        }
        if self.long_token == self.short_token {
            return Err(MarketError::DuplicatePoolAsset(self.long_token.clone()));
        }
        Ok(())
    }

    pub fn token(&self, leg: Leg) -> &AssetId {
        match leg {
            Leg::Long => &self.long_token,
            Leg::Short => &self.short_token,
        }
    }

    /// Which pooled leg an asset is, if any
    pub fn leg_of(&self, asset: &AssetId) -> Option<Leg> {
        if *asset == self.long_token {
            Some(Leg::Long)
        } else if *asset == self.short_token {
            Some(Leg::Short)
        } else {
            None
        }
    }

    pub fn is_collateral(&self, asset: &AssetId) -> bool {
        self.leg_of(asset).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketError {
    #[error("Market {market:?} has an empty {role} asset")]
    EmptyAsset { market: MarketId, role: &'static str },

    #[error("Long and short assets must differ, both are {0}")]
    DuplicatePoolAsset(AssetId),

    #[error("Market {0:?} already exists")]
    AlreadyExists(MarketId),

    #[error("Asset {asset} is not a collateral asset of market {market:?}")]
    InvalidCollateral { market: MarketId, asset: AssetId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eth_usd_is_valid() {
        let market = Market::eth_usd();
        assert!(market.validate().is_ok());
        assert_eq!(market.token(Leg::Long).as_str(), "ETH");
        assert_eq!(market.leg_of(&AssetId::new("USDC")), Some(Leg::Short));
        assert_eq!(market.leg_of(&AssetId::new("BTC")), None);
    }

    #[test]
    fn empty_identity_rejected() {
        let result = Market::new(MarketId(2), "GM", "", "ETH", "USDC");
        assert!(matches!(result, Err(MarketError::EmptyAsset { role: "index", .. })));
    }

    #[test]
    fn duplicate_pool_assets_rejected() {
        let result = Market::new(MarketId(2), "GM", "ETH", "USDC", "USDC");
        assert!(matches!(result, Err(MarketError::DuplicatePoolAsset(_))));
    }
}
