// 3.0: price oracle boundary. signed prices arrive from outside together with the
// block they were observed at. the engine resolves all prices for a market once,
// at call entry, and never re-reads them mid-settlement.

use crate::config::PriceSource;
use crate::market::Market;
use crate::types::{AssetId, BlockNumber, Leg, Price};
use std::collections::HashMap;

pub trait PriceOracle {
    // block the current price set was signed at
    fn block(&self) -> BlockNumber;
    fn primary_price(&self, asset: &AssetId) -> Result<Price, OracleError>;
    // alternative feed some markets use for their index asset
    fn custom_price(&self, asset: &AssetId) -> Result<Price, OracleError>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticOracle {
    block: Option<BlockNumber>,
    primary: HashMap<AssetId, Price>,
    custom: HashMap<AssetId, Price>,
}

impl StaticOracle {
    pub fn new(block: BlockNumber) -> Self {
        Self {
            block: Some(block),
            ..Self::default()
        }
    }

    pub fn with_price(mut self, asset: impl Into<String>, price: Price) -> Self {
        self.set_price(AssetId::new(asset), price);
        self
    }

    pub fn set_price(&mut self, asset: AssetId, price: Price) {
        self.primary.insert(asset, price);
    }

    pub fn set_custom_price(&mut self, asset: AssetId, price: Price) {
        self.custom.insert(asset, price);
    }

    pub fn remove_price(&mut self, asset: &AssetId) {
        self.primary.remove(asset);
    }

    pub fn set_block(&mut self, block: BlockNumber) {
        self.block = Some(block);
    }
}

impl PriceOracle for StaticOracle {
    fn block(&self) -> BlockNumber {
        self.block.unwrap_or(BlockNumber(0))
    }

    fn primary_price(&self, asset: &AssetId) -> Result<Price, OracleError> {
        self.primary
            .get(asset)
            .copied()
            .ok_or_else(|| OracleError::PriceUnavailable(asset.clone()))
    }

    fn custom_price(&self, asset: &AssetId) -> Result<Price, OracleError> {
        self.custom
            .get(asset)
            .copied()
            .ok_or_else(|| OracleError::PriceUnavailable(asset.clone()))
    }
}

// 3.1: the three prices one settlement runs on, plus the block they belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketPrices {
    pub index: Price,
    pub long_token: Price,
    pub short_token: Price,
    pub block: BlockNumber,
}

impl MarketPrices {
    pub fn resolve(oracle: &dyn PriceOracle, market: &Market, index_source: PriceSource) -> Result<Self, OracleError> {
        let index = match index_source {
            PriceSource::Primary => oracle.primary_price(&market.index_token)?,
            PriceSource::Custom => oracle.custom_price(&market.index_token)?,
        };
        Ok(Self {
            index,
            long_token: oracle.primary_price(&market.long_token)?,
            short_token: oracle.primary_price(&market.short_token)?,
            block: oracle.block(),
        })
    }

    pub fn token(&self, leg: Leg) -> Price {
        match leg {
            Leg::Long => self.long_token,
            Leg::Short => self.short_token,
        }
    }

    // oracle block must not predate the record it settles or run ahead of the chain
    pub fn validate_block(&self, min_block: BlockNumber, current_block: BlockNumber) -> Result<(), OracleError> {
        if self.block > current_block {
            return Err(OracleError::FutureBlock {
                oracle_block: self.block,
                current_block,
            });
        }
        if self.block < min_block {
            return Err(OracleError::Stale {
                oracle_block: self.block,
                min_block,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("No price available for {0}")]
    PriceUnavailable(AssetId),

    #[error("Oracle block {oracle_block} is older than required block {min_block}")]
    Stale { oracle_block: BlockNumber, min_block: BlockNumber },

    #[error("Oracle block {oracle_block} is ahead of current block {current_block}")]
    FutureBlock { oracle_block: BlockNumber, current_block: BlockNumber },
}

impl OracleError {
    // a missing price may show up on retry, a bad block fingerprint will not
    pub fn is_retryable(&self) -> bool {
        matches!(self, OracleError::PriceUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn oracle() -> StaticOracle {
        StaticOracle::new(BlockNumber(10))
            .with_price("ETH", Price::new_unchecked(dec!(2000)))
            .with_price("USDC", Price::new_unchecked(dec!(1)))
    }

    #[test]
    fn resolves_market_prices() {
        let prices = MarketPrices::resolve(&oracle(), &Market::eth_usd(), PriceSource::Primary).unwrap();
        assert_eq!(prices.index.value(), dec!(2000));
        assert_eq!(prices.token(Leg::Short).value(), dec!(1));
        assert_eq!(prices.block, BlockNumber(10));
    }

    #[test]
    fn custom_index_price() {
        let mut oracle = oracle();
        oracle.set_custom_price(AssetId::new("ETH"), Price::new_unchecked(dec!(2001)));
        let prices = MarketPrices::resolve(&oracle, &Market::eth_usd(), PriceSource::Custom).unwrap();
        assert_eq!(prices.index.value(), dec!(2001));
        assert_eq!(prices.long_token.value(), dec!(2000));
    }

    #[test]
    fn missing_price_is_retryable() {
        let oracle = StaticOracle::new(BlockNumber(1)).with_price("ETH", Price::new_unchecked(dec!(1)));
        let err = MarketPrices::resolve(&oracle, &Market::eth_usd(), PriceSource::Primary).unwrap_err();
        assert_eq!(err, OracleError::PriceUnavailable(AssetId::new("USDC")));
        assert!(err.is_retryable());
    }

    #[test]
    fn block_window() {
        let prices = MarketPrices::resolve(&oracle(), &Market::eth_usd(), PriceSource::Primary).unwrap();
        assert!(prices.validate_block(BlockNumber(10), BlockNumber(10)).is_ok());
        assert!(matches!(
            prices.validate_block(BlockNumber(11), BlockNumber(12)),
            Err(OracleError::Stale { .. })
        ));
        let err = prices.validate_block(BlockNumber(0), BlockNumber(9)).unwrap_err();
        assert!(matches!(err, OracleError::FutureBlock { .. }));
        assert!(!err.is_retryable());
    }
}
