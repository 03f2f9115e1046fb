//! Claims: drain an account's claimable funding and affiliate reward balances.

use super::core::{load_market, Engine};
use super::results::{ClaimedAmounts, EngineError};
use super::settlement::SettlementLog;
use crate::events::{ClaimEvent, EventPayload};
use crate::market::Market;
use crate::store::{KeyValueStore, StoreExt, StoreKey, Transaction};
use crate::types::{AccountId, AssetId, Leg, MarketId};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy)]
enum ClaimKind {
    Funding,
    AffiliateReward,
}

impl ClaimKind {
    fn key(&self, market: MarketId, asset: AssetId, account: AccountId) -> StoreKey {
        match self {
            ClaimKind::Funding => StoreKey::ClaimableFunding(market, asset, account),
            ClaimKind::AffiliateReward => StoreKey::AffiliateReward(market, asset, account),
        }
    }

    fn event(&self, claim: ClaimEvent) -> EventPayload {
        match self {
            ClaimKind::Funding => EventPayload::FundingFeesClaimed(claim),
            ClaimKind::AffiliateReward => EventPayload::AffiliateRewardClaimed(claim),
        }
    }
}

impl<S: KeyValueStore> Engine<S> {
    /// Pay out funding the account's positions have earned, in both pooled tokens.
    pub fn claim_funding_fees(&mut self, account: AccountId, market_id: MarketId) -> Result<ClaimedAmounts, EngineError> {
        self.claim(account, market_id, ClaimKind::Funding)
    }

    /// Pay out referral rewards routed to an affiliate.
    pub fn claim_affiliate_rewards(&mut self, affiliate: AccountId, market_id: MarketId) -> Result<ClaimedAmounts, EngineError> {
        self.claim(affiliate, market_id, ClaimKind::AffiliateReward)
    }

    fn claim(&mut self, account: AccountId, market_id: MarketId, kind: ClaimKind) -> Result<ClaimedAmounts, EngineError> {
        let mut tx = Transaction::new(&self.store);
        let mut log = SettlementLog::default();
        let record = load_market(&tx, market_id)?;
        let market: &Market = &record.market;

        let mut claimed = ClaimedAmounts::default();
        for leg in Leg::ALL {
            let asset = market.token(leg).clone();
            let key = kind.key(market_id, asset.clone(), account);
            let amount = tx.value(&key)?;
            if amount <= Decimal::ZERO {
                continue;
            }
            tx.apply_delta(key, -amount)?;
            match leg {
                Leg::Long => claimed.long_token_amount = amount,
                Leg::Short => claimed.short_token_amount = amount,
            }
            log.push_event(kind.event(ClaimEvent {
                market: market_id,
                asset,
                account,
                amount,
            }));
        }

        if claimed.is_empty() {
            return Ok(claimed);
        }
        let settlement = log.into_settlement(tx.into_write_set());
        self.commit(settlement)?;
        log::info!("{:?} claimed {:?} on {:?}: {:?}", account, kind, market_id, claimed);
        Ok(claimed)
    }
}
