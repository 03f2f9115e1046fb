// 4.2: referral registry. traders point at an affiliate, affiliates sit in a tier.
// a tier carves a rebate out of the base fee: part goes back to the trader as a
// discount, the rest is routed to the affiliate as a reward.

use crate::types::AccountId;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralTier {
    // fraction of the base fee rebated in total
    pub total_rebate_factor: Decimal,
    // fraction of the rebate returned to the trader
    pub discount_share: Decimal,
}

impl Default for ReferralTier {
    fn default() -> Self {
        Self {
            total_rebate_factor: dec!(0.05),
            discount_share: dec!(0.5),
        }
    }
}

// resolved referral terms for one trader, folded into fee computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralInfo {
    pub affiliate: AccountId,
    pub total_rebate_factor: Decimal,
    pub discount_share: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferralRegistry {
    tiers: HashMap<u32, ReferralTier>,
    affiliate_tiers: HashMap<AccountId, u32>,
    trader_referrers: HashMap<AccountId, AccountId>,
}

impl ReferralRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tier(&mut self, tier_id: u32, tier: ReferralTier) -> Result<(), ReferralError> {
        let in_range = |f: Decimal| f >= Decimal::ZERO && f <= Decimal::ONE;
        if !in_range(tier.total_rebate_factor) || !in_range(tier.discount_share) {
            return Err(ReferralError::InvalidTier(tier_id));
        }
        self.tiers.insert(tier_id, tier);
        Ok(())
    }

    pub fn set_affiliate_tier(&mut self, affiliate: AccountId, tier_id: u32) -> Result<(), ReferralError> {
        if !self.tiers.contains_key(&tier_id) {
            return Err(ReferralError::UnknownTier(tier_id));
        }
        self.affiliate_tiers.insert(affiliate, tier_id);
        Ok(())
    }

    pub fn set_referrer(&mut self, trader: AccountId, affiliate: AccountId) -> Result<(), ReferralError> {
        if trader == affiliate {
            return Err(ReferralError::SelfReferral(trader));
        }
        self.trader_referrers.insert(trader, affiliate);
        Ok(())
    }

    pub fn clear_referrer(&mut self, trader: AccountId) {
        self.trader_referrers.remove(&trader);
    }

    pub fn referrer(&self, trader: AccountId) -> Option<AccountId> {
        self.trader_referrers.get(&trader).copied()
    }

    // affiliates without a tier fall back to the default tier
    pub fn referral_info(&self, trader: AccountId) -> Option<ReferralInfo> {
        let affiliate = self.referrer(trader)?;
        let tier = self
            .affiliate_tiers
            .get(&affiliate)
            .and_then(|id| self.tiers.get(id))
            .copied()
            .unwrap_or_default();
        Some(ReferralInfo {
            affiliate,
            total_rebate_factor: tier.total_rebate_factor,
            discount_share: tier.discount_share,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferralError {
    #[error("Account {0:?} cannot refer itself")]
    SelfReferral(AccountId),
    #[error("Referral tier {0} has factors outside [0, 1]")]
    InvalidTier(u32),
    #[error("Referral tier {0} is not registered")]
    UnknownTier(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreferred_trader_has_no_info() {
        let registry = ReferralRegistry::new();
        assert!(registry.referral_info(AccountId(1)).is_none());
    }

    #[test]
    fn affiliate_tier_resolution() {
        let mut registry = ReferralRegistry::new();
        registry
            .set_tier(2, ReferralTier { total_rebate_factor: dec!(0.1), discount_share: dec!(0.25) })
            .unwrap();
        registry.set_affiliate_tier(AccountId(9), 2).unwrap();
        registry.set_referrer(AccountId(1), AccountId(9)).unwrap();

        let info = registry.referral_info(AccountId(1)).unwrap();
        assert_eq!(info.affiliate, AccountId(9));
        assert_eq!(info.total_rebate_factor, dec!(0.1));
        assert_eq!(info.discount_share, dec!(0.25));
    }

    #[test]
    fn untiered_affiliate_gets_default_tier() {
        let mut registry = ReferralRegistry::new();
        registry.set_referrer(AccountId(1), AccountId(2)).unwrap();
        let info = registry.referral_info(AccountId(1)).unwrap();
        assert_eq!(info.total_rebate_factor, ReferralTier::default().total_rebate_factor);
    }

    #[test]
    fn self_referral_rejected() {
        let mut registry = ReferralRegistry::new();
        assert_eq!(
            registry.set_referrer(AccountId(3), AccountId(3)),
            Err(ReferralError::SelfReferral(AccountId(3)))
        );
    }

    #[test]
    fn unknown_and_invalid_tiers_rejected() {
        let mut registry = ReferralRegistry::new();
        assert_eq!(registry.set_affiliate_tier(AccountId(1), 7), Err(ReferralError::UnknownTier(7)));
        let bad = ReferralTier { total_rebate_factor: dec!(1.2), discount_share: dec!(0.5) };
        assert_eq!(registry.set_tier(1, bad), Err(ReferralError::InvalidTier(1)));
    }
}
