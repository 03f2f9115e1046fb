//! Property-based tests for the accounting math.
//!
//! These tests verify invariants hold under random inputs.

use perps_pool_core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// Strategies for generating test data
fn price_strategy() -> impl Strategy<Value = Decimal> {
    (100i64..500_000i64).prop_map(|x| Decimal::new(x, 2)) // $1 to $5,000
}

fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|x| Decimal::new(x, 3)) // 0.001 to 100,000
}

fn usd_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000i64).prop_map(Decimal::from)
}

fn factor_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..=100i64).prop_map(|x| Decimal::new(x, 4)) // 0% to 1%
}

fn oracle(eth: Decimal) -> StaticOracle {
    StaticOracle::new(BlockNumber(1))
        .with_price("ETH", Price::new_unchecked(eth))
        .with_price("USDC", Price::new_unchecked(dec!(1)))
}

proptest! {
    /// A positive impact never draws more than the impact pool holds
    #[test]
    fn positive_impact_capped_by_pool(
        impact in usd_strategy(),
        pool in amount_strategy(),
        price in price_strategy(),
    ) {
        let capped = cap_impact(impact, pool, Price::new_unchecked(price));
        prop_assert!(-capped.impact_pool_delta <= pool);
        prop_assert!(capped.impact_pool_delta <= Decimal::ZERO);
        prop_assert!(capped.impact_usd <= impact);
        prop_assert!(capped.impact_usd >= Decimal::ZERO);
    }

    /// Negative impact is never capped and always feeds the pool
    #[test]
    fn negative_impact_feeds_pool(
        impact in usd_strategy(),
        price in price_strategy(),
    ) {
        let price = Price::new_unchecked(price);
        let capped = cap_impact(-impact, Decimal::ZERO, price);
        prop_assert_eq!(capped.impact_usd, -impact);
        prop_assert!(price.usd_value(capped.impact_pool_delta) >= impact);
    }

    /// Growing the imbalance never helps, shrinking it never hurts
    #[test]
    fn impact_sign_follows_imbalance(
        long_oi in usd_strategy(),
        short_oi in usd_strategy(),
        delta in usd_strategy(),
    ) {
        let params = ImpactParams::default();
        let impact = position_impact_usd(long_oi, short_oi, true, delta, &params);
        if long_oi >= short_oi {
            prop_assert!(impact <= Decimal::ZERO);
        }
        if long_oi + delta <= short_oi {
            prop_assert!(impact >= Decimal::ZERO);
        }
    }

    /// Fee splits always add back up to the fee charged
    #[test]
    fn fee_split_conserves_amount(
        amount in amount_strategy(),
        factor in factor_strategy(),
        rebate in 0i64..=100i64,
        discount in 0i64..=100i64,
    ) {
        let params = FeeParams {
            deposit_fee_factor_negative_impact: factor,
            ..FeeParams::default()
        };
        let referral = ReferralInfo {
            affiliate: AccountId(9),
            total_rebate_factor: Decimal::new(rebate, 2),
            discount_share: Decimal::new(discount, 2),
        };
        let fees = compute_fees(amount, FeePurpose::Deposit, false, &params, Some(&referral));

        prop_assert!(fees.fee_amount <= amount);
        prop_assert_eq!(
            fees.fee_receiver_amount + fees.fee_amount_for_pool + fees.affiliate_reward_amount + fees.trader_discount_amount,
            fees.fee_amount
        );
        prop_assert_eq!(fees.amount_after_fees + fees.net_cost(), amount);
        prop_assert!(fees.fee_receiver_amount >= Decimal::ZERO);
        prop_assert!(fees.fee_amount_for_pool >= Decimal::ZERO);
    }

    /// Fees owed round up: the charged fee never undershoots the exact one
    #[test]
    fn fee_rounds_against_the_payer(
        amount in amount_strategy(),
        factor in factor_strategy(),
    ) {
        let params = FeeParams {
            withdrawal_fee_factor: factor,
            ..FeeParams::default()
        };
        let fees = compute_fees(amount, FeePurpose::Withdrawal, false, &params, None);
        prop_assert!(fees.fee_amount >= amount * factor);
        prop_assert!(fees.fee_amount - amount * factor < dec!(0.000000001));
    }

    /// Shares never buy back more usd than was paid for them
    #[test]
    fn share_round_trip_never_gains(
        usd in usd_strategy(),
        pool_value in usd_strategy(),
        supply in usd_strategy(),
    ) {
        let shares = usd_to_shares(usd, pool_value, supply).unwrap();
        let back = shares_to_usd(shares, pool_value + usd, supply + shares).unwrap();
        prop_assert!(back <= usd);
    }

    /// Without fees or impact the bootstrap mint equals the deposited usd value
    #[test]
    fn zero_impact_mint_equals_usd_value(
        eth in amount_strategy(),
        usdc in amount_strategy(),
        price in price_strategy(),
    ) {
        let mut engine = Engine::new(EngineConfig::default());
        let market = engine.add_market(Market::eth_usd(), MarketConfig::zero_fee()).unwrap();
        engine.set_block(BlockNumber(1));

        let id = engine.create_deposit(AccountId(1), CreateDepositParams::new(AccountId(1), market, eth, usdc)).unwrap();
        let outcome = engine.execute_deposit(id, &oracle(price)).unwrap();

        prop_assert_eq!(outcome.minted, eth * price + usdc);
        prop_assert_eq!(engine.share_supply(market).unwrap(), outcome.minted);
    }

    /// Opening and immediately closing at the same price returns the collateral,
    /// less at most the rounding on the token size
    #[test]
    fn increase_decrease_round_trip(
        price in price_strategy(),
        collateral in 100i64..10_000i64,
        leverage in 1i64..=10i64,
    ) {
        let mut engine = Engine::new(EngineConfig::default());
        let market = engine.add_market(Market::eth_usd(), MarketConfig::zero_fee()).unwrap();
        engine.set_block(BlockNumber(1));
        let oracle = oracle(price);

        let seed = engine
            .create_deposit(AccountId(1), CreateDepositParams::new(AccountId(1), market, dec!(1000000), dec!(1000000)))
            .unwrap();
        engine.execute_deposit(seed, &oracle).unwrap();

        let collateral = Decimal::from(collateral);
        let size = collateral * Decimal::from(leverage);
        let usdc = AssetId::new("USDC");
        engine.increase_position(AccountId(2), IncreasePositionParams {
            market,
            collateral_token: usdc.clone(),
            side: Side::Long,
            collateral_delta_amount: collateral,
            size_delta_usd: size,
            acceptable_price: None,
        }, &oracle).unwrap();

        let outcome = engine.decrease_position(AccountId(2), DecreasePositionParams {
            market,
            collateral_token: usdc,
            side: Side::Long,
            collateral_delta_amount: Decimal::ZERO,
            size_delta_usd: size,
            acceptable_price: None,
        }, &oracle).unwrap();

        let tolerance = price * dec!(0.000000001) + dec!(0.000000001);
        prop_assert!(outcome.output_amount <= collateral);
        prop_assert!(collateral - outcome.output_amount <= tolerance);
        prop_assert!(outcome.position.is_none());
    }

    /// Pnl is zero at entry and flips sign with the side
    #[test]
    fn pnl_sign_by_side(
        tokens in amount_strategy(),
        entry in price_strategy(),
        exit in price_strategy(),
    ) {
        let entry = Price::new_unchecked(entry);
        let exit = Price::new_unchecked(exit);
        let size_usd = entry.usd_value(tokens);

        prop_assert_eq!(pnl_for_tokens(Side::Long, tokens, size_usd, entry), Decimal::ZERO);
        let long = pnl_for_tokens(Side::Long, tokens, size_usd, exit);
        let short = pnl_for_tokens(Side::Short, tokens, size_usd, exit);
        prop_assert_eq!(long, -short);
        if exit > entry {
            prop_assert!(long > Decimal::ZERO);
        }
    }
}
