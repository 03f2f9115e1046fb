//! Solvency invariant tests.
//!
//! These tests verify the invariants that keep the pool able to pay every
//! trader and liquidity provider, and that failed settlements leave no trace.

use perps_pool_core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const LP: AccountId = AccountId(1);
const TRADER: AccountId = AccountId(2);

fn oracle(block: u64, eth: Decimal) -> StaticOracle {
    StaticOracle::new(BlockNumber(block))
        .with_price("ETH", Price::new_unchecked(eth))
        .with_price("USDC", Price::new_unchecked(dec!(1)))
}

fn seeded(config: MarketConfig) -> (Engine, MarketId) {
    let mut engine = Engine::new(EngineConfig::default());
    let market = engine.add_market(Market::eth_usd(), config).unwrap();
    engine.set_block(BlockNumber(1));
    let id = engine
        .create_deposit(LP, CreateDepositParams::new(LP, market, dec!(50), dec!(100000)))
        .unwrap();
    engine.execute_deposit(id, &oracle(1, dec!(2000))).unwrap();
    (engine, market)
}

fn open(market: MarketId, side: Side, collateral: Decimal, size: Decimal) -> IncreasePositionParams {
    IncreasePositionParams {
        market,
        collateral_token: AssetId::new("USDC"),
        side,
        collateral_delta_amount: collateral,
        size_delta_usd: size,
        acceptable_price: None,
    }
}

#[derive(Debug)]
struct RejectingReceiver;

impl FeeReceiver for RejectingReceiver {
    fn accept(&mut self, _transfers: &[FeeTransfer]) -> Result<(), FeeReceiverError> {
        Err(FeeReceiverError::Rejected("paused".to_string()))
    }
}

proptest! {
    /// Reserved usd never exceeds the reserve cap, whatever orders arrive.
    #[test]
    fn reserve_never_exceeded(
        orders in proptest::collection::vec((any::<bool>(), 1_000i64..60_000i64), 1..20),
    ) {
        let (mut engine, market) = seeded(MarketConfig::default());
        let oracle = oracle(1, dec!(2000));
        let config = engine.market(market).unwrap().config;
        let prices = MarketPrices::resolve(&oracle, &Market::eth_usd(), PriceSource::Primary).unwrap();

        for (i, (is_long, size)) in orders.into_iter().enumerate() {
            let side = if is_long { Side::Long } else { Side::Short };
            let size = Decimal::from(size);
            let account = AccountId(100 + i as u64);
            // rejections are fine, breaches are not
            let _ = engine.increase_position(account, open(market, side, size / dec!(5), size), &oracle);

            let snapshot = engine.pool_snapshot(market).unwrap();
            for side in Side::ALL {
                prop_assert!(check_reserve(&snapshot, side, &prices, &config.reserve).is_none());
            }
        }
    }

    /// Open interest always equals the sum of open position sizes.
    #[test]
    fn open_interest_matches_positions(
        sizes in proptest::collection::vec(1_000i64..10_000i64, 1..8),
        close_fraction in 0i64..=100i64,
    ) {
        let (mut engine, market) = seeded(MarketConfig::zero_fee());
        let oracle = oracle(1, dec!(2000));

        let mut keys = Vec::new();
        for (i, size) in sizes.iter().enumerate() {
            let size = Decimal::from(*size);
            let outcome = engine
                .increase_position(AccountId(100 + i as u64), open(market, Side::Short, size, size), &oracle)
                .unwrap();
            keys.push(outcome.key);
        }

        // shrink the first position by a random fraction
        let first = engine.position(&keys[0]).unwrap().unwrap();
        let close = first.size_in_usd * Decimal::new(close_fraction, 2);
        engine.decrease_position(keys[0].account, DecreasePositionParams {
            market,
            collateral_token: AssetId::new("USDC"),
            side: Side::Short,
            collateral_delta_amount: Decimal::ZERO,
            size_delta_usd: close,
            acceptable_price: None,
        }, &oracle).unwrap();

        let mut total_usd = Decimal::ZERO;
        let mut total_tokens = Decimal::ZERO;
        for key in &keys {
            if let Some(position) = engine.position(key).unwrap() {
                total_usd += position.size_in_usd;
                total_tokens += position.size_in_tokens;
            }
        }
        let snapshot = engine.pool_snapshot(market).unwrap();
        prop_assert_eq!(snapshot.short_open_interest_usd, total_usd);
        prop_assert_eq!(snapshot.short_open_interest_in_tokens, total_tokens);
    }

    /// The cumulative borrowing factor only ever grows.
    #[test]
    fn borrowing_factor_monotonic(
        steps in proptest::collection::vec(0u64..200u64, 1..15),
    ) {
        let (mut engine, market) = seeded(MarketConfig::default());
        engine
            .increase_position(TRADER, open(market, Side::Long, dec!(2000), dec!(20000)), &oracle(1, dec!(2000)))
            .unwrap();

        let mut last = engine.cumulative_borrowing_factor(market, Side::Long).unwrap();
        for blocks in steps {
            engine.advance_blocks(blocks);
            let block = engine.block().value();
            engine
                .increase_position(TRADER, open(market, Side::Long, Decimal::ZERO, Decimal::ZERO), &oracle(block, dec!(2000)))
                .unwrap();

            let factor = engine.cumulative_borrowing_factor(market, Side::Long).unwrap();
            prop_assert!(factor >= last);
            if blocks > 0 {
                prop_assert!(factor > last);
            }
            last = factor;
        }
    }
}

#[test]
fn rejected_fee_batch_rolls_back_deposit() {
    let mut engine = Engine::new(EngineConfig::default());
    let market = engine.add_market(Market::eth_usd(), MarketConfig::default()).unwrap();
    engine.set_block(BlockNumber(1));
    let id = engine
        .create_deposit(LP, CreateDepositParams::new(LP, market, dec!(1), dec!(1000)))
        .unwrap();

    engine.set_fee_receiver(Box::new(RejectingReceiver));
    let store_len = engine.store().len();
    let events = engine.events().len();

    let err = engine.execute_deposit(id, &oracle(1, dec!(2000))).unwrap_err();
    assert!(matches!(err, EngineError::FeeTransfer(_)));
    assert_eq!(err.kind(), ErrorKind::Collaborator);

    assert_eq!(engine.store().len(), store_len);
    assert_eq!(engine.events().len(), events);
    assert_eq!(engine.pool_amount(market, Leg::Short).unwrap(), Decimal::ZERO);
    assert_eq!(engine.share_supply(market).unwrap(), Decimal::ZERO);
    assert!(engine.deposit_request(id).unwrap().is_some());
}

#[test]
fn insufficient_collateral_leaves_no_mutation() {
    let (mut engine, market) = seeded(MarketConfig::default());
    let store_len = engine.store().len();
    let snapshot = engine.pool_snapshot(market).unwrap();
    let events = engine.events().len();

    engine.advance_blocks(10);
    let err = engine
        .increase_position(TRADER, open(market, Side::Long, dec!(1), dec!(10000)), &oracle(11, dec!(2000)))
        .unwrap_err();

    assert!(matches!(err, EngineError::InsufficientCollateral { .. }));
    assert_eq!(engine.store().len(), store_len);
    assert_eq!(engine.pool_snapshot(market).unwrap(), snapshot);
    assert_eq!(engine.events().len(), events);
}

#[test]
fn loss_beyond_collateral_is_rejected_whole() {
    let (mut engine, market) = seeded(MarketConfig::zero_fee());
    let opened = engine
        .increase_position(TRADER, open(market, Side::Long, dec!(1000), dec!(10000)), &oracle(1, dec!(2000)))
        .unwrap();
    let before = engine.pool_snapshot(market).unwrap();

    let err = engine
        .decrease_position(TRADER, DecreasePositionParams {
            market,
            collateral_token: AssetId::new("USDC"),
            side: Side::Long,
            collateral_delta_amount: Decimal::ZERO,
            size_delta_usd: dec!(10000),
            acceptable_price: None,
        }, &oracle(1, dec!(1700)))
        .unwrap_err();

    assert!(matches!(err, EngineError::InsufficientCollateral { .. }));
    assert_eq!(engine.pool_snapshot(market).unwrap(), before);
    assert_eq!(engine.position(&opened.key).unwrap(), opened.position);
}

#[test]
fn withdrawal_cannot_strand_open_interest() {
    let (mut engine, market) = seeded(MarketConfig::zero_fee());
    engine
        .increase_position(TRADER, open(market, Side::Long, dec!(10000), dec!(50000)), &oracle(1, dec!(2000)))
        .unwrap();

    let shares = engine.share_balance(market, LP).unwrap();
    assert_eq!(shares, dec!(200000));
    let id = engine
        .create_withdrawal(LP, CreateWithdrawalParams::new(LP, market, shares))
        .unwrap();

    match engine.execute_withdrawal_or_cancel(id, &oracle(1, dec!(2000))).unwrap() {
        WithdrawalSettlement::Cancelled { reason, .. } => {
            assert!(matches!(reason, EngineError::ReserveExceeded { side: Side::Long, .. }));
        }
        WithdrawalSettlement::Executed(_) => panic!("withdrawal must not drain reserved liquidity"),
    }
    assert_eq!(engine.share_balance(market, LP).unwrap(), shares);
    assert_eq!(engine.pool_amount(market, Leg::Long).unwrap(), dec!(50));
}

#[test]
fn pool_value_tracks_trader_pnl() {
    let (mut engine, market) = seeded(MarketConfig::zero_fee());
    engine
        .increase_position(TRADER, open(market, Side::Long, dec!(1000), dec!(10000)), &oracle(1, dec!(2000)))
        .unwrap();

    // ETH +10%: the ETH leg gains 10000, the long's 1000 pnl is owed out of it
    let value = engine.pool_value_usd(market, &oracle(1, dec!(2200))).unwrap();
    assert_eq!(value, dec!(110000) + dec!(100000) - dec!(1000));
}
