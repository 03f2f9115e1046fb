//! Pooled Perpetuals Market Simulation.
//!
//! Walks one ETH/USDC market through its lifecycle: liquidity bootstrap, a
//! leveraged long, accrual over time, a profitable close, funding claims and
//! liquidity withdrawal. Set RUST_LOG=debug to see every emitted event.

use perps_pool_core::*;
use rust_decimal_macros::dec;

const LP: AccountId = AccountId(1);
const TRADER: AccountId = AccountId(2);
const SHORT_TRADER: AccountId = AccountId(3);
const AFFILIATE: AccountId = AccountId(4);

fn main() -> Result<(), EngineError> {
    env_logger::init();

    println!("Pooled Perpetuals Market Simulation");
    println!("Single ETH/USDC market, GM-style shares, block-based accrual\n");

    scenario_1_liquidity_bootstrap()?;
    scenario_2_position_lifecycle()?;
    scenario_3_funding_and_referrals()?;
    scenario_4_cancelled_deposit()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

fn oracle_at(block: BlockNumber, eth: rust_decimal::Decimal) -> StaticOracle {
    StaticOracle::new(block)
        .with_price("ETH", Price::new_unchecked(eth))
        .with_price("USDC", Price::new_unchecked(dec!(1)))
}

fn seeded_engine(config: MarketConfig) -> Result<(Engine, MarketId), EngineError> {
    let mut engine = Engine::new(EngineConfig::default());
    let market = engine.add_market(Market::eth_usd(), config)?;
    engine.set_block(BlockNumber(1));

    let id = engine.create_deposit(LP, CreateDepositParams::new(LP, market, dec!(50), dec!(100000)))?;
    engine.execute_deposit(id, &oracle_at(BlockNumber(1), dec!(2000)))?;
    Ok((engine, market))
}

/// Paired deposit into an empty pool.
fn scenario_1_liquidity_bootstrap() -> Result<(), EngineError> {
    println!("Scenario 1: Liquidity Bootstrap\n");

    let mut engine = Engine::new(EngineConfig::default());
    let market = engine.add_market(Market::eth_usd(), MarketConfig::zero_fee())?;
    engine.set_block(BlockNumber(1));
    let oracle = oracle_at(BlockNumber(1), dec!(2000));

    let id = engine.create_deposit(LP, CreateDepositParams::new(LP, market, dec!(10), dec!(30000)))?;
    let outcome = engine.execute_deposit(id, &oracle)?;
    println!("  LP deposits 10 ETH + 30,000 USDC at $2,000");
    println!("  Minted {} shares", outcome.minted);
    println!("  Pool value: ${}", engine.pool_value_usd(market, &oracle)?);

    let id = engine.create_deposit(LP, CreateDepositParams::new(LP, market, dec!(0), dec!(5000)))?;
    let outcome = engine.execute_deposit(id, &oracle)?;
    println!("  LP tops up 5,000 USDC, minted {} more", outcome.minted);
    println!("  Share supply: {}", engine.share_supply(market)?);
    if let Some(price) = engine.share_price(market, &oracle)? {
        println!("  Share price: ${}\n", price);
    }
    Ok(())
}

/// Open, hold while accrual runs, then close in profit.
fn scenario_2_position_lifecycle() -> Result<(), EngineError> {
    println!("Scenario 2: Position Lifecycle\n");

    let (mut engine, market) = seeded_engine(MarketConfig::default())?;
    let usdc = AssetId::new("USDC");

    let opened = engine.increase_position(
        TRADER,
        IncreasePositionParams {
            market,
            collateral_token: usdc.clone(),
            side: Side::Long,
            collateral_delta_amount: dec!(1000),
            size_delta_usd: dec!(10000),
            acceptable_price: Some(Price::new_unchecked(dec!(2010))),
        },
        &oracle_at(BlockNumber(1), dec!(2000)),
    )?;
    println!("  Trader opens $10,000 long with 1,000 USDC");
    println!("  Executed @ ${}, impact ${}", opened.execution_price, opened.price_impact_usd);
    println!("  Position fee: {} USDC", opened.fees.position_fee.fee_amount);

    engine.advance_blocks(500);
    let block = engine.block();
    println!("\n  500 blocks pass, ETH moves to $2,200");
    println!(
        "  Cumulative borrowing factor (long): {}",
        engine.cumulative_borrowing_factor(market, Side::Long)?
    );

    let closed = engine.decrease_position(
        TRADER,
        DecreasePositionParams {
            market,
            collateral_token: usdc.clone(),
            side: Side::Long,
            collateral_delta_amount: dec!(0),
            size_delta_usd: dec!(10000),
            acceptable_price: None,
        },
        &oracle_at(block, dec!(2200)),
    )?;
    println!("  Closed @ ${}, pnl ${}", closed.execution_price, closed.pnl_usd);
    println!("  Borrowing fee paid: {} USDC", closed.fees.borrowing.borrowing_fee_amount);
    println!("  Received {} USDC + {} ETH\n", closed.output_amount, closed.secondary_output_amount);

    let shares = engine.share_balance(market, LP)?;
    let id = engine.create_withdrawal(LP, CreateWithdrawalParams::new(LP, market, shares / dec!(2)))?;
    let withdrawn = engine.execute_withdrawal(id, &oracle_at(block, dec!(2200)))?;
    println!("  LP withdraws half: {} ETH + {} USDC\n", withdrawn.long_token_amount, withdrawn.short_token_amount);
    Ok(())
}

/// Opposing positions, funding flows from the crowded side, referral rebates.
fn scenario_3_funding_and_referrals() -> Result<(), EngineError> {
    println!("Scenario 3: Funding and Referrals\n");

    let (mut engine, market) = seeded_engine(MarketConfig::default())?;
    engine.set_referrer(TRADER, AFFILIATE)?;
    let usdc = AssetId::new("USDC");

    let open = |side, size| IncreasePositionParams {
        market,
        collateral_token: usdc.clone(),
        side,
        collateral_delta_amount: dec!(2000),
        size_delta_usd: size,
        acceptable_price: None,
    };
    let oracle = oracle_at(BlockNumber(1), dec!(2000));
    engine.increase_position(TRADER, open(Side::Long, dec!(20000)), &oracle)?;
    engine.increase_position(SHORT_TRADER, open(Side::Short, dec!(5000)), &oracle)?;
    println!("  $20,000 long (referred) vs $5,000 short");

    engine.advance_blocks(1000);
    let block = engine.block();
    let oracle = oracle_at(block, dec!(2000));

    // touching the short settles what it earned
    engine.increase_position(SHORT_TRADER, open(Side::Short, dec!(0)), &oracle)?;
    let claimed = engine.claim_funding_fees(SHORT_TRADER, market)?;
    println!(
        "  Short claims funding: {} ETH + {} USDC",
        claimed.long_token_amount, claimed.short_token_amount
    );

    let rewards = engine.claim_affiliate_rewards(AFFILIATE, market)?;
    println!("  Affiliate claims {} USDC in rewards\n", rewards.short_token_amount);
    Ok(())
}

/// A deposit whose minimum cannot be met is cancelled and refunded.
fn scenario_4_cancelled_deposit() -> Result<(), EngineError> {
    println!("Scenario 4: Cancelled Deposit\n");

    let (mut engine, market) = seeded_engine(MarketConfig::default())?;
    let params = CreateDepositParams::new(LP, market, dec!(0), dec!(1000)).with_min_pool_shares(dec!(5000));
    let id = engine.create_deposit(LP, params)?;

    match engine.execute_deposit_or_cancel(id, &oracle_at(BlockNumber(1), dec!(2000)))? {
        DepositSettlement::Executed(outcome) => println!("  Unexpectedly minted {}", outcome.minted),
        DepositSettlement::Cancelled { refund, reason } => {
            println!("  Cancelled: {}", reason);
            println!(
                "  Refunded {} ETH + {} USDC",
                refund.long_token_amount, refund.short_token_amount
            );
        }
    }
    println!();
    Ok(())
}
