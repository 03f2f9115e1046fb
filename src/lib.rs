// perps-pool-core: market accounting for a pooled perpetuals venue.
// liquidity providers deposit both pooled tokens for shares, traders open leveraged
// positions against the pool. every settlement is all-or-nothing.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: ids, BlockNumber, Side, Leg, Price, rounding
//   2.x  market.rs: market identity (pool token, index, long and short tokens)
//   2.1x price_impact.rs: imbalance curve, swap and position impact, impact cap
//   3.x  oracle.rs: price oracle seam, per-market price resolution and staleness
//   4.x  position.rs: position record, pnl, execution price
//   4.2x referral.rs: tiers, referrer codes, rebate split
//   4.3x fees.rs: fee factors, fee breakdown and routing amounts
//   5.x  funding.rs: borrowing and funding accrual, per-position fee settlement
//   6.x  deposit.rs: deposit requests and share minting helpers
//   6.1x pool.rs: pool value, share price, usd/share conversion
//   7.x  withdrawal.rs: withdrawal requests and output split
//   7.1x risk.rs: reserve and minimum collateral checks
//   8.x  engine/: settlement of deposits, withdrawals, positions, claims
//   9.x  sinks.rs: fee receiver and settlement callbacks
//   10.x config.rs: per-market parameters, env presets
//   11.x events.rs: events for committed settlements
//   12.x store.rs: keyed store, transaction overlay, write sets

// accounting modules
pub mod engine;
pub mod fees;
pub mod funding;
pub mod market;
pub mod pool;
pub mod position;
pub mod price_impact;
pub mod types;

// request flows
pub mod deposit;
pub mod withdrawal;

// risk and referral
pub mod referral;
pub mod risk;

// integration modules
pub mod config;
pub mod events;
pub mod oracle;
pub mod sinks;
pub mod store;

// re exports for convenience
pub use config::*;
pub use deposit::*;
pub use engine::*;
pub use events::*;
pub use fees::*;
pub use funding::*;
pub use market::*;
pub use oracle::*;
pub use pool::*;
pub use position::*;
pub use price_impact::*;
pub use referral::*;
pub use risk::*;
pub use sinks::*;
pub use store::*;
pub use types::*;
pub use withdrawal::*;
