// vperps-core: synthetic perpetuals risk engine.
// solvency-first architecture: the collateral ledger is the single source
// of truth, and every operation validates before it mutates.
// all computation is deterministic with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: MarketId, UserId, Price, Quote, Bps
//   2.x  ledger.rs: free/locked collateral, pnl and funding waterfalls
//   3.x  market.rs: market registry + per-market funding index
//   4.x  price_feed.rs: external feeds, staleness windows, median
//   5.x  position.rs: position math: pnl, equity, partial-close split
//   6.x  vamm.rs: virtual reserves, linear price impact, OI caps
//   7.x  engine/: the engine: pricing, funding, positions, liquidations
//   8.x  liquidation.rs: health factor and fee-split policy
//   9.x  events.rs: typed audit log of every state change
//   10.x insurance.rs: bad-debt backstop fund

// accounting and market state
pub mod ledger;
pub mod market;
pub mod position;
pub mod types;

// pricing
pub mod price_feed;
pub mod vamm;

// risk and safety
pub mod insurance;
pub mod liquidation;

// orchestration
pub mod engine;
pub mod events;

// re exports for convenience
pub use engine::*;
pub use events::*;
pub use insurance::*;
pub use ledger::*;
pub use liquidation::*;
pub use market::*;
pub use position::*;
pub use price_feed::*;
pub use types::*;
pub use vamm::*;
