// 7.0: risk engine. coordinates the collateral ledger, market registry,
// price aggregation, funding, positions and liquidations behind a single
// struct. one state-changing call at a time, deterministic, no I/O.

mod config;
mod core;
mod funding;
mod liquidations;
mod positions;
mod pricing;
mod results;

pub use config::EngineConfig;
pub use core::{Engine, MarketState};
pub use results::{CloseResult, EngineError, FundingOutcome, HealthCheck, LiquidationOutcome};
