//! Engine configuration options.

use crate::types::Quote;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Engine-wide risk and bookkeeping knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum margin for any position.
    pub min_margin: Quote,
    /// Maximum leverage (notional / margin) at open or update time.
    /// Price drift afterwards is liquidation's problem, not a block.
    pub max_leverage: Decimal,
    /// Cap on a single liquidation batch.
    pub max_positions_per_check: usize,
    /// Maximum number of events retained in memory.
    pub max_events: usize,
    /// Echo events as they are emitted.
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_margin: Quote::new(dec!(100)),
            max_leverage: dec!(20),
            max_positions_per_check: 10,
            max_events: 100_000,
            verbose: false,
        }
    }
}
