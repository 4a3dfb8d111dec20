// 8.0: liquidation policy. a position is liquidatable when its equity falls
// below the maintenance floor, notional * maintenance_margin_ratio. the
// health factor is the ratio of the two, so healthy positions sit above 1
// and the threshold is exactly 1. execution (closing the position, moving
// funds) lives in the engine; this module is the pure policy.

use crate::types::{Bps, MarketId, PositionId, Price, Quote};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-market liquidation parameters, admin-set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationConfig {
    pub maintenance_margin_ratio: Bps,
    /// Fee on notional paid to the caller that triggers the liquidation.
    pub liquidation_fee_rate: Bps,
    /// Fee on notional routed to the insurance fund.
    pub insurance_fee_rate: Bps,
    pub is_active: bool,
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            maintenance_margin_ratio: Bps::new(500), // 5%
            liquidation_fee_rate: Bps::new(100),     // 1%
            insurance_fee_rate: Bps::new(50),        // 0.5%
            is_active: true,
        }
    }
}

/// Result of a health check at a given price.
#[derive(Debug, Clone, Copy)]
pub struct Health {
    pub liquidatable: bool,
    pub price: Price,
    pub health_factor: Decimal,
}

/// equity / (notional * mmr). Below 1 means liquidatable. Zero-notional
/// positions cannot exist, but the guard keeps the math total.
pub fn health_factor(equity: Quote, notional: Quote, maintenance_ratio: Bps) -> Decimal {
    let floor = notional.value() * maintenance_ratio.as_fraction();
    if floor.is_zero() {
        return Decimal::MAX;
    }
    equity.value() / floor
}

pub fn evaluate_health(
    equity: Quote,
    notional: Quote,
    price: Price,
    config: &LiquidationConfig,
) -> Health {
    let hf = health_factor(equity, notional, config.maintenance_margin_ratio);
    Health {
        liquidatable: hf < Decimal::ONE,
        price,
        health_factor: hf,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LiquidationFees {
    pub liquidator_fee: Quote,
    pub insurance_fee: Quote,
}

impl LiquidationFees {
    pub fn total(&self) -> Quote {
        self.liquidator_fee.add(self.insurance_fee)
    }
}

pub fn calculate_fees(notional: Quote, config: &LiquidationConfig) -> LiquidationFees {
    LiquidationFees {
        liquidator_fee: notional.mul(config.liquidation_fee_rate.as_fraction()),
        insurance_fee: notional.mul(config.insurance_fee_rate.as_fraction()),
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LiquidationError {
    #[error("No liquidation config for market {0:?}")]
    MarketNotConfigured(MarketId),

    #[error("Liquidations are disabled for market {0:?}")]
    LiquidationsDisabled(MarketId),

    #[error("Position {0:?} is not liquidatable")]
    PositionNotLiquidatable(PositionId),

    #[error("Too many positions in batch: {submitted}, max {max}")]
    TooManyPositions { submitted: usize, max: usize },

    #[error("No positions liquidated")]
    NoPositionsLiquidated,
}
