// 7.2: result types and errors for engine operations.

use crate::insurance::InsuranceError;
use crate::ledger::LedgerError;
use crate::liquidation::LiquidationError;
use crate::market::MarketError;
use crate::position::PositionError;
use crate::price_feed::FeedError;
use crate::types::{Bps, MarketId, PositionId, Price, Quote, SignedSize, UserId};
use crate::vamm::VammError;
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct CloseResult {
    pub position_id: PositionId,
    pub closed_size: SignedSize,
    pub exit_price: Price,
    pub realized_pnl: Quote,
    pub margin_released: Quote,
    pub funding_paid: Quote,
    pub fully_closed: bool,
}

#[derive(Debug, Clone)]
pub struct FundingOutcome {
    /// False when the interval has not elapsed yet (idempotent no-op).
    pub applied: bool,
    pub rate: Decimal,
    pub premium: Decimal,
    pub new_index: Decimal,
}

#[derive(Debug, Clone)]
pub struct LiquidationOutcome {
    pub position_id: PositionId,
    pub market_id: MarketId,
    pub owner: UserId,
    pub size: SignedSize,
    pub price: Price,
    pub health_factor: Decimal,
    pub liquidator_fee: Quote,
    pub insurance_fee: Quote,
    /// Equity returned to the owner after fees, if any.
    pub owner_payout: Quote,
    /// Shortfall drawn from the insurance fund, if any.
    pub bad_debt: Quote,
}

#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub position_id: PositionId,
    pub liquidatable: bool,
    pub price: Price,
    pub health_factor: Decimal,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("Caller {0:?} is not authorized")]
    Unauthorized(UserId),

    #[error("No price available for market {0:?}")]
    NoPriceAvailable(MarketId),

    #[error(
        "Execution price {requested} deviates from mark {mark} by more than {max_deviation:?}"
    )]
    PriceOutOfRange {
        requested: Price,
        mark: Price,
        max_deviation: Bps,
    },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Market error: {0}")]
    Market(#[from] MarketError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Synthetic pricer error: {0}")]
    Vamm(#[from] VammError),

    #[error("Position error: {0}")]
    Position(#[from] PositionError),

    #[error("Liquidation error: {0}")]
    Liquidation(#[from] LiquidationError),

    #[error("Insurance error: {0}")]
    Insurance(#[from] InsuranceError),
}
