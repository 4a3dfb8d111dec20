// 3.0: market registry records. a market is a keyed record: immutable
// identity (base/quote/venue references), an activity flag consumed by the
// position store and the liquidation engine, and the per-market funding
// index state. mutation is ownership-gated at the engine layer.

use crate::types::{MarketId, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Funding parameters, fixed at market creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingParams {
    /// Minimum time between funding index updates, in milliseconds.
    pub interval_ms: i64,
    /// Clamp on the per-interval funding rate magnitude.
    pub max_rate: Decimal,
    /// Multiplier applied to the mark/spot premium.
    pub rate_factor: Decimal,
}

impl Default for FundingParams {
    fn default() -> Self {
        Self {
            interval_ms: 3_600_000, // hourly
            max_rate: dec!(0.0075),
            rate_factor: dec!(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    /// Base asset reference (e.g. "ETH").
    pub base: String,
    /// Quote asset reference (e.g. "USD").
    pub quote: String,
    /// Venue reference this market settles against.
    pub venue: String,
    pub is_active: bool,
    /// Cumulative signed funding index. Positive growth means longs pay.
    pub funding_index: Decimal,
    pub last_funding_update: Timestamp,
    pub funding_params: FundingParams,
    pub created_at: Timestamp,
}

impl Market {
    pub fn new(
        id: MarketId,
        base: &str,
        quote: &str,
        venue: &str,
        funding_params: FundingParams,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            base: base.to_string(),
            quote: quote.to_string(),
            venue: venue.to_string(),
            is_active: true,
            funding_index: Decimal::ZERO,
            last_funding_update: timestamp,
            funding_params,
            created_at: timestamp,
        }
    }

    /// Whether a funding update is due. Updates are idempotent within an
    /// interval: a second caller inside the window is a no-op.
    pub fn funding_due(&self, now: Timestamp) -> bool {
        now.millis_since(self.last_funding_update) >= self.funding_params.interval_ms
    }

    pub fn record_funding(&mut self, rate: Decimal, now: Timestamp) {
        self.funding_index += rate;
        self.last_funding_update = now;
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MarketError {
    #[error("Market {0:?} already exists")]
    MarketAlreadyExists(MarketId),

    #[error("Market {0:?} not found")]
    MarketNotFound(MarketId),

    #[error("Market {0:?} is not active")]
    MarketNotActive(MarketId),
}
