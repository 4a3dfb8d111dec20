//! Periodic funding.
//!
//! Each interval the market's funding index moves by a clamped premium of
//! the mark over the spot reference. Longs pay when the synthetic trades
//! rich; shorts pay when it trades cheap. The index itself is the only
//! per-market state; positions settle lazily against it on mutation.

use super::core::Engine;
use super::results::{EngineError, FundingOutcome};
use crate::events::{EventPayload, FundingUpdatedEvent};
use crate::types::MarketId;
use rust_decimal::Decimal;

impl Engine {
    /// Advance the funding index if the market's interval has elapsed.
    ///
    /// Idempotent within an interval: a second call before the next due
    /// time returns `applied: false` and changes nothing. Missed intervals
    /// do not compound; a late update applies a single interval's rate.
    pub fn update_funding(&mut self, market_id: MarketId) -> Result<FundingOutcome, EngineError> {
        let mark = self.mark_price(market_id)?;
        let spot = self.spot_price(market_id)?;

        let state = self.market_state(market_id)?;
        if !state.market.funding_due(self.current_time) {
            return Ok(FundingOutcome {
                applied: false,
                rate: Decimal::ZERO,
                premium: Decimal::ZERO,
                new_index: state.market.funding_index,
            });
        }

        let premium = (mark.value() - spot.value()) / spot.value();
        let max_rate = state.market.funding_params.max_rate;
        let rate = (premium * state.market.funding_params.rate_factor)
            .clamp(-max_rate, max_rate);

        let now = self.current_time;
        let state = self.market_state_mut(market_id)?;
        state.market.record_funding(rate, now);
        let new_index = state.market.funding_index;

        self.emit_event(EventPayload::FundingUpdated(FundingUpdatedEvent {
            market_id,
            rate,
            premium,
            new_index,
        }));

        Ok(FundingOutcome {
            applied: true,
            rate,
            premium,
            new_index,
        })
    }
}
