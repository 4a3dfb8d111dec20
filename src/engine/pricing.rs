//! Price ingestion and aggregation.
//!
//! The mark price blends the synthetic pricer with every fresh external
//! feed through a median. The spot price deliberately excludes the venue's
//! own synthetic price so the funding reference is not self-referential;
//! it falls back to the synthetic mark only when no fresh external
//! observation is available.

use super::core::Engine;
use super::results::EngineError;
use crate::events::{EventPayload, PriceSubmittedEvent};
use crate::price_feed::{median, PriceUpdate};
use crate::types::{MarketId, Price};

impl Engine {
    /// Record an external feed observation for a market.
    pub fn submit_price_update(
        &mut self,
        market_id: MarketId,
        update: PriceUpdate,
    ) -> Result<(), EngineError> {
        let state = self.market_state_mut(market_id)?;
        state.feeds.submit(update)?;
        self.emit_event(EventPayload::PriceSubmitted(PriceSubmittedEvent {
            market_id,
            feed_id: update.feed_id,
            price: update.price,
            publish_time: update.publish_time,
        }));
        Ok(())
    }

    /// Median of the synthetic mark and all fresh external feeds. Used for
    /// margin and liquidation math.
    pub fn mark_price(&self, market_id: MarketId) -> Result<Price, EngineError> {
        let state = self.market_state(market_id)?;
        let mut prices = state.feeds.fresh_prices(self.current_time);
        prices.push(state.vamm.mark_price().value());

        // non-empty: the synthetic mark is always present
        let value = median(&prices).ok_or(EngineError::NoPriceAvailable(market_id))?;
        Price::new(value).ok_or(EngineError::NoPriceAvailable(market_id))
    }

    /// Median of fresh external feeds only; the funding reference. Falls
    /// back to the synthetic mark when no fresh external source exists.
    pub fn spot_price(&self, market_id: MarketId) -> Result<Price, EngineError> {
        let state = self.market_state(market_id)?;
        let prices = state.feeds.fresh_prices(self.current_time);

        if prices.is_empty() {
            return Ok(state.vamm.mark_price());
        }

        let value = median(&prices).ok_or(EngineError::NoPriceAvailable(market_id))?;
        Price::new(value).ok_or(EngineError::NoPriceAvailable(market_id))
    }
}
