// 7.4 engine/liquidations.rs: forced closure of unhealthy positions.
// liquidate() verifies every precondition, including insurance coverage of
// any projected shortfall, before the first mutation. the batch entry
// point skips healthy ids and fails only when nothing was closed.

use super::core::Engine;
use super::results::{EngineError, HealthCheck, LiquidationOutcome};
use crate::events::{
    BadDebtCoveredEvent, EventPayload, InsuranceFeeCollectedEvent, LiquidationEvent,
};
use crate::liquidation::{calculate_fees, evaluate_health, LiquidationError};
use crate::position::PositionError;
use crate::types::{PositionId, Quote, UserId};

impl Engine {
    /// Health check at the current aggregated mark. Pending funding counts
    /// against equity, so an unpaid funding debt can tip a position over.
    pub fn is_position_liquidatable(
        &self,
        position_id: PositionId,
    ) -> Result<HealthCheck, EngineError> {
        let position = self.position(position_id)?;
        let config = self
            .liquidation_configs
            .get(&position.market_id)
            .ok_or(LiquidationError::MarketNotConfigured(position.market_id))?;

        let price = self.mark_price(position.market_id)?;
        let index = self.market_state(position.market_id)?.market.funding_index;
        let equity = position.equity(price, index);
        let health = evaluate_health(equity, position.notional(price), price, config);

        Ok(HealthCheck {
            position_id,
            liquidatable: health.liquidatable,
            price,
            health_factor: health.health_factor,
        })
    }

    /// Force-close an unhealthy position. Fees on notional go to the
    /// caller and the insurance fund; remaining equity returns to the
    /// owner's free balance; a negative remainder is bad debt drawn from
    /// the insurance fund, and the whole call fails if the fund cannot
    /// cover it in full.
    pub fn liquidate(
        &mut self,
        caller: UserId,
        position_id: PositionId,
    ) -> Result<LiquidationOutcome, EngineError> {
        let position = self.position(position_id)?.clone();
        let market_id = position.market_id;
        let config = self
            .liquidation_configs
            .get(&market_id)
            .ok_or(LiquidationError::MarketNotConfigured(market_id))?
            .clone();
        if !config.is_active {
            return Err(LiquidationError::LiquidationsDisabled(market_id).into());
        }

        let price = self.mark_price(market_id)?;
        let index = self.market_state(market_id)?.market.funding_index;
        let equity = position.equity(price, index);
        let notional = position.notional(price);
        let health = evaluate_health(equity, notional, price, &config);
        if !health.liquidatable {
            return Err(LiquidationError::PositionNotLiquidatable(position_id).into());
        }

        let fees = calculate_fees(notional, &config);
        let remainder = equity.sub(fees.total());
        let (owner_payout, bad_debt) = if remainder.is_negative() {
            (Quote::zero(), remainder.abs())
        } else {
            (remainder, Quote::zero())
        };
        // coverage must be certain before anything moves
        if bad_debt.is_positive() {
            self.insurance.can_cover(bad_debt)?;
        }

        let state = self.market_state_mut(market_id)?;
        state.vamm.unwind(position.size)?;

        // the owner ends with exactly the payout: unlock the margin, then
        // settle the difference. the debit never exceeds the margin just
        // unlocked, so this cannot fail on balance.
        self.ledger.unlock(position.owner, position.margin)?;
        self.ledger
            .settle_pnl(position.owner, owner_payout.sub(position.margin))?;

        if fees.insurance_fee.is_positive() {
            self.insurance.collect_fee(fees.insurance_fee)?;
            let new_balance = self.insurance.balance;
            self.emit_event(EventPayload::InsuranceFeeCollected(
                InsuranceFeeCollectedEvent {
                    amount: fees.insurance_fee,
                    new_balance,
                },
            ));
        }
        if bad_debt.is_positive() {
            self.insurance.cover_bad_debt(bad_debt)?;
            self.emit_event(EventPayload::BadDebtCovered(BadDebtCoveredEvent {
                position_id,
                owner: position.owner,
                shortfall: bad_debt,
            }));
        }
        if fees.liquidator_fee.is_positive() {
            // credited as pnl, not a deposit: the lifetime deposit counters
            // track external custody flows only
            self.ledger.settle_pnl(caller, fees.liquidator_fee)?;
        }

        self.positions.remove(&position_id);
        self.emit_event(EventPayload::Liquidation(LiquidationEvent {
            position_id,
            market_id,
            owner: position.owner,
            liquidator: caller,
            size: position.size,
            price,
            health_factor: health.health_factor,
            liquidator_fee: fees.liquidator_fee,
            insurance_fee: fees.insurance_fee,
        }));

        Ok(LiquidationOutcome {
            position_id,
            market_id,
            owner: position.owner,
            size: position.size,
            price,
            health_factor: health.health_factor,
            liquidator_fee: fees.liquidator_fee,
            insurance_fee: fees.insurance_fee,
            owner_payout,
            bad_debt,
        })
    }

    /// Liquidate a batch. Healthy or already-gone ids are skipped; any
    /// other failure aborts the batch. An oversized list or a batch that
    /// closes nothing is rejected outright.
    pub fn liquidate_batch(
        &mut self,
        caller: UserId,
        position_ids: &[PositionId],
    ) -> Result<Vec<LiquidationOutcome>, EngineError> {
        let max = self.config.max_positions_per_check;
        if position_ids.len() > max {
            return Err(LiquidationError::TooManyPositions {
                submitted: position_ids.len(),
                max,
            }
            .into());
        }

        let mut outcomes = Vec::new();
        for &id in position_ids {
            match self.liquidate(caller, id) {
                Ok(outcome) => outcomes.push(outcome),
                Err(EngineError::Liquidation(LiquidationError::PositionNotLiquidatable(_)))
                | Err(EngineError::Position(PositionError::PositionNotFound(_))) => {}
                Err(err) => return Err(err),
            }
        }

        if outcomes.is_empty() {
            return Err(LiquidationError::NoPositionsLiquidated.into());
        }
        Ok(outcomes)
    }
}
