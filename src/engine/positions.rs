// 7.3 engine/positions.rs: position lifecycle. every mutation settles
// accrued funding against the market index before touching size or margin,
// so pnl and leverage math always run on a settled position. opens execute
// at the synthetic mark with the caller's price as a slippage guard;
// closes execute at the caller's price, validated against the mark, so the
// curve's own impact never turns into realized pnl.

use super::core::Engine;
use super::results::{CloseResult, EngineError};
use crate::events::{
    BadDebtCoveredEvent, EventPayload, FundingSettledEvent, MarginChangedEvent,
    PositionClosedEvent, PositionOpenedEvent, PositionTransferredEvent, PositionUpdatedEvent,
};
use crate::ledger::LedgerError;
use crate::market::MarketError;
use crate::position::{calculate_pnl, leverage, split_for_close, Position, PositionError};
use crate::types::{Bps, MarketId, PositionId, Price, Quote, SignedSize, UserId};

fn require_owner(position: &Position, caller: UserId) -> Result<(), PositionError> {
    if position.owner == caller {
        Ok(())
    } else {
        Err(PositionError::NotPositionOwner {
            position: position.id,
            caller,
        })
    }
}

impl Engine {
    /// Open a new position. `price` is the caller's expected execution
    /// price; the trade executes at the synthetic mark and fails with
    /// `PriceOutOfRange` if the two diverge past the market's deviation cap.
    pub fn open_position(
        &mut self,
        caller: UserId,
        market_id: MarketId,
        size: SignedSize,
        price: Price,
        margin: Quote,
    ) -> Result<PositionId, EngineError> {
        if size.is_zero() {
            return Err(PositionError::ZeroSize.into());
        }
        let spot = self.spot_price(market_id)?;
        let state = self.market_state(market_id)?;
        if !state.market.is_active {
            return Err(MarketError::MarketNotActive(market_id).into());
        }
        if margin < self.config.min_margin {
            return Err(PositionError::InsufficientMargin {
                provided: margin,
                minimum: self.config.min_margin,
            }
            .into());
        }

        let entry = state.vamm.mark_price();
        let max_deviation = state.vamm.params.max_deviation_bps;
        if price.deviation_from(entry) > max_deviation.as_fraction() {
            return Err(EngineError::PriceOutOfRange {
                requested: price,
                mark: entry,
                max_deviation,
            });
        }

        let notional = Quote::new(size.abs() * entry.value());
        let lev = leverage(notional, margin);
        if lev > self.config.max_leverage {
            return Err(PositionError::ExceedsMaxLeverage {
                leverage: lev,
                max: self.config.max_leverage,
            }
            .into());
        }
        let funding_index = state.market.funding_index;

        self.ledger.lock(caller, margin)?;
        let state = self.market_state_mut(market_id)?;
        let impact = match state.vamm.apply_trade(size, spot) {
            Ok(impact) => impact,
            Err(err) => {
                // back out the lock so the failed open leaves no trace
                self.ledger.unlock(caller, margin)?;
                return Err(err.into());
            }
        };

        let id = PositionId(self.next_position_id);
        self.next_position_id += 1;
        let position = Position::new(
            id,
            caller,
            market_id,
            size,
            impact.executed_at,
            margin,
            funding_index,
            self.current_time,
        );
        self.positions.insert(id, position);

        self.emit_event(EventPayload::PositionOpened(PositionOpenedEvent {
            position_id: id,
            market_id,
            owner: caller,
            size,
            entry_price: impact.executed_at,
            margin,
        }));
        Ok(id)
    }

    /// Resize a position and retarget its margin. The direction cannot
    /// flip; shrinking realizes a proportional pnl slice at the current
    /// mark, growing blends the entry price.
    pub fn update_position(
        &mut self,
        caller: UserId,
        position_id: PositionId,
        new_size: SignedSize,
        new_margin: Quote,
    ) -> Result<(), EngineError> {
        let position = self.position(position_id)?;
        require_owner(position, caller)?;
        if new_size.is_zero() {
            return Err(PositionError::ZeroSize.into());
        }
        if new_size.is_long() != position.size.is_long() {
            return Err(PositionError::DirectionChange(position_id).into());
        }
        if new_margin < self.config.min_margin {
            return Err(PositionError::InsufficientMargin {
                provided: new_margin,
                minimum: self.config.min_margin,
            }
            .into());
        }
        let market_id = position.market_id;

        // the funding settlement stands on its own even if a later
        // validation fails; it records money already owed
        self.settle_position_funding(position_id)?;
        let position = self.position(position_id)?.clone();

        let spot = self.spot_price(market_id)?;
        let state = self.market_state(market_id)?;
        let exec = state.vamm.mark_price();

        let lev = leverage(Quote::new(new_size.abs() * exec.value()), new_margin);
        if lev > self.config.max_leverage {
            return Err(PositionError::ExceedsMaxLeverage {
                leverage: lev,
                max: self.config.max_leverage,
            }
            .into());
        }

        let owner = position.owner;
        let side = position.side();
        let abs_delta = new_size.abs() - position.size.abs();
        if abs_delta.is_sign_negative() && !abs_delta.is_zero() {
            // a shrink realizes a pnl slice at the current mark; the loss
            // must be coverable before the curve or the ledger moves
            let closed = SignedSize::from_side(side, -abs_delta);
            let realized = calculate_pnl(closed, position.entry_price, exec);
            self.ensure_loss_coverable(owner, realized)?;
        }
        let margin_grows = new_margin > position.margin;
        if margin_grows {
            self.ledger.lock(owner, new_margin.sub(position.margin))?;
        }

        let mut new_entry = position.entry_price;
        if !abs_delta.is_zero() {
            let state = self.market_state_mut(market_id)?;
            let result = if abs_delta.is_sign_positive() {
                state.vamm.apply_trade(SignedSize::from_side(side, abs_delta), spot)
            } else {
                state.vamm.unwind(SignedSize::from_side(side, -abs_delta))
            };
            let impact = match result {
                Ok(impact) => impact,
                Err(err) => {
                    if margin_grows {
                        self.ledger.unlock(owner, new_margin.sub(position.margin))?;
                    }
                    return Err(err.into());
                }
            };

            if abs_delta.is_sign_positive() {
                // blended entry: old exposure at the old entry, new slice
                // at its execution price
                let blended = (position.size.abs() * position.entry_price.value()
                    + abs_delta * impact.executed_at.value())
                    / new_size.abs();
                new_entry = Price::new_unchecked(blended);
            } else {
                // exec is the pre-unwind mark, the price the slice left at
                let closed = SignedSize::from_side(side, -abs_delta);
                let realized = calculate_pnl(closed, position.entry_price, exec);
                self.settle_pnl_with_backstop(position_id, owner, realized)?;
            }
        }

        if !margin_grows && new_margin < position.margin {
            self.ledger.unlock(owner, position.margin.sub(new_margin))?;
        }

        let now = self.current_time;
        if let Some(p) = self.positions.get_mut(&position_id) {
            p.size = new_size;
            p.margin = new_margin;
            p.entry_price = new_entry;
            p.updated_at = now;
        }
        self.emit_event(EventPayload::PositionUpdated(PositionUpdatedEvent {
            position_id,
            old_size: position.size,
            new_size,
            old_margin: position.margin,
            new_margin,
        }));
        Ok(())
    }

    /// Close all or part of a position at the caller's `exit_price`, which
    /// must sit within the deviation cap of the current mark. Executing at
    /// the validated exit price rather than the mark keeps the curve's own
    /// impact from being realized as pnl: an open-then-close round trip at
    /// one price returns the margin unchanged. `size_bps` scales both size
    /// and margin; the remainder keeps its entry price. A loss exceeding
    /// the owner's total balance becomes bad debt covered by the insurance
    /// fund, and the whole call fails before any mutation if the fund
    /// cannot cover it.
    pub fn close_position(
        &mut self,
        caller: UserId,
        position_id: PositionId,
        exit_price: Price,
        size_bps: Bps,
    ) -> Result<CloseResult, EngineError> {
        let position = self.position(position_id)?;
        require_owner(position, caller)?;
        let market_id = position.market_id;
        let position = position.clone();

        let slice = split_for_close(&position, size_bps)?;
        let state = self.market_state(market_id)?;
        let mark = state.vamm.mark_price();
        let max_deviation = state.vamm.params.max_deviation_bps;
        if exit_price.deviation_from(mark) > max_deviation.as_fraction() {
            return Err(EngineError::PriceOutOfRange {
                requested: exit_price,
                mark,
                max_deviation,
            });
        }
        let pnl = calculate_pnl(slice.closed_size, position.entry_price, exit_price);

        // the funding settlement stands on its own even if the coverage
        // check below fails; it records money already owed
        let funding_paid = self.settle_position_funding(position_id)?;
        self.ensure_loss_coverable(position.owner, pnl)?;

        self.ledger.unlock(position.owner, slice.released_margin)?;
        let state = self.market_state_mut(market_id)?;
        if let Err(err) = state.vamm.unwind(slice.closed_size) {
            // back out the unlock so the failed close leaves no trace
            self.ledger.lock(position.owner, slice.released_margin)?;
            return Err(err.into());
        }
        self.settle_pnl_with_backstop(position_id, position.owner, pnl)?;

        let now = self.current_time;
        if slice.is_full_close {
            self.positions.remove(&position_id);
        } else if let Some(p) = self.positions.get_mut(&position_id) {
            p.size = slice.remaining_size;
            p.margin = slice.remaining_margin;
            p.updated_at = now;
        }

        self.emit_event(EventPayload::PositionClosed(PositionClosedEvent {
            position_id,
            owner: position.owner,
            exit_price,
            closed_size: slice.closed_size,
            realized_pnl: pnl,
            margin_released: slice.released_margin,
            fully_closed: slice.is_full_close,
        }));

        Ok(CloseResult {
            position_id,
            closed_size: slice.closed_size,
            exit_price,
            realized_pnl: pnl,
            margin_released: slice.released_margin,
            funding_paid,
            fully_closed: slice.is_full_close,
        })
    }

    pub fn add_margin(
        &mut self,
        caller: UserId,
        position_id: PositionId,
        amount: Quote,
    ) -> Result<(), EngineError> {
        let position = self.position(position_id)?;
        require_owner(position, caller)?;
        let owner = position.owner;

        self.ledger.lock(owner, amount)?;
        let now = self.current_time;
        let mut new_margin = Quote::zero();
        if let Some(p) = self.positions.get_mut(&position_id) {
            p.margin = p.margin.add(amount);
            p.updated_at = now;
            new_margin = p.margin;
        }
        self.emit_event(EventPayload::MarginChanged(MarginChangedEvent {
            position_id,
            delta: amount,
            new_margin,
        }));
        Ok(())
    }

    /// Pull collateral out of a position. Fails if the remainder would
    /// fall under the margin floor or push leverage past the cap.
    pub fn remove_margin(
        &mut self,
        caller: UserId,
        position_id: PositionId,
        amount: Quote,
    ) -> Result<(), EngineError> {
        let position = self.position(position_id)?;
        require_owner(position, caller)?;
        let position = position.clone();

        let new_margin = position.margin.sub(amount);
        if new_margin < self.config.min_margin {
            return Err(PositionError::InsufficientMargin {
                provided: new_margin,
                minimum: self.config.min_margin,
            }
            .into());
        }
        let price = self.mark_price(position.market_id)?;
        let lev = leverage(position.notional(price), new_margin);
        if lev > self.config.max_leverage {
            return Err(PositionError::ExceedsMaxLeverage {
                leverage: lev,
                max: self.config.max_leverage,
            }
            .into());
        }

        self.ledger.unlock(position.owner, amount)?;
        let now = self.current_time;
        if let Some(p) = self.positions.get_mut(&position_id) {
            p.margin = new_margin;
            p.updated_at = now;
        }
        self.emit_event(EventPayload::MarginChanged(MarginChangedEvent {
            position_id,
            delta: amount.negate(),
            new_margin,
        }));
        Ok(())
    }

    /// Hand a position to another user. Funding settles under the current
    /// owner first; the locked margin follows the position.
    pub fn transfer_position(
        &mut self,
        caller: UserId,
        position_id: PositionId,
        new_owner: UserId,
    ) -> Result<(), EngineError> {
        let position = self.position(position_id)?;
        require_owner(position, caller)?;

        self.settle_position_funding(position_id)?;
        let position = self.position(position_id)?;
        let from = position.owner;
        let margin = position.margin;

        self.ledger.transfer_locked(from, new_owner, margin)?;
        let now = self.current_time;
        if let Some(p) = self.positions.get_mut(&position_id) {
            p.owner = new_owner;
            p.updated_at = now;
        }
        self.emit_event(EventPayload::PositionTransferred(PositionTransferredEvent {
            position_id,
            from,
            to: new_owner,
        }));
        Ok(())
    }

    /// Reject a realized loss that neither the owner's total balance nor
    /// the insurance fund can absorb, before any state has moved. Mirrors
    /// the waterfall in `settle_pnl_with_backstop`: the fund is only asked
    /// for the part past the owner's balance.
    fn ensure_loss_coverable(&self, owner: UserId, pnl: Quote) -> Result<(), EngineError> {
        if !pnl.is_negative() {
            return Ok(());
        }
        let loss = pnl.abs();
        let total = self
            .ledger
            .free_balance(owner)
            .add(self.ledger.locked_balance(owner));
        if loss > total {
            self.insurance.can_cover(loss.sub(total))?;
        }
        Ok(())
    }

    /// Settle funding accrued since the position's last settlement.
    /// Returns the payment (positive = position paid). A debit the owner
    /// cannot fully cover drains the balance and routes the remainder to
    /// the insurance fund.
    pub(super) fn settle_position_funding(
        &mut self,
        position_id: PositionId,
    ) -> Result<Quote, EngineError> {
        let position = self.position(position_id)?;
        let owner = position.owner;
        let market_id = position.market_id;
        let last_index = position.last_funding_index;
        let index = self.market_state(market_id)?.market.funding_index;
        let payment = self.position(position_id)?.pending_funding(index);

        if !payment.is_zero() {
            match self.ledger.apply_funding(owner, payment.negate()) {
                Ok(()) => {}
                Err(LedgerError::InsufficientTotalBalance {
                    available, shortfall, ..
                }) => {
                    self.insurance.can_cover(shortfall)?;
                    if available.is_positive() {
                        self.ledger.apply_funding(owner, available.negate())?;
                    }
                    self.insurance.cover_bad_debt(shortfall)?;
                    self.emit_event(EventPayload::BadDebtCovered(BadDebtCoveredEvent {
                        position_id,
                        owner,
                        shortfall,
                    }));
                }
                Err(err) => return Err(err.into()),
            }
        }

        let now = self.current_time;
        if let Some(p) = self.positions.get_mut(&position_id) {
            p.last_funding_index = index;
            p.funding_paid = p.funding_paid.add(payment);
            p.updated_at = now;
        }
        if !payment.is_zero() {
            self.emit_event(EventPayload::FundingSettled(FundingSettledEvent {
                position_id,
                owner,
                payment,
                index_delta: index - last_index,
            }));
        }
        Ok(payment)
    }

    /// Settle realized pnl, falling back to the insurance fund when a loss
    /// exceeds the owner's total balance.
    pub(super) fn settle_pnl_with_backstop(
        &mut self,
        position_id: PositionId,
        owner: UserId,
        pnl: Quote,
    ) -> Result<(), EngineError> {
        match self.ledger.settle_pnl(owner, pnl) {
            Ok(()) => Ok(()),
            Err(LedgerError::InsufficientTotalBalance {
                available, shortfall, ..
            }) => {
                self.insurance.can_cover(shortfall)?;
                if available.is_positive() {
                    self.ledger.settle_pnl(owner, available.negate())?;
                }
                self.insurance.cover_bad_debt(shortfall)?;
                self.emit_event(EventPayload::BadDebtCovered(BadDebtCoveredEvent {
                    position_id,
                    owner,
                    shortfall,
                }));
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::insurance::{InsuranceError, InsuranceFund};
    use crate::market::{FundingParams, Market};
    use crate::types::Timestamp;
    use crate::vamm::{VammParams, VirtualAmm};
    use rust_decimal_macros::dec;

    const ADMIN: UserId = UserId(0);
    const ALICE: UserId = UserId(1);
    const BOB: UserId = UserId(2);
    const ETH: MarketId = MarketId(1);

    // deep curve so execution prices stay close to 2000 in tests
    fn trading_engine() -> Engine {
        let mut engine = Engine::new(
            ADMIN,
            EngineConfig::default(),
            InsuranceFund::new(Quote::zero(), Quote::new(dec!(1_000_000))),
        );
        let market = Market::new(
            ETH,
            "ETH",
            "USD",
            "main",
            FundingParams::default(),
            Timestamp::from_millis(0),
        );
        let vamm = VirtualAmm::new(
            Price::new_unchecked(dec!(2000)),
            dec!(1_000_000),
            VammParams::default(),
        );
        engine.add_market(ADMIN, market, vamm).unwrap();
        engine.deposit(ALICE, Quote::new(dec!(10000))).unwrap();
        engine.deposit(BOB, Quote::new(dec!(10000))).unwrap();
        engine
    }

    fn open_default(engine: &mut Engine, user: UserId) -> PositionId {
        engine
            .open_position(
                user,
                ETH,
                SignedSize::new(dec!(1)),
                Price::new_unchecked(dec!(2000)),
                Quote::new(dec!(1000)),
            )
            .unwrap()
    }

    #[test]
    fn open_locks_margin() {
        let mut engine = trading_engine();
        let id = open_default(&mut engine, ALICE);

        let position = engine.get_position(id).unwrap();
        assert_eq!(position.entry_price.value(), dec!(2000));
        assert_eq!(position.margin.value(), dec!(1000));
        assert_eq!(engine.free_balance(ALICE).value(), dec!(9000));
        assert_eq!(engine.locked_balance(ALICE).value(), dec!(1000));
    }

    #[test]
    fn open_rejects_thin_margin() {
        let mut engine = trading_engine();
        let result = engine.open_position(
            ALICE,
            ETH,
            SignedSize::new(dec!(0.01)),
            Price::new_unchecked(dec!(2000)),
            Quote::new(dec!(50)),
        );
        assert!(matches!(
            result,
            Err(EngineError::Position(PositionError::InsufficientMargin { .. }))
        ));
    }

    #[test]
    fn open_rejects_excess_leverage() {
        let mut engine = trading_engine();
        // notional 40_000 on 1000 margin = 40x, cap is 20x
        let result = engine.open_position(
            ALICE,
            ETH,
            SignedSize::new(dec!(20)),
            Price::new_unchecked(dec!(2000)),
            Quote::new(dec!(1000)),
        );
        assert!(matches!(
            result,
            Err(EngineError::Position(PositionError::ExceedsMaxLeverage { .. }))
        ));
        // rejected open leaves the ledger untouched
        assert_eq!(engine.free_balance(ALICE).value(), dec!(10000));
    }

    #[test]
    fn open_rejects_inactive_market() {
        let mut engine = trading_engine();
        engine.set_market_status(ADMIN, ETH, false).unwrap();
        let result = engine.open_position(
            ALICE,
            ETH,
            SignedSize::new(dec!(1)),
            Price::new_unchecked(dec!(2000)),
            Quote::new(dec!(1000)),
        );
        assert!(matches!(
            result,
            Err(EngineError::Market(MarketError::MarketNotActive(_)))
        ));
    }

    #[test]
    fn open_rejects_price_far_from_mark() {
        let mut engine = trading_engine();
        let result = engine.open_position(
            ALICE,
            ETH,
            SignedSize::new(dec!(1)),
            Price::new_unchecked(dec!(2500)),
            Quote::new(dec!(1000)),
        );
        assert!(matches!(result, Err(EngineError::PriceOutOfRange { .. })));
    }

    #[test]
    fn full_close_round_trip() {
        let mut engine = trading_engine();
        let id = open_default(&mut engine, ALICE);

        let result = engine
            .close_position(
                ALICE,
                id,
                Price::new_unchecked(dec!(2000)),
                Bps::ONE_HUNDRED_PERCENT,
            )
            .unwrap();

        assert!(result.fully_closed);
        assert!(engine.get_position(id).is_none());
        assert_eq!(engine.locked_balance(ALICE).value(), dec!(0));
        // a zero-information round trip returns the balance exactly: the
        // open's own price impact must not be collectable on the way out
        assert_eq!(result.realized_pnl.value(), dec!(0));
        assert_eq!(engine.free_balance(ALICE).value(), dec!(10000));
        assert!(engine.ledger().check_conservation());
    }

    #[test]
    fn close_realizes_pnl_at_the_validated_exit_price() {
        let mut engine = trading_engine();
        let id = open_default(&mut engine, ALICE);

        // 1950 sits within the 5% deviation cap of the ~2000 mark
        let result = engine
            .close_position(
                ALICE,
                id,
                Price::new_unchecked(dec!(1950)),
                Bps::ONE_HUNDRED_PERCENT,
            )
            .unwrap();

        assert_eq!(result.exit_price.value(), dec!(1950));
        assert_eq!(result.realized_pnl.value(), dec!(-50));
        assert_eq!(engine.free_balance(ALICE).value(), dec!(9950));
    }

    #[test]
    fn partial_close_scales_size_and_margin() {
        let mut engine = trading_engine();
        let id = open_default(&mut engine, ALICE);

        let result = engine
            .close_position(ALICE, id, Price::new_unchecked(dec!(2000)), Bps::new(4_000))
            .unwrap();

        assert!(!result.fully_closed);
        assert_eq!(result.closed_size.value(), dec!(0.4));
        assert_eq!(result.margin_released.value(), dec!(400));

        let position = engine.get_position(id).unwrap();
        assert_eq!(position.size.value(), dec!(0.6));
        assert_eq!(position.margin.value(), dec!(600));
        assert_eq!(position.entry_price.value(), dec!(2000));
        assert_eq!(engine.locked_balance(ALICE).value(), dec!(600));
    }

    #[test]
    fn close_requires_owner() {
        let mut engine = trading_engine();
        let id = open_default(&mut engine, ALICE);
        let result = engine.close_position(
            BOB,
            id,
            Price::new_unchecked(dec!(2000)),
            Bps::ONE_HUNDRED_PERCENT,
        );
        assert!(matches!(
            result,
            Err(EngineError::Position(PositionError::NotPositionOwner { .. }))
        ));
    }

    #[test]
    fn close_settles_pending_funding() {
        let mut engine = trading_engine();
        let id = open_default(&mut engine, ALICE);

        // index moves 5 against longs after the open
        engine
            .market_state_mut(ETH)
            .unwrap()
            .market
            .record_funding(dec!(5), Timestamp::from_millis(1));

        let total_before = engine.free_balance(ALICE).add(engine.locked_balance(ALICE));
        let result = engine
            .close_position(
                ALICE,
                id,
                Price::new_unchecked(dec!(2000)),
                Bps::ONE_HUNDRED_PERCENT,
            )
            .unwrap();

        assert_eq!(result.funding_paid.value(), dec!(5));
        let total_after = engine.free_balance(ALICE).add(engine.locked_balance(ALICE));
        // exit at entry realizes zero pnl, so the funding debit is the
        // whole difference
        assert_eq!(total_before.sub(total_after).value(), dec!(5));
    }

    #[test]
    fn rejected_close_price_settles_nothing() {
        let mut engine = trading_engine();
        let id = open_default(&mut engine, ALICE);
        engine
            .market_state_mut(ETH)
            .unwrap()
            .market
            .record_funding(dec!(5), Timestamp::from_millis(1));

        let free_before = engine.free_balance(ALICE);
        let result = engine.close_position(
            ALICE,
            id,
            Price::new_unchecked(dec!(2500)),
            Bps::ONE_HUNDRED_PERCENT,
        );
        assert!(matches!(result, Err(EngineError::PriceOutOfRange { .. })));

        // the rejected close settled no funding and moved no money
        let position = engine.get_position(id).unwrap();
        assert_eq!(position.last_funding_index, dec!(0));
        assert_eq!(engine.free_balance(ALICE), free_before);
        assert_eq!(engine.locked_balance(ALICE).value(), dec!(1000));
    }

    // a thin account at 10x whose loss will outrun both its balance and a
    // 1-unit insurance coverage cap
    fn thin_account_engine() -> (Engine, PositionId) {
        let mut engine = trading_engine();
        engine.insurance.max_coverage_per_event = Quote::new(dec!(1));
        engine.withdraw(ALICE, Quote::new(dec!(9800))).unwrap();
        let id = engine
            .open_position(
                ALICE,
                ETH,
                SignedSize::new(dec!(1)),
                Price::new_unchecked(dec!(2000)),
                Quote::new(dec!(200)),
            )
            .unwrap();
        // the market gaps 15% down
        engine.market_state_mut(ETH).unwrap().vamm = VirtualAmm::new(
            Price::new_unchecked(dec!(1700)),
            dec!(1_000_000),
            VammParams::default(),
        );
        (engine, id)
    }

    #[test]
    fn uncoverable_close_loss_fails_before_any_mutation() {
        let (mut engine, id) = thin_account_engine();
        let reserves_before = engine.market_state(ETH).unwrap().vamm.reserves();

        // closing at 1700 realizes a 300 loss against a 200 balance, and
        // the fund cap cannot absorb the 100 shortfall
        let result = engine.close_position(
            ALICE,
            id,
            Price::new_unchecked(dec!(1700)),
            Bps::ONE_HUNDRED_PERCENT,
        );
        assert!(matches!(
            result,
            Err(EngineError::Insurance(
                InsuranceError::ExceedsMaxCoverage { .. }
            ))
        ));

        // the failed close left everything in place: position open, margin
        // still locked, curve untouched
        let position = engine.get_position(id).unwrap();
        assert_eq!(position.margin.value(), dec!(200));
        assert_eq!(engine.locked_balance(ALICE).value(), dec!(200));
        assert_eq!(engine.free_balance(ALICE).value(), dec!(0));
        assert_eq!(
            engine.market_state(ETH).unwrap().vamm.reserves(),
            reserves_before
        );
    }

    #[test]
    fn uncoverable_shrink_loss_fails_before_any_mutation() {
        let (mut engine, id) = thin_account_engine();
        let reserves_before = engine.market_state(ETH).unwrap().vamm.reserves();

        // shedding 0.9 at the 1700 mark realizes a 270 loss against a 200
        // balance; the 70 shortfall exceeds the fund cap
        let result = engine.update_position(
            ALICE,
            id,
            SignedSize::new(dec!(0.1)),
            Quote::new(dec!(200)),
        );
        assert!(matches!(
            result,
            Err(EngineError::Insurance(
                InsuranceError::ExceedsMaxCoverage { .. }
            ))
        ));

        let position = engine.get_position(id).unwrap();
        assert_eq!(position.size.value(), dec!(1));
        assert_eq!(position.margin.value(), dec!(200));
        assert_eq!(engine.locked_balance(ALICE).value(), dec!(200));
        assert_eq!(
            engine.market_state(ETH).unwrap().vamm.reserves(),
            reserves_before
        );
    }

    #[test]
    fn update_grows_size_with_blended_entry() {
        let mut engine = trading_engine();
        let id = open_default(&mut engine, ALICE);

        engine
            .update_position(ALICE, id, SignedSize::new(dec!(2)), Quote::new(dec!(2000)))
            .unwrap();

        let position = engine.get_position(id).unwrap();
        assert_eq!(position.size.value(), dec!(2));
        assert_eq!(position.margin.value(), dec!(2000));
        // second slice executed a hair above 2000 on the deep curve
        assert!(position.entry_price.value() >= dec!(2000));
        assert_eq!(engine.locked_balance(ALICE).value(), dec!(2000));
    }

    #[test]
    fn update_cannot_flip_direction() {
        let mut engine = trading_engine();
        let id = open_default(&mut engine, ALICE);
        let result =
            engine.update_position(ALICE, id, SignedSize::new(dec!(-1)), Quote::new(dec!(1000)));
        assert!(matches!(
            result,
            Err(EngineError::Position(PositionError::DirectionChange(_)))
        ));
    }

    #[test]
    fn margin_add_remove() {
        let mut engine = trading_engine();
        let id = open_default(&mut engine, ALICE);

        engine.add_margin(ALICE, id, Quote::new(dec!(500))).unwrap();
        assert_eq!(engine.get_position(id).unwrap().margin.value(), dec!(1500));
        assert_eq!(engine.locked_balance(ALICE).value(), dec!(1500));

        engine
            .remove_margin(ALICE, id, Quote::new(dec!(1000)))
            .unwrap();
        assert_eq!(engine.get_position(id).unwrap().margin.value(), dec!(500));
        assert_eq!(engine.locked_balance(ALICE).value(), dec!(500));
    }

    #[test]
    fn remove_margin_keeps_floor_and_leverage() {
        let mut engine = trading_engine();
        let id = open_default(&mut engine, ALICE);

        // 1000 - 950 = 50 < min_margin 100
        let result = engine.remove_margin(ALICE, id, Quote::new(dec!(950)));
        assert!(matches!(
            result,
            Err(EngineError::Position(PositionError::InsufficientMargin { .. }))
        ));

        // notional ~2000 at 20x cap allows margin down to ~100, but a
        // removal leaving 120 still passes both gates
        engine.remove_margin(ALICE, id, Quote::new(dec!(880))).unwrap();
        assert_eq!(engine.get_position(id).unwrap().margin.value(), dec!(120));
    }

    #[test]
    fn transfer_moves_margin_with_position() {
        let mut engine = trading_engine();
        let id = open_default(&mut engine, ALICE);

        engine.transfer_position(ALICE, id, BOB).unwrap();

        let position = engine.get_position(id).unwrap();
        assert_eq!(position.owner, BOB);
        assert_eq!(engine.locked_balance(ALICE).value(), dec!(0));
        assert_eq!(engine.locked_balance(BOB).value(), dec!(1000));
        assert!(engine.ledger().check_conservation());

        // the old owner lost mutation rights with the transfer
        let result = engine.close_position(
            ALICE,
            id,
            Price::new_unchecked(dec!(2000)),
            Bps::ONE_HUNDRED_PERCENT,
        );
        assert!(matches!(
            result,
            Err(EngineError::Position(PositionError::NotPositionOwner { .. }))
        ));
    }
}
