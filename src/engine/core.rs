// 7.0 engine/core.rs: main engine. owns the ledger, all markets with their
// synthetic pricers and feeds, the position store and the insurance fund.
// one state-changing call at a time; every operation validates before it
// mutates so a failure never leaves partial state behind.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::events::{
    DepositEvent, Event, EventId, EventPayload, InsuranceWithdrawalEvent,
    LiquidationConfiguredEvent, MarketAddedEvent, MarketStatusChangedEvent, WithdrawalEvent,
};
use crate::insurance::InsuranceFund;
use crate::ledger::Ledger;
use crate::liquidation::LiquidationConfig;
use crate::market::{Market, MarketError};
use crate::position::{Position, PositionError};
use crate::price_feed::FeedSet;
use crate::types::{FeedId, MarketId, PositionId, Quote, Timestamp, UserId};
use crate::vamm::VirtualAmm;
use std::collections::{HashMap, HashSet};

/// A market's full runtime state: the registry record, the synthetic
/// pricer and the registered external feeds.
#[derive(Debug, Clone)]
pub struct MarketState {
    pub market: Market,
    pub vamm: VirtualAmm,
    pub feeds: FeedSet,
}

impl MarketState {
    pub fn new(market: Market, vamm: VirtualAmm) -> Self {
        Self {
            market,
            vamm,
            feeds: FeedSet::new(),
        }
    }
}

/** 7.1: main engine struct. all state lives here */
#[derive(Debug)]
pub struct Engine {
    pub(super) config: EngineConfig,
    owner: UserId,
    admins: HashSet<UserId>,
    pub(super) ledger: Ledger,
    pub(super) markets: HashMap<MarketId, MarketState>,
    pub(super) positions: HashMap<PositionId, Position>,
    pub(super) liquidation_configs: HashMap<MarketId, LiquidationConfig>,
    pub(super) insurance: InsuranceFund,
    events: Vec<Event>,
    next_event_id: u64,
    pub(super) next_position_id: u64,
    pub(super) current_time: Timestamp,
}

impl Engine {
    pub fn new(owner: UserId, config: EngineConfig, insurance: InsuranceFund) -> Self {
        Self {
            config,
            owner,
            admins: HashSet::new(),
            ledger: Ledger::new(),
            markets: HashMap::new(),
            positions: HashMap::new(),
            liquidation_configs: HashMap::new(),
            insurance,
            events: Vec::new(),
            next_event_id: 1,
            next_position_id: 1,
            current_time: Timestamp::from_millis(0),
        }
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, millis: i64) {
        self.current_time = Timestamp::from_millis(self.current_time.as_millis() + millis);
    }

    // capability check: a pure predicate evaluated at the top of every
    // admin operation
    pub fn is_authorized(&self, caller: UserId) -> bool {
        caller == self.owner || self.admins.contains(&caller)
    }

    pub(super) fn require_authorized(&self, caller: UserId) -> Result<(), EngineError> {
        if self.is_authorized(caller) {
            Ok(())
        } else {
            Err(EngineError::Unauthorized(caller))
        }
    }

    pub fn authorize(&mut self, caller: UserId, admin: UserId) -> Result<(), EngineError> {
        self.require_authorized(caller)?;
        self.admins.insert(admin);
        Ok(())
    }

    pub fn revoke(&mut self, caller: UserId, admin: UserId) -> Result<(), EngineError> {
        self.require_authorized(caller)?;
        self.admins.remove(&admin);
        Ok(())
    }

    // ---- market registry ----

    pub fn add_market(
        &mut self,
        caller: UserId,
        market: Market,
        vamm: VirtualAmm,
    ) -> Result<MarketId, EngineError> {
        self.require_authorized(caller)?;
        let id = market.id;
        if self.markets.contains_key(&id) {
            return Err(MarketError::MarketAlreadyExists(id).into());
        }

        let event = MarketAddedEvent {
            market_id: id,
            base: market.base.clone(),
            quote: market.quote.clone(),
        };
        self.markets.insert(id, MarketState::new(market, vamm));
        self.emit_event(EventPayload::MarketAdded(event));
        Ok(id)
    }

    pub fn set_market_status(
        &mut self,
        caller: UserId,
        market_id: MarketId,
        active: bool,
    ) -> Result<(), EngineError> {
        self.require_authorized(caller)?;
        let state = self
            .markets
            .get_mut(&market_id)
            .ok_or(MarketError::MarketNotFound(market_id))?;
        state.market.is_active = active;
        self.emit_event(EventPayload::MarketStatusChanged(MarketStatusChangedEvent {
            market_id,
            is_active: active,
        }));
        Ok(())
    }

    pub fn configure_liquidation(
        &mut self,
        caller: UserId,
        market_id: MarketId,
        config: LiquidationConfig,
    ) -> Result<(), EngineError> {
        self.require_authorized(caller)?;
        if !self.markets.contains_key(&market_id) {
            return Err(MarketError::MarketNotFound(market_id).into());
        }
        let event = LiquidationConfiguredEvent {
            market_id,
            maintenance_margin_ratio: config.maintenance_margin_ratio,
            is_active: config.is_active,
        };
        self.liquidation_configs.insert(market_id, config);
        self.emit_event(EventPayload::LiquidationConfigured(event));
        Ok(())
    }

    pub fn register_feed(
        &mut self,
        caller: UserId,
        market_id: MarketId,
        feed_id: FeedId,
        max_age_ms: i64,
    ) -> Result<(), EngineError> {
        self.require_authorized(caller)?;
        let state = self
            .markets
            .get_mut(&market_id)
            .ok_or(MarketError::MarketNotFound(market_id))?;
        state.feeds.register(feed_id, max_age_ms);
        Ok(())
    }

    pub fn get_market(&self, market_id: MarketId) -> Option<&MarketState> {
        self.markets.get(&market_id)
    }

    pub(super) fn market_state(&self, market_id: MarketId) -> Result<&MarketState, EngineError> {
        self.markets
            .get(&market_id)
            .ok_or_else(|| MarketError::MarketNotFound(market_id).into())
    }

    pub(super) fn market_state_mut(
        &mut self,
        market_id: MarketId,
    ) -> Result<&mut MarketState, EngineError> {
        self.markets
            .get_mut(&market_id)
            .ok_or_else(|| MarketError::MarketNotFound(market_id).into())
    }

    // ---- ledger ----

    pub fn deposit(&mut self, user: UserId, amount: Quote) -> Result<(), EngineError> {
        self.ledger.deposit(user, amount)?;
        let new_free = self.ledger.free_balance(user);
        self.emit_event(EventPayload::Deposit(DepositEvent {
            user,
            amount,
            new_free,
        }));
        Ok(())
    }

    pub fn withdraw(&mut self, user: UserId, amount: Quote) -> Result<(), EngineError> {
        self.ledger.withdraw(user, amount)?;
        let new_free = self.ledger.free_balance(user);
        self.emit_event(EventPayload::Withdrawal(WithdrawalEvent {
            user,
            amount,
            new_free,
        }));
        Ok(())
    }

    pub fn free_balance(&self, user: UserId) -> Quote {
        self.ledger.free_balance(user)
    }

    pub fn locked_balance(&self, user: UserId) -> Quote {
        self.ledger.locked_balance(user)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    // ---- positions ----

    pub fn get_position(&self, id: PositionId) -> Option<&Position> {
        self.positions.get(&id)
    }

    pub fn positions_iter(&self) -> impl Iterator<Item = (&PositionId, &Position)> {
        self.positions.iter()
    }

    pub(super) fn position(&self, id: PositionId) -> Result<&Position, EngineError> {
        self.positions
            .get(&id)
            .ok_or_else(|| PositionError::PositionNotFound(id).into())
    }

    // ---- insurance fund ----

    pub fn insurance(&self) -> &InsuranceFund {
        &self.insurance
    }

    pub fn fund_deposit(&mut self, amount: Quote) -> Result<(), EngineError> {
        self.insurance.deposit(amount)?;
        Ok(())
    }

    pub fn fund_withdraw(&mut self, caller: UserId, amount: Quote) -> Result<(), EngineError> {
        self.require_authorized(caller)?;
        self.insurance.withdraw(amount)?;
        let new_balance = self.insurance.balance;
        self.emit_event(EventPayload::InsuranceWithdrawal(InsuranceWithdrawalEvent {
            amount,
            new_balance,
        }));
        Ok(())
    }

    // ---- events ----

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_time, payload);
        self.next_event_id += 1;

        if self.config.verbose {
            println!("[Event {}] {:?}", event.id.0, event.payload);
        }

        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }
}
