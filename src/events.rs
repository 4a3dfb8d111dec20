// 9.0: every state change produces an event. the engine appends to a bounded
// in-memory log used for audit trails and for asserting behavior in tests.
// the EventPayload enum lists all event types.

use crate::types::{
    Bps, FeedId, MarketId, PositionId, Price, Quote, SignedSize, Timestamp, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Ledger events
    Deposit(DepositEvent),
    Withdrawal(WithdrawalEvent),

    // Admin events
    MarketAdded(MarketAddedEvent),
    MarketStatusChanged(MarketStatusChangedEvent),
    LiquidationConfigured(LiquidationConfiguredEvent),

    // Price events
    PriceSubmitted(PriceSubmittedEvent),
    FundingUpdated(FundingUpdatedEvent),

    // Position events
    PositionOpened(PositionOpenedEvent),
    PositionUpdated(PositionUpdatedEvent),
    PositionClosed(PositionClosedEvent),
    PositionTransferred(PositionTransferredEvent),
    MarginChanged(MarginChangedEvent),
    FundingSettled(FundingSettledEvent),

    // Risk events
    Liquidation(LiquidationEvent),
    BadDebtCovered(BadDebtCoveredEvent),

    // Insurance events
    InsuranceFeeCollected(InsuranceFeeCollectedEvent),
    InsuranceWithdrawal(InsuranceWithdrawalEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositEvent {
    pub user: UserId,
    pub amount: Quote,
    pub new_free: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalEvent {
    pub user: UserId,
    pub amount: Quote,
    pub new_free: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketAddedEvent {
    pub market_id: MarketId,
    pub base: String,
    pub quote: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketStatusChangedEvent {
    pub market_id: MarketId,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationConfiguredEvent {
    pub market_id: MarketId,
    pub maintenance_margin_ratio: Bps,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSubmittedEvent {
    pub market_id: MarketId,
    pub feed_id: FeedId,
    pub price: Price,
    pub publish_time: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingUpdatedEvent {
    pub market_id: MarketId,
    pub rate: Decimal,
    pub premium: Decimal,
    pub new_index: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionOpenedEvent {
    pub position_id: PositionId,
    pub market_id: MarketId,
    pub owner: UserId,
    pub size: SignedSize,
    pub entry_price: Price,
    pub margin: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionUpdatedEvent {
    pub position_id: PositionId,
    pub old_size: SignedSize,
    pub new_size: SignedSize,
    pub old_margin: Quote,
    pub new_margin: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionClosedEvent {
    pub position_id: PositionId,
    pub owner: UserId,
    pub exit_price: Price,
    pub closed_size: SignedSize,
    pub realized_pnl: Quote,
    pub margin_released: Quote,
    pub fully_closed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionTransferredEvent {
    pub position_id: PositionId,
    pub from: UserId,
    pub to: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginChangedEvent {
    pub position_id: PositionId,
    pub delta: Quote,
    pub new_margin: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingSettledEvent {
    pub position_id: PositionId,
    pub owner: UserId,
    /// Positive = position paid, negative = position received.
    pub payment: Quote,
    pub index_delta: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationEvent {
    pub position_id: PositionId,
    pub market_id: MarketId,
    pub owner: UserId,
    pub liquidator: UserId,
    pub size: SignedSize,
    pub price: Price,
    pub health_factor: Decimal,
    pub liquidator_fee: Quote,
    pub insurance_fee: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadDebtCoveredEvent {
    pub position_id: PositionId,
    pub owner: UserId,
    pub shortfall: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsuranceFeeCollectedEvent {
    pub amount: Quote,
    pub new_balance: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsuranceWithdrawalEvent {
    pub amount: Quote,
    pub new_balance: Quote,
}
