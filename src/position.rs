// 5.0: position records and the math on them. pnl = size * (mark - entry);
// funding owed = size * (index - last_settled_index).
// 5.2 has the proportional split used for partial closes.

use crate::types::{Bps, MarketId, Price, PositionId, Quote, Side, SignedSize, Timestamp, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    /// Economically exposed party. Mutation rights follow this field;
    /// transfer is an explicit ownership-change operation.
    pub owner: UserId,
    pub market_id: MarketId,
    pub size: SignedSize,
    pub entry_price: Price,
    /// Collateral committed to this position. Locked in the ledger.
    pub margin: Quote,
    /// Funding index at the last settlement against this position.
    pub last_funding_index: Decimal,
    /// Cumulative funding this position has paid (negative = received).
    pub funding_paid: Quote,
    pub opened_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: PositionId,
        owner: UserId,
        market_id: MarketId,
        size: SignedSize,
        entry_price: Price,
        margin: Quote,
        funding_index: Decimal,
        timestamp: Timestamp,
    ) -> Self {
        debug_assert!(!size.is_zero(), "open position must have non-zero size");
        Self {
            id,
            owner,
            market_id,
            size,
            entry_price,
            margin,
            last_funding_index: funding_index,
            funding_paid: Quote::zero(),
            opened_at: timestamp,
            updated_at: timestamp,
        }
    }

    pub fn side(&self) -> Side {
        // size is never zero while the position exists
        if self.size.is_long() {
            Side::Long
        } else {
            Side::Short
        }
    }

    pub fn notional(&self, price: Price) -> Quote {
        Quote::new(self.size.abs() * price.value())
    }

    // 5.1: paper gains/losses at the given price
    pub fn unrealized_pnl(&self, price: Price) -> Quote {
        calculate_pnl(self.size, self.entry_price, price)
    }

    /// Funding owed since the last settlement. Positive means this position
    /// pays (a long under a rising index), negative means it receives.
    pub fn pending_funding(&self, current_index: Decimal) -> Quote {
        Quote::new(self.size.value() * (current_index - self.last_funding_index))
    }

    /// margin + pnl - pending funding. this against the maintenance floor
    /// decides liquidation.
    pub fn equity(&self, price: Price, current_index: Decimal) -> Quote {
        self.margin
            .add(self.unrealized_pnl(price))
            .sub(self.pending_funding(current_index))
    }

    /// notional / margin at the given price.
    pub fn leverage(&self, price: Price) -> Decimal {
        leverage(self.notional(price), self.margin)
    }
}

// the pnl formula. size * (exit - entry); sign of size carries direction
pub fn calculate_pnl(size: SignedSize, entry_price: Price, exit_price: Price) -> Quote {
    Quote::new(size.value() * (exit_price.value() - entry_price.value()))
}

pub fn leverage(notional: Quote, margin: Quote) -> Decimal {
    if margin.is_positive() {
        notional.value() / margin.value()
    } else {
        Decimal::MAX
    }
}

// 5.2: proportional slice for a partial close. size and margin scale by the
// same fraction so the remainder keeps its leverage and entry price.
#[derive(Debug, Clone, Copy)]
pub struct CloseSlice {
    pub closed_size: SignedSize,
    pub released_margin: Quote,
    pub remaining_size: SignedSize,
    pub remaining_margin: Quote,
    pub is_full_close: bool,
}

pub fn split_for_close(position: &Position, size_bps: Bps) -> Result<CloseSlice, PositionError> {
    if size_bps.value() == 0 || size_bps.value() > Bps::ONE_HUNDRED_PERCENT.value() {
        return Err(PositionError::InvalidCloseFraction(size_bps));
    }

    if size_bps.is_full() {
        return Ok(CloseSlice {
            closed_size: position.size,
            released_margin: position.margin,
            remaining_size: SignedSize::zero(),
            remaining_margin: Quote::zero(),
            is_full_close: true,
        });
    }

    let fraction = size_bps.as_fraction();
    let closed_size = position.size.scaled(fraction);
    let released_margin = position.margin.mul(fraction);

    Ok(CloseSlice {
        closed_size,
        released_margin,
        remaining_size: SignedSize::new(position.size.value() - closed_size.value()),
        remaining_margin: position.margin.sub(released_margin),
        is_full_close: false,
    })
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PositionError {
    #[error("Position {0:?} not found")]
    PositionNotFound(PositionId),

    #[error("Caller {caller:?} does not own position {position:?}")]
    NotPositionOwner {
        position: PositionId,
        caller: UserId,
    },

    #[error("Insufficient margin: provided {provided}, minimum {minimum}")]
    InsufficientMargin { provided: Quote, minimum: Quote },

    #[error("Leverage {leverage} exceeds maximum {max}")]
    ExceedsMaxLeverage { leverage: Decimal, max: Decimal },

    #[error("Position size must be non-zero")]
    ZeroSize,

    #[error("Position {0:?} cannot reverse direction in an update")]
    DirectionChange(PositionId),

    #[error("Invalid close fraction: {0:?}")]
    InvalidCloseFraction(Bps),
}
