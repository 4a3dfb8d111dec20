// 10.0: insurance fund, the backstop for bad debt. fees flow in from
// liquidations; payouts flow out when a closed position's losses exceed its
// collateral. withdrawals cannot take the balance below min_balance, and a
// single bad-debt event is capped by max_coverage_per_event so one blowup
// cannot drain the fund.

use crate::types::{Bps, Quote};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsuranceFund {
    pub balance: Quote,
    /// Withdrawal floor. The fund is unhealthy below this.
    pub min_balance: Quote,
    /// Cap on what a single bad-debt event may draw.
    pub max_coverage_per_event: Quote,
    pub total_fees_collected: Quote,
    pub total_payouts: Quote,
}

impl InsuranceFund {
    pub fn new(min_balance: Quote, max_coverage_per_event: Quote) -> Self {
        Self {
            balance: Quote::zero(),
            min_balance,
            max_coverage_per_event,
            total_fees_collected: Quote::zero(),
            total_payouts: Quote::zero(),
        }
    }

    pub fn deposit(&mut self, amount: Quote) -> Result<(), InsuranceError> {
        require_positive(amount)?;
        self.balance = self.balance.add(amount);
        Ok(())
    }

    pub fn withdraw(&mut self, amount: Quote) -> Result<(), InsuranceError> {
        require_positive(amount)?;
        let remaining = self.balance.sub(amount);
        if remaining < self.min_balance {
            return Err(InsuranceError::BelowMinBalance {
                requested: amount,
                balance: self.balance,
                floor: self.min_balance,
            });
        }
        self.balance = remaining;
        Ok(())
    }

    pub fn collect_fee(&mut self, amount: Quote) -> Result<(), InsuranceError> {
        require_positive(amount)?;
        self.balance = self.balance.add(amount);
        self.total_fees_collected = self.total_fees_collected.add(amount);
        Ok(())
    }

    /// Whether a bad-debt draw of `amount` would succeed. Used by the
    /// liquidation engine to validate before mutating anything.
    pub fn can_cover(&self, amount: Quote) -> Result<(), InsuranceError> {
        if amount > self.max_coverage_per_event {
            return Err(InsuranceError::ExceedsMaxCoverage {
                requested: amount,
                cap: self.max_coverage_per_event,
            });
        }
        if amount > self.balance {
            return Err(InsuranceError::InsufficientFundBalance {
                requested: amount,
                available: self.balance,
            });
        }
        Ok(())
    }

    /// Draw coverage for a bad-debt event. Never partially covers: the
    /// full amount is paid or the call fails.
    pub fn cover_bad_debt(&mut self, amount: Quote) -> Result<(), InsuranceError> {
        require_positive(amount)?;
        self.can_cover(amount)?;
        self.balance = self.balance.sub(amount);
        self.total_payouts = self.total_payouts.add(amount);
        Ok(())
    }

    pub fn is_healthy(&self) -> bool {
        self.balance >= self.min_balance
    }

    /// balance / max_coverage_per_event, in basis points.
    pub fn utilization_ratio(&self) -> Bps {
        if !self.max_coverage_per_event.is_positive() {
            return Bps::new(0);
        }
        let ratio = self.balance.value() * rust_decimal_macros::dec!(10000)
            / self.max_coverage_per_event.value();
        Bps::new(ratio.floor().to_u32().unwrap_or(u32::MAX))
    }
}

fn require_positive(amount: Quote) -> Result<(), InsuranceError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(InsuranceError::InvalidAmount(amount))
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum InsuranceError {
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Quote),

    #[error("Withdrawal of {requested} would drop balance {balance} below floor {floor}")]
    BelowMinBalance {
        requested: Quote,
        balance: Quote,
        floor: Quote,
    },

    #[error("Insufficient fund balance: requested {requested}, available {available}")]
    InsufficientFundBalance { requested: Quote, available: Quote },

    #[error("Coverage request {requested} exceeds per-event cap {cap}")]
    ExceedsMaxCoverage { requested: Quote, cap: Quote },
}
