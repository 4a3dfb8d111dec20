// 2.0: collateral ledger, the single source of truth for solvency. free is
// withdrawable and usable as margin; locked is committed to open positions.
// the ledger mirrors the externally custodied total, and every mutation
// keeps sum(free) + sum(locked) == total. balances are only ever mutated
// through the operations below, never directly.

use crate::types::{Quote, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Balance {
    pub free: Quote,
    pub locked: Quote,
    /// Lifetime deposit total, for audit. Never decremented.
    pub total_deposited: Quote,
    /// Lifetime withdrawal total, for audit. Never decremented.
    pub total_withdrawn: Quote,
}

impl Balance {
    pub fn total(&self) -> Quote {
        self.free.add(self.locked)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    balances: HashMap<UserId, Balance>,
    /// Mirror of the externally custodied total.
    total: Quote,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            balances: HashMap::new(),
            total: Quote::zero(),
        }
    }

    pub fn free_balance(&self, user: UserId) -> Quote {
        self.balances.get(&user).map(|b| b.free).unwrap_or_default()
    }

    pub fn locked_balance(&self, user: UserId) -> Quote {
        self.balances
            .get(&user)
            .map(|b| b.locked)
            .unwrap_or_default()
    }

    pub fn total(&self) -> Quote {
        self.total
    }

    pub fn users(&self) -> impl Iterator<Item = (&UserId, &Balance)> {
        self.balances.iter()
    }

    pub fn deposit(&mut self, user: UserId, amount: Quote) -> Result<(), LedgerError> {
        require_positive(amount)?;
        let entry = self.balances.entry(user).or_default();
        entry.free = entry.free.add(amount);
        entry.total_deposited = entry.total_deposited.add(amount);
        self.total = self.total.add(amount);
        Ok(())
    }

    pub fn withdraw(&mut self, user: UserId, amount: Quote) -> Result<(), LedgerError> {
        require_positive(amount)?;
        let entry = self.balances.entry(user).or_default();
        if amount > entry.free {
            return Err(LedgerError::InsufficientFreeBalance {
                requested: amount,
                available: entry.free,
            });
        }
        entry.free = entry.free.sub(amount);
        entry.total_withdrawn = entry.total_withdrawn.add(amount);
        self.total = self.total.sub(amount);
        Ok(())
    }

    /// Commit free balance as position margin.
    pub fn lock(&mut self, user: UserId, amount: Quote) -> Result<(), LedgerError> {
        require_positive(amount)?;
        let entry = self.balances.entry(user).or_default();
        if amount > entry.free {
            return Err(LedgerError::InsufficientFreeBalance {
                requested: amount,
                available: entry.free,
            });
        }
        entry.free = entry.free.sub(amount);
        entry.locked = entry.locked.add(amount);
        Ok(())
    }

    /// Release committed margin back to the free balance.
    pub fn unlock(&mut self, user: UserId, amount: Quote) -> Result<(), LedgerError> {
        require_positive(amount)?;
        let entry = self.balances.entry(user).or_default();
        if amount > entry.locked {
            return Err(LedgerError::InsufficientLockedBalance {
                requested: amount,
                available: entry.locked,
            });
        }
        entry.locked = entry.locked.sub(amount);
        entry.free = entry.free.add(amount);
        Ok(())
    }

    /// Move locked collateral between users. Used when a position changes
    /// owner: the margin follows the position.
    pub fn transfer_locked(
        &mut self,
        from: UserId,
        to: UserId,
        amount: Quote,
    ) -> Result<(), LedgerError> {
        require_positive(amount)?;
        let entry = self.balances.entry(from).or_default();
        if amount > entry.locked {
            return Err(LedgerError::InsufficientLockedBalance {
                requested: amount,
                available: entry.locked,
            });
        }
        entry.locked = entry.locked.sub(amount);
        let recipient = self.balances.entry(to).or_default();
        recipient.locked = recipient.locked.add(amount);
        Ok(())
    }

    /// Settle realized PnL. Profit credits `free`; a loss debits `locked`
    /// first, then `free`. A loss exceeding both is bad debt: the call
    /// fails without touching anything so the caller can route the
    /// shortfall to the insurance fund.
    pub fn settle_pnl(&mut self, user: UserId, pnl: Quote) -> Result<(), LedgerError> {
        if pnl.is_zero() {
            return Ok(());
        }
        let entry = self.balances.entry(user).or_default();

        if pnl.is_positive() {
            entry.free = entry.free.add(pnl);
            self.total = self.total.add(pnl);
            return Ok(());
        }

        let loss = pnl.abs();
        let covered_by_balance = entry.total();
        if loss > covered_by_balance {
            return Err(LedgerError::InsufficientTotalBalance {
                requested: loss,
                available: covered_by_balance,
                shortfall: loss.sub(covered_by_balance),
            });
        }

        let from_locked = loss.min(entry.locked);
        let from_free = loss.sub(from_locked);
        entry.locked = entry.locked.sub(from_locked);
        entry.free = entry.free.sub(from_free);
        self.total = self.total.sub(loss);
        Ok(())
    }

    /// Apply a funding transfer. Same waterfall as PnL settlement except a
    /// debit is drawn from `free` first, then `locked`.
    pub fn apply_funding(&mut self, user: UserId, amount: Quote) -> Result<(), LedgerError> {
        if amount.is_zero() {
            return Ok(());
        }
        let entry = self.balances.entry(user).or_default();

        if amount.is_positive() {
            entry.free = entry.free.add(amount);
            self.total = self.total.add(amount);
            return Ok(());
        }

        let debit = amount.abs();
        let covered_by_balance = entry.total();
        if debit > covered_by_balance {
            return Err(LedgerError::InsufficientTotalBalance {
                requested: debit,
                available: covered_by_balance,
                shortfall: debit.sub(covered_by_balance),
            });
        }

        let from_free = debit.min(entry.free);
        let from_locked = debit.sub(from_free);
        entry.free = entry.free.sub(from_free);
        entry.locked = entry.locked.sub(from_locked);
        self.total = self.total.sub(debit);
        Ok(())
    }

    /// Solvency invariant: every free and locked balance summed over all
    /// users equals the custody mirror.
    pub fn check_conservation(&self) -> bool {
        let sum: Quote = self.balances.values().map(|b| b.total()).sum();
        sum == self.total
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

fn require_positive(amount: Quote) -> Result<(), LedgerError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(amount))
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Quote),

    #[error("Insufficient free balance: requested {requested}, available {available}")]
    InsufficientFreeBalance { requested: Quote, available: Quote },

    #[error("Insufficient locked balance: requested {requested}, available {available}")]
    InsufficientLockedBalance { requested: Quote, available: Quote },

    #[error(
        "Insufficient total balance: requested {requested}, available {available} (shortfall {shortfall})"
    )]
    InsufficientTotalBalance {
        requested: Quote,
        available: Quote,
        shortfall: Quote,
    },
}
