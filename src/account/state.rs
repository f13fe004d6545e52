// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Local mirror of the ledger's per-account bookkeeping.
//!
//! ## Rollover
//!
//! The ledger credits incoming funds to a *pending* balance and only folds
//! it into the spendable balance at the first touch in a later epoch. The
//! client reproduces that lazily with [`AccountState::simulate`], which must
//! be called against the current epoch before any balance decision.

use serde::{Deserialize, Serialize};

/// Epoch index: `floor(timestamp / epoch_length)`.
pub type Epoch = u64;

/// Compute the epoch containing `timestamp` (seconds).
pub fn epoch_of(timestamp: u64, epoch_length: u64) -> Epoch {
    timestamp / epoch_length.max(1)
}

/// Account balances as last confirmed, relative to `last_roll_over`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    /// Spendable in `last_roll_over`.
    pub available: u64,
    /// Credits and debits booked since the last rollover. Negative after a
    /// debit that has not rolled over yet.
    pub pending: i64,
    /// A withdrawal or transfer already used this epoch's nonce.
    pub nonce_used: bool,
    pub last_roll_over: Epoch,
}

impl AccountState {
    /// Project the state forward to `epoch`.
    ///
    /// Same or earlier epoch: unchanged. Later epoch: pending folds into
    /// available and the nonce frees up.
    pub fn simulate(&self, epoch: Epoch) -> Self {
        if epoch <= self.last_roll_over {
            return *self;
        }
        Self {
            available: self.available.saturating_add_signed(self.pending),
            pending: 0,
            nonce_used: false,
            last_roll_over: epoch,
        }
    }

    /// Total balance, including funds not yet rolled over.
    pub fn balance(&self) -> u64 {
        self.available.saturating_add_signed(self.pending)
    }

    pub fn credit(&mut self, amount: u64) {
        self.pending = self.pending.saturating_add(signed(amount));
    }

    /// Book an incoming amount confirmed in `epoch`.
    ///
    /// Funds confirmed before `last_roll_over` were already folded in by the
    /// ledger's rollover at that epoch, so they land in `available`.
    pub fn credit_at(&mut self, epoch: Epoch, amount: u64) {
        if epoch < self.last_roll_over {
            self.available = self.available.saturating_add(amount);
        } else {
            *self = self.simulate(epoch);
            self.credit(amount);
        }
    }

    /// Book a confirmed outgoing amount and consume the epoch nonce.
    pub fn debit(&mut self, amount: u64) {
        self.pending = self.pending.saturating_sub(signed(amount));
        self.nonce_used = true;
    }
}

fn signed(amount: u64) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn epoch_of_floors() {
        assert_eq!(epoch_of(0, 6), 0);
        assert_eq!(epoch_of(5, 6), 0);
        assert_eq!(epoch_of(6, 6), 1);
        assert_eq!(epoch_of(1_700_000_003, 6), 283_333_333);
    }

    #[test]
    fn deposit_then_availability() {
        let epoch = 1000;
        let mut state = AccountState::default().simulate(epoch);
        state.credit(100);
        assert_eq!(
            state,
            AccountState {
                available: 0,
                pending: 100,
                nonce_used: false,
                last_roll_over: epoch
            }
        );

        let next = state.simulate(epoch + 1);
        assert_eq!(next.available, 100);
        assert_eq!(next.pending, 0);
        assert!(!next.nonce_used);
        assert_eq!(next.balance(), 100);
    }

    #[test]
    fn debit_marks_nonce_and_rolls_negative_pending() {
        let mut state = AccountState {
            available: 50,
            pending: 0,
            nonce_used: false,
            last_roll_over: 4,
        };
        state.debit(20);
        assert!(state.nonce_used);
        assert_eq!(state.pending, -20);
        assert_eq!(state.balance(), 30);

        let rolled = state.simulate(5);
        assert_eq!(rolled.available, 30);
        assert!(!rolled.nonce_used);
    }

    #[test]
    fn earlier_epoch_does_not_rewind() {
        let state = AccountState {
            available: 1,
            pending: 2,
            nonce_used: true,
            last_roll_over: 10,
        };
        assert_eq!(state.simulate(9), state);
    }

    #[test]
    fn late_credit_lands_in_available() {
        let mut state = AccountState {
            available: 0,
            pending: 5,
            nonce_used: false,
            last_roll_over: 11,
        };
        state.credit_at(10, 10);
        assert_eq!(state.available, 10);
        assert_eq!(state.pending, 5);
        assert_eq!(state.last_roll_over, 11);

        state.credit_at(11, 3);
        assert_eq!(state.available, 10);
        assert_eq!(state.pending, 8);

        state.credit_at(12, 1);
        assert_eq!(state.available, 18);
        assert_eq!(state.pending, 1);
        assert_eq!(state.last_roll_over, 12);
    }

    proptest! {
        #[test]
        fn rollover_is_idempotent_at_same_epoch(
            available in 0u64..1_000_000,
            pending in -1_000i64..1_000_000,
            nonce_used: bool,
            epoch in 0u64..1_000_000,
        ) {
            let state = AccountState { available: available + 1_000, pending, nonce_used, last_roll_over: epoch };
            prop_assert_eq!(state.simulate(epoch), state);
        }

        #[test]
        fn rollover_folds_pending(
            available in 0u64..1_000_000,
            pending in -1_000i64..1_000_000,
            nonce_used: bool,
            epoch in 0u64..1_000_000,
            ahead in 1u64..100,
        ) {
            let state = AccountState { available: available + 1_000, pending, nonce_used, last_roll_over: epoch };
            let rolled = state.simulate(epoch + ahead);
            prop_assert_eq!(rolled.available as i64, state.available as i64 + state.pending);
            prop_assert_eq!(rolled.pending, 0);
            prop_assert!(!rolled.nonce_used);
            prop_assert_eq!(rolled.last_roll_over, epoch + ahead);
            prop_assert_eq!(rolled.balance(), state.balance());
        }
    }
}
