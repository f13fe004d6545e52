// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Epoch Clock & Scheduler
//!
//! Decides whether a debiting operation can be proved and confirmed inside
//! the current epoch, or must wait for the next one.
//!
//! ## Gates
//!
//! Evaluated in order against the account state simulated at `now`:
//!
//! 1. amount (plus fee) above the total balance: fatal
//! 2. amount (plus fee) above the spendable balance: defer, funds still pending
//! 3. nonce already used this epoch: defer
//! 4. withdraw: not enough epoch left to prove and confirm: defer
//! 5. transfer: set size unprovable even in a whole epoch: fatal
//! 6. transfer: estimated proving time above remaining epoch time: defer
//!
//! Every deferral waits until the next epoch boundary, after which the caller
//! re-evaluates all gates from scratch.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::account::{epoch_of, AccountState, Epoch};
use crate::config::LatencyModel;
use crate::error::PreconditionError;

/// Wall-clock source. Injected so epoch logic is testable without a ledger.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time since the UNIX epoch.
    fn now(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

/// Real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Duration {
        let millis = chrono::Utc::now().timestamp_millis();
        Duration::from_millis(u64::try_from(millis).unwrap_or(0))
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that only moves when told to; `sleep` jumps forward instantly.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new(start: Duration) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    pub fn set(&self, to: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.lock().map(|now| *now).unwrap_or_default()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

/// Time until the first epoch boundary strictly after `now`, at millisecond
/// precision. Exactly on a boundary a whole epoch remains.
pub fn time_to_next_epoch(now: Duration, epoch_length: Duration) -> Duration {
    let length = epoch_length.as_millis().max(1);
    let now_ms = now.as_millis();
    let boundary = (now_ms / length + 1) * length;
    Duration::from_millis(u64::try_from(boundary - now_ms).unwrap_or(u64::MAX))
}

/// Upper bound on proving an anonymity set of `size` (burns count as 1).
pub fn estimated_proof_latency(size: usize, model: &LatencyModel, with_buffer: bool) -> Duration {
    let n = size.max(1) as f64;
    let millis = (n * n.log2() * model.per_element_ms + model.base_ms).ceil();
    let buffer = if with_buffer {
        model.confirmation_buffer_ms
    } else {
        0
    };
    Duration::from_millis(millis.max(0.0) as u64 + buffer)
}

/// Debiting operation being scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Withdraw,
    Transfer { anonymity_set_size: usize, fee: u64 },
}

impl Operation {
    fn fee(&self) -> u64 {
        match self {
            Operation::Withdraw => 0,
            Operation::Transfer { fee, .. } => *fee,
        }
    }

    fn proof_size(&self) -> usize {
        match self {
            Operation::Withdraw => 1,
            Operation::Transfer {
                anonymity_set_size, ..
            } => *anonymity_set_size,
        }
    }
}

/// Why an operation was deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// Part of the amount has not rolled over yet.
    FundsPending,
    /// The account already spent its nonce this epoch.
    NonceUsed,
    /// Too little of the epoch is left to confirm a withdrawal.
    ConfirmationWindow,
    /// Too little of the epoch is left to prove a transfer.
    ProofWindow,
}

impl std::fmt::Display for DeferReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DeferReason::FundsPending => "waiting for the release of pending funds",
            DeferReason::NonceUsed => "nonce already used this epoch",
            DeferReason::ConfirmationWindow => "too close to the epoch boundary to confirm",
            DeferReason::ProofWindow => "too close to the epoch boundary to prove",
        })
    }
}

/// Gate outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Defer { wait: Duration, reason: DeferReason },
}

/// Epoch arithmetic and gate evaluation for one ledger deployment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scheduler {
    epoch_length: Duration,
    latency: LatencyModel,
}

impl Scheduler {
    pub fn new(epoch_length_secs: u64, latency: LatencyModel) -> Result<Self, PreconditionError> {
        if epoch_length_secs == 0 {
            return Err(PreconditionError::InvalidEpochLength);
        }
        Ok(Self {
            epoch_length: Duration::from_secs(epoch_length_secs),
            latency,
        })
    }

    pub fn epoch_length(&self) -> Duration {
        self.epoch_length
    }

    pub fn epoch_at(&self, now: Duration) -> Epoch {
        epoch_of(now.as_secs(), self.epoch_length.as_secs())
    }

    pub fn time_to_next_epoch(&self, now: Duration) -> Duration {
        time_to_next_epoch(now, self.epoch_length)
    }

    pub fn proof_latency(&self, size: usize, with_buffer: bool) -> Duration {
        estimated_proof_latency(size, &self.latency, with_buffer)
    }

    /// Fail if `operation` can never fit in an epoch of this length.
    pub fn ensure_provable(&self, operation: Operation) -> Result<(), PreconditionError> {
        let size = operation.proof_size();
        let latency = match operation {
            // A burn must also be confirmed inside the epoch.
            Operation::Withdraw => self.proof_latency(size, true),
            Operation::Transfer { .. } => self.proof_latency(size, false),
        };
        if latency > self.epoch_length {
            let required = self.proof_latency(size, true).as_millis().div_ceil(1000);
            return Err(PreconditionError::ProofWindowExceedsEpoch {
                anonymity_set_size: size,
                epoch_length_secs: self.epoch_length.as_secs(),
                required_epoch_length_secs: u64::try_from(required).unwrap_or(u64::MAX),
            });
        }
        Ok(())
    }

    /// Run the gates for `operation` at `now`. `state` must already be
    /// simulated to the epoch containing `now`.
    pub fn evaluate(
        &self,
        operation: Operation,
        amount: u64,
        state: &AccountState,
        now: Duration,
    ) -> Result<Decision, PreconditionError> {
        let fee = operation.fee();
        let requested = amount.saturating_add(fee);
        if requested > state.balance() {
            return Err(PreconditionError::InsufficientFunds {
                requested: amount,
                fee,
                balance: state.balance(),
            });
        }

        let wait = self.time_to_next_epoch(now);
        let defer = |reason| Ok(Decision::Defer { wait, reason });

        if requested > state.available {
            return defer(DeferReason::FundsPending);
        }
        if state.nonce_used {
            return defer(DeferReason::NonceUsed);
        }

        match operation {
            Operation::Withdraw => {
                self.ensure_provable(operation)?;
                if wait < self.proof_latency(1, true) {
                    return defer(DeferReason::ConfirmationWindow);
                }
            }
            Operation::Transfer {
                anonymity_set_size, ..
            } => {
                self.ensure_provable(operation)?;
                if self.proof_latency(anonymity_set_size, false) > wait {
                    return defer(DeferReason::ProofWindow);
                }
            }
        }

        Ok(Decision::Proceed)
    }
}
