// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client error taxonomy.
//!
//! Fatal preconditions are reported before any ledger interaction and are
//! never retried. Ledger failures are surfaced verbatim. Scheduling
//! deferrals are not errors (see [`crate::schedule::Decision`]).

use crate::account::NameRole;
use crate::crypto::CryptoError;
use crate::ledger::LedgerError;
use crate::proof::ProofError;

/// Conditions under which an operation cannot proceed at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionError {
    #[error("Client's account is not yet registered")]
    NotRegistered,

    #[error("Client already holds a registered key")]
    AlreadyRegistered,

    #[error("Requested amount of {requested} (plus fee of {fee}) exceeds account balance of {balance}")]
    InsufficientFunds { requested: u64, fee: u64, balance: u64 },

    #[error("Amount {amount} exceeds the maximum representable amount {max}")]
    AmountOutOfRange { amount: u64, max: u64 },

    #[error("Sending to yourself is not supported")]
    SelfTransfer,

    #[error("Participant {participant} appears more than once in the anonymity set")]
    DuplicateParticipant { participant: String },

    #[error("Unknown {role} \"{name}\" in friends directory")]
    UnknownName { role: NameRole, name: String },

    #[error("Anonymity set size {size} is not a power of two; add {} or remove {}", .next - .size, .size - .previous)]
    AnonymitySetNotPowerOfTwo {
        size: usize,
        previous: usize,
        next: usize,
    },

    #[error("Proving for an anonymity set of {anonymity_set_size} may take longer than the epoch length ({epoch_length_secs} s); an epoch of at least {required_epoch_length_secs} s is needed")]
    ProofWindowExceedsEpoch {
        anonymity_set_size: usize,
        epoch_length_secs: u64,
        required_epoch_length_secs: u64,
    },

    #[error("Ledger reported an epoch length of zero")]
    InvalidEpochLength,
}

/// Error returned by every client operation.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error("Participant {participant} is not registered on the ledger")]
    UnregisteredParticipant { participant: String },

    #[error("Ledger submission failed: {0}")]
    Submission(#[from] LedgerError),

    #[error("Proof generation failed: {0}")]
    Proof(#[from] ProofError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Recovered balance for {public_key} could not be decrypted")]
    UndecodableBalance { public_key: String },
}

impl ClientError {
    /// Whether the caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Submission(_))
    }
}
