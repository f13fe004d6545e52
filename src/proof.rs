// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Contract with the zero-knowledge proof systems.
//!
//! The client assembles statements and witnesses; a [`Prover`] turns them
//! into opaque byte payloads the ledger verifies. Proving is synchronous and
//! dominates operation latency (see [`crate::schedule::estimated_proof_latency`]).

use alloy::primitives::Address;

use crate::account::Epoch;
use crate::crypto::{Ciphertext, ProjectivePoint, PublicKey, Scalar, SecretKey};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProofError {
    #[error("Prover failed: {0}")]
    Prover(String),

    #[error("Statement rejected by prover: {0}")]
    InvalidStatement(String),
}

/// Public inputs of a burn (withdrawal) proof.
#[derive(Debug, Clone)]
pub struct BurnStatement {
    /// Account balance after the withdrawal.
    pub target: Ciphertext,
    pub public_key: PublicKey,
    pub epoch: Epoch,
    /// Address the withdrawn funds are released to.
    pub recipient: Address,
}

#[derive(Debug)]
pub struct BurnWitness<'a> {
    pub secret: &'a SecretKey,
    /// Plaintext balance left after the withdrawal.
    pub remaining_available: u64,
}

/// Public inputs of a transfer proof. All vectors are indexed by
/// anonymity-set position.
#[derive(Debug, Clone)]
pub struct TransferStatement {
    /// Participant balances after the transfer is applied.
    pub post_states: Vec<Ciphertext>,
    /// Left halves of the per-participant adjustments.
    pub deltas: Vec<ProjectivePoint>,
    /// Shared right half `D = g^r`.
    pub commitment: ProjectivePoint,
    pub participants: Vec<PublicKey>,
    pub epoch: Epoch,
    pub fee: u64,
}

pub struct TransferWitness<'a> {
    pub secret: &'a SecretKey,
    pub randomness: Scalar,
    pub amount: u64,
    pub remaining_available: u64,
    pub sender_index: usize,
    pub receiver_index: usize,
}

impl std::fmt::Debug for TransferWitness<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferWitness")
            .field("secret", self.secret)
            .field("randomness", &"<redacted>")
            .field("amount", &self.amount)
            .field("remaining_available", &self.remaining_available)
            .field("sender_index", &self.sender_index)
            .field("receiver_index", &self.receiver_index)
            .finish()
    }
}

/// Serialized burn proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnProof(Vec<u8>);

impl BurnProof {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Payload submitted alongside the withdrawal.
    pub fn serialize(&self) -> Vec<u8> {
        self.0.clone()
    }
}

/// Serialized transfer proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProof(Vec<u8>);

impl TransferProof {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn serialize(&self) -> Vec<u8> {
        self.0.clone()
    }
}

/// Proof generation backend. Calls block the current thread.
pub trait Prover: Send + Sync {
    fn prove_burn(
        &self,
        statement: &BurnStatement,
        witness: &BurnWitness<'_>,
    ) -> Result<BurnProof, ProofError>;

    fn prove_transfer(
        &self,
        statement: &TransferStatement,
        witness: &TransferWitness<'_>,
    ) -> Result<TransferProof, ProofError>;
}
