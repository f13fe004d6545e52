// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Client
//!
//! Contract between the client and the chain hosting the ZSC contract.
//!
//! Submissions return as soon as the ledger has accepted the transaction;
//! [`Ledger::wait_for_confirmation`] must be awaited before any local state
//! reflects it.
//!
//! Two implementations:
//!
//! - [`memory::MemoryLedger`]: in-process simulation of the contract's
//!   bookkeeping, for tests and local experimentation.
//! - [`zsc::ZscLedger`]: JSON-RPC adapter for a deployed contract.

pub mod memory;
pub mod zsc;

use std::sync::Arc;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;

use crate::account::Epoch;
use crate::crypto::{Ciphertext, ProjectivePoint, PublicKey, RegistrationSignature};

pub use memory::MemoryLedger;
pub use zsc::ZscLedger;

/// Transaction identifier.
pub type TxHash = B256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("Transaction {tx_hash} rejected: {reason}")]
    Rejected { tx_hash: TxHash, reason: String },

    #[error("Transaction {tx_hash} not confirmed after {waited_secs} s")]
    Unconfirmed { tx_hash: TxHash, waited_secs: u64 },

    #[error("Invalid ledger response: {0}")]
    InvalidResponse(String),

    #[error("Invalid ledger configuration: {0}")]
    Configuration(String),
}

/// Handle for an accepted submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submitted {
    pub tx_hash: TxHash,
}

/// Transaction receipt after inclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub success: bool,
}

#[derive(Debug, Clone)]
pub struct WithdrawRequest {
    pub public_key: PublicKey,
    pub amount: u64,
    /// `u = g_epoch^x`, spent once per epoch.
    pub nonce_binding: ProjectivePoint,
    pub proof: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Left halves of the per-participant ciphertext adjustments.
    pub deltas: Vec<ProjectivePoint>,
    /// Shared right half `D`.
    pub commitment: ProjectivePoint,
    pub participants: Vec<PublicKey>,
    pub nonce_binding: ProjectivePoint,
    pub proof: Vec<u8>,
    /// Fee recipient; `None` is submitted as the identity point.
    pub beneficiary: Option<PublicKey>,
}

/// A confirmed transfer as observed on the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub participants: Vec<PublicKey>,
    pub deltas: Vec<ProjectivePoint>,
    pub commitment: ProjectivePoint,
    pub beneficiary: Option<PublicKey>,
}

impl TransferEvent {
    /// Ciphertext adjustment applied to participant `index`.
    pub fn delta(&self, index: usize) -> Option<Ciphertext> {
        self.deltas
            .get(index)
            .map(|left| Ciphertext::new(*left, self.commitment))
    }
}

/// Events found from some block up to the ledger head.
#[derive(Debug, Clone, Default)]
pub struct EventBatch {
    pub events: Vec<TransferEvent>,
    /// First block not covered by this batch.
    pub next_block: u64,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Epoch length in seconds.
    async fn epoch_length(&self) -> Result<u64, LedgerError>;

    /// Protocol fee charged per transfer.
    async fn fee(&self) -> Result<u64, LedgerError>;

    fn contract_address(&self) -> Address;

    /// Account paying for submissions; withdrawals are released to it.
    fn sender_address(&self) -> Address;

    /// Balances of `keys` as they would read at `epoch`. Unregistered keys
    /// read as the identity ciphertext. No state change.
    async fn simulate_accounts(
        &self,
        keys: &[PublicKey],
        epoch: Epoch,
    ) -> Result<Vec<Ciphertext>, LedgerError>;

    async fn register(
        &self,
        key: &PublicKey,
        signature: &RegistrationSignature,
    ) -> Result<Submitted, LedgerError>;

    async fn deposit(&self, key: &PublicKey, amount: u64) -> Result<Submitted, LedgerError>;

    async fn withdraw(&self, request: WithdrawRequest) -> Result<Submitted, LedgerError>;

    async fn transfer(&self, request: TransferRequest) -> Result<Submitted, LedgerError>;

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<TxReceipt, LedgerError>;

    /// Transfer events from `from_block` to the current head.
    async fn transfer_events(&self, from_block: u64) -> Result<EventBatch, LedgerError>;

    /// Block timestamp in seconds.
    async fn block_timestamp(&self, block_number: u64) -> Result<u64, LedgerError>;
}

#[async_trait]
impl<T: Ledger + ?Sized> Ledger for Arc<T> {
    async fn epoch_length(&self) -> Result<u64, LedgerError> {
        (**self).epoch_length().await
    }

    async fn fee(&self) -> Result<u64, LedgerError> {
        (**self).fee().await
    }

    fn contract_address(&self) -> Address {
        (**self).contract_address()
    }

    fn sender_address(&self) -> Address {
        (**self).sender_address()
    }

    async fn simulate_accounts(
        &self,
        keys: &[PublicKey],
        epoch: Epoch,
    ) -> Result<Vec<Ciphertext>, LedgerError> {
        (**self).simulate_accounts(keys, epoch).await
    }

    async fn register(
        &self,
        key: &PublicKey,
        signature: &RegistrationSignature,
    ) -> Result<Submitted, LedgerError> {
        (**self).register(key, signature).await
    }

    async fn deposit(&self, key: &PublicKey, amount: u64) -> Result<Submitted, LedgerError> {
        (**self).deposit(key, amount).await
    }

    async fn withdraw(&self, request: WithdrawRequest) -> Result<Submitted, LedgerError> {
        (**self).withdraw(request).await
    }

    async fn transfer(&self, request: TransferRequest) -> Result<Submitted, LedgerError> {
        (**self).transfer(request).await
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<TxReceipt, LedgerError> {
        (**self).wait_for_confirmation(tx_hash).await
    }

    async fn transfer_events(&self, from_block: u64) -> Result<EventBatch, LedgerError> {
        (**self).transfer_events(from_block).await
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, LedgerError> {
        (**self).block_timestamp(block_number).await
    }
}
