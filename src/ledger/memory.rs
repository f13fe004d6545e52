// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process ZSC simulation.
//!
//! Mirrors the contract's per-account bookkeeping:
//!
//! - every registered key has an `acc` and a `pending` ciphertext;
//! - touching an account in a later epoch folds `pending` into `acc`;
//! - registration writes `(y, g)` (an encryption of zero) into `pending`,
//!   so a fresh account reads as unregistered until the next epoch;
//! - withdrawals and transfers spend a nonce `u`, each at most once per epoch.
//!
//! Every submission mines one block stamped with the injected clock. Invalid
//! submissions are still mined but revert without touching state. Proofs are
//! accepted as given.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use alloy::primitives::{keccak256, Address};
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    EventBatch, Ledger, LedgerError, Submitted, TransferEvent, TransferRequest, TxHash, TxReceipt,
    WithdrawRequest,
};
use crate::account::{epoch_of, Epoch};
use crate::crypto::{
    amount_scalar, verify_registration, Ciphertext, ProjectivePoint, PublicKey,
    RegistrationSignature, WirePoint,
};
use crate::schedule::Clock;

/// Contract address reported by a default [`MemoryLedger`].
pub const MEMORY_CONTRACT: Address = Address::repeat_byte(0x2a);

/// Submitting account reported by a default [`MemoryLedger`].
pub const MEMORY_SENDER: Address = Address::repeat_byte(0x11);

#[derive(Debug, Clone, Copy)]
struct Account {
    acc: Ciphertext,
    pending: Ciphertext,
    last_roll_over: Epoch,
}

impl Account {
    fn roll_over(&mut self, epoch: Epoch) {
        if self.last_roll_over < epoch {
            self.acc = self.acc + self.pending;
            self.pending = Ciphertext::IDENTITY;
            self.last_roll_over = epoch;
        }
    }

    fn simulate(&self, epoch: Epoch) -> Ciphertext {
        if self.last_roll_over < epoch {
            self.acc + self.pending
        } else {
            self.acc
        }
    }
}

#[derive(Debug, Clone)]
enum Outcome {
    Included { block_number: u64 },
    Reverted { block_number: u64, reason: String },
}

#[derive(Debug, Default)]
struct Chain {
    accounts: HashMap<WirePoint, Account>,
    nonces: HashSet<WirePoint>,
    last_global_update: Epoch,
    /// Index `n` holds the timestamp of block `n + 1`.
    block_timestamps: Vec<u64>,
    outcomes: HashMap<TxHash, Outcome>,
    events: Vec<TransferEvent>,
    reject_next: Option<String>,
}

/// Context handed to a submission while its block is being mined.
struct Block {
    tx_hash: TxHash,
    number: u64,
    epoch: Epoch,
}

impl Chain {
    fn account_mut(&mut self, key: &PublicKey) -> Result<&mut Account, String> {
        self.accounts
            .get_mut(&key.to_wire())
            .ok_or_else(|| format!("Account {key} not yet registered"))
    }

    fn ensure_registered(&self, key: &PublicKey) -> Result<(), String> {
        if self.accounts.contains_key(&key.to_wire()) {
            Ok(())
        } else {
            Err(format!("Account {key} not yet registered"))
        }
    }

    fn spend_nonce(&mut self, epoch: Epoch, nonce: &ProjectivePoint) -> Result<(), String> {
        if epoch > self.last_global_update {
            self.nonces.clear();
            self.last_global_update = epoch;
        }
        let nonce = crate::crypto::wire::encode_point(nonce);
        if !self.nonces.insert(nonce) {
            return Err("Nonce already seen".to_string());
        }
        Ok(())
    }
}

pub struct MemoryLedger {
    epoch_length: u64,
    fee: u64,
    contract: Address,
    sender: Address,
    clock: Arc<dyn Clock>,
    chain: Mutex<Chain>,
}

impl MemoryLedger {
    pub fn new(epoch_length: u64, fee: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            epoch_length,
            fee,
            contract: MEMORY_CONTRACT,
            sender: MEMORY_SENDER,
            clock,
            chain: Mutex::new(Chain::default()),
        }
    }

    pub fn with_addresses(mut self, contract: Address, sender: Address) -> Self {
        self.contract = contract;
        self.sender = sender;
        self
    }

    /// Make the next submission revert with `reason`.
    pub async fn reject_next(&self, reason: impl Into<String>) {
        self.chain.lock().await.reject_next = Some(reason.into());
    }

    /// Number of submissions mined so far, reverted ones included.
    pub async fn submission_count(&self) -> usize {
        self.chain.lock().await.block_timestamps.len()
    }

    pub async fn revert_reason(&self, tx_hash: TxHash) -> Option<String> {
        match self.chain.lock().await.outcomes.get(&tx_hash) {
            Some(Outcome::Reverted { reason, .. }) => Some(reason.clone()),
            _ => None,
        }
    }

    pub async fn is_registered(&self, key: &PublicKey) -> bool {
        self.chain.lock().await.accounts.contains_key(&key.to_wire())
    }

    fn current_epoch(&self) -> (u64, Epoch) {
        let now = self.clock.now().as_secs();
        (now, epoch_of(now, self.epoch_length))
    }

    /// Mine one block holding a single transaction. `apply` validates before
    /// mutating; an `Err` reverts the transaction.
    async fn mine<F>(&self, apply: F) -> Submitted
    where
        F: FnOnce(&mut Chain, &Block) -> Result<(), String>,
    {
        let (timestamp, epoch) = self.current_epoch();
        let mut chain = self.chain.lock().await;
        chain.block_timestamps.push(timestamp);
        let number = chain.block_timestamps.len() as u64;

        let mut preimage = b"zether-memory-ledger".to_vec();
        preimage.extend_from_slice(&number.to_be_bytes());
        let block = Block {
            tx_hash: keccak256(&preimage),
            number,
            epoch,
        };

        let result = match chain.reject_next.take() {
            Some(reason) => Err(reason),
            None => apply(&mut *chain, &block),
        };
        let outcome = match result {
            Ok(()) => Outcome::Included {
                block_number: number,
            },
            Err(reason) => {
                tracing::debug!(tx_hash = %block.tx_hash, %reason, "Memory ledger reverted transaction");
                Outcome::Reverted {
                    block_number: number,
                    reason,
                }
            }
        };
        chain.outcomes.insert(block.tx_hash, outcome);

        Submitted {
            tx_hash: block.tx_hash,
        }
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn epoch_length(&self) -> Result<u64, LedgerError> {
        Ok(self.epoch_length)
    }

    async fn fee(&self) -> Result<u64, LedgerError> {
        Ok(self.fee)
    }

    fn contract_address(&self) -> Address {
        self.contract
    }

    fn sender_address(&self) -> Address {
        self.sender
    }

    async fn simulate_accounts(
        &self,
        keys: &[PublicKey],
        epoch: Epoch,
    ) -> Result<Vec<Ciphertext>, LedgerError> {
        let chain = self.chain.lock().await;
        Ok(keys
            .iter()
            .map(|key| {
                chain
                    .accounts
                    .get(&key.to_wire())
                    .map(|account| account.simulate(epoch))
                    .unwrap_or(Ciphertext::IDENTITY)
            })
            .collect())
    }

    async fn register(
        &self,
        key: &PublicKey,
        signature: &RegistrationSignature,
    ) -> Result<Submitted, LedgerError> {
        let contract = self.contract;
        let key = *key;
        let signature = *signature;
        Ok(self
            .mine(|chain, block| {
                if !verify_registration(contract, &key, &signature) {
                    return Err("Registration signature invalid".to_string());
                }
                if chain.accounts.contains_key(&key.to_wire()) {
                    return Err("Account already registered".to_string());
                }
                chain.accounts.insert(
                    key.to_wire(),
                    Account {
                        acc: Ciphertext::IDENTITY,
                        pending: Ciphertext::new(key.point(), ProjectivePoint::GENERATOR),
                        last_roll_over: block.epoch,
                    },
                );
                Ok(())
            })
            .await)
    }

    async fn deposit(&self, key: &PublicKey, amount: u64) -> Result<Submitted, LedgerError> {
        let key = *key;
        Ok(self
            .mine(|chain, block| {
                let account = chain.account_mut(&key)?;
                account.roll_over(block.epoch);
                account.pending = account.pending.plus(amount_scalar(amount));
                Ok(())
            })
            .await)
    }

    async fn withdraw(&self, request: WithdrawRequest) -> Result<Submitted, LedgerError> {
        Ok(self
            .mine(|chain, block| {
                chain.ensure_registered(&request.public_key)?;
                chain.spend_nonce(block.epoch, &request.nonce_binding)?;
                let account = chain.account_mut(&request.public_key)?;
                account.roll_over(block.epoch);
                account.pending = account.pending.plus(-amount_scalar(request.amount));
                Ok(())
            })
            .await)
    }

    async fn transfer(&self, request: TransferRequest) -> Result<Submitted, LedgerError> {
        let fee = self.fee;
        Ok(self
            .mine(|chain, block| {
                let size = request.participants.len();
                if size != request.deltas.len() {
                    return Err("Input array length mismatch".to_string());
                }
                if size < 2 || !size.is_power_of_two() {
                    return Err("Anonymity set size must be a power of two".to_string());
                }
                for key in &request.participants {
                    chain.ensure_registered(key)?;
                }
                chain.spend_nonce(block.epoch, &request.nonce_binding)?;

                for (key, delta) in request.participants.iter().zip(&request.deltas) {
                    let account = chain.account_mut(key)?;
                    account.roll_over(block.epoch);
                    account.pending = account.pending + Ciphertext::new(*delta, request.commitment);
                }
                if let Some(beneficiary) = &request.beneficiary {
                    if let Ok(account) = chain.account_mut(beneficiary) {
                        account.roll_over(block.epoch);
                        account.pending = account.pending.plus(amount_scalar(fee));
                    }
                }

                chain.events.push(TransferEvent {
                    tx_hash: block.tx_hash,
                    block_number: block.number,
                    participants: request.participants.clone(),
                    deltas: request.deltas.clone(),
                    commitment: request.commitment,
                    beneficiary: request.beneficiary,
                });
                Ok(())
            })
            .await)
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<TxReceipt, LedgerError> {
        let chain = self.chain.lock().await;
        match chain.outcomes.get(&tx_hash) {
            Some(Outcome::Included { block_number }) => Ok(TxReceipt {
                tx_hash,
                block_number: *block_number,
                success: true,
            }),
            Some(Outcome::Reverted { block_number, .. }) => Ok(TxReceipt {
                tx_hash,
                block_number: *block_number,
                success: false,
            }),
            None => Err(LedgerError::Rpc(format!("Unknown transaction {tx_hash}"))),
        }
    }

    async fn transfer_events(&self, from_block: u64) -> Result<EventBatch, LedgerError> {
        let chain = self.chain.lock().await;
        Ok(EventBatch {
            events: chain
                .events
                .iter()
                .filter(|event| event.block_number >= from_block)
                .cloned()
                .collect(),
            next_block: chain.block_timestamps.len() as u64 + 1,
        })
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, LedgerError> {
        let chain = self.chain.lock().await;
        block_number
            .checked_sub(1)
            .and_then(|index| chain.block_timestamps.get(index as usize))
            .copied()
            .ok_or_else(|| LedgerError::InvalidResponse(format!("Unknown block {block_number}")))
    }
}
