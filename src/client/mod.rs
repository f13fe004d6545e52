// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transaction Orchestrator
//!
//! [`Client`] drives register, deposit, withdraw and transfer for one local
//! account against a [`Ledger`], using a [`Prover`] for the zero-knowledge
//! parts.
//!
//! ## Ordering
//!
//! - Mutating operations are serialised by an internal operation lock.
//! - Local [`AccountState`] only changes after the ledger confirms.
//! - Withdrawals and transfers wait in an explicit loop until the scheduler
//!   lets them through (see [`crate::schedule`]).
//! - Account read-modify-write happens under a single lock shared with the
//!   [`TransferWatcher`].

pub mod watcher;

use std::collections::HashSet;
use std::sync::Arc;

use k256::elliptic_curve::Field;
use rand::rngs::OsRng;
use tokio::sync::{Mutex, RwLock};

use crate::account::{AccountState, Epoch, FriendsDirectory, NameRole};
use crate::anonset::{ensure_distinct, ensure_power_of_two, AnonymitySet};
use crate::config::ClientConfig;
use crate::crypto::{
    amount_scalar, nonce_binding, Ciphertext, KeyPair, ProjectivePoint, PublicKey, Scalar,
    SecretKey, MAX_AMOUNT,
};
use crate::error::{ClientError, PreconditionError};
use crate::ledger::{Ledger, LedgerError, TransferRequest, TxHash, TxReceipt, WithdrawRequest};
use crate::proof::{BurnStatement, BurnWitness, Prover, TransferStatement, TransferWitness};
use crate::schedule::{Clock, Decision, Operation, Scheduler};

pub use watcher::TransferWatcher;

/// Result of a confirmed deposit, withdrawal or transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    /// Local balance after the operation.
    pub balance: u64,
    pub state: AccountState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// A registration transaction was confirmed.
    Registered { tx_hash: TxHash },
    /// The key was already registered; its balance was adopted.
    Recovered { available: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub public_key: PublicKey,
    pub outcome: RegistrationOutcome,
}

/// Key material and protocol parameters fixed at registration.
#[derive(Debug, Clone)]
struct Session {
    keypair: KeyPair,
    scheduler: Scheduler,
    fee: u64,
}

pub struct Client<L, P> {
    ledger: L,
    prover: P,
    clock: Arc<dyn Clock>,
    config: ClientConfig,
    session: RwLock<Option<Session>>,
    state: Mutex<AccountState>,
    friends: RwLock<FriendsDirectory>,
    /// Hashes of submitted transfers whose event has not been observed yet.
    in_flight: Mutex<HashSet<TxHash>>,
    operation: Mutex<()>,
}

impl<L: Ledger, P: Prover> Client<L, P> {
    pub fn new(ledger: L, prover: P, clock: Arc<dyn Clock>, config: ClientConfig) -> Self {
        Self {
            ledger,
            prover,
            clock,
            config,
            session: RwLock::new(None),
            state: Mutex::new(AccountState::default()),
            friends: RwLock::new(FriendsDirectory::new()),
            in_flight: Mutex::new(HashSet::new()),
            operation: Mutex::new(()),
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Register a fresh key, or adopt `secret` if the ledger already knows it.
    ///
    /// Recovery reads the ledger balance as of the next epoch so that funds
    /// still pending are included.
    pub async fn register(&self, secret: Option<SecretKey>) -> Result<Registration, ClientError> {
        let _operation = self.operation.lock().await;
        if self.session.read().await.is_some() {
            return Err(PreconditionError::AlreadyRegistered.into());
        }

        let scheduler = Scheduler::new(self.ledger.epoch_length().await?, self.config.latency)?;
        let fee = self.ledger.fee().await?;
        let epoch = scheduler.epoch_at(self.clock.now());

        let keypair = match secret {
            Some(secret) => KeyPair::from_secret(secret),
            None => KeyPair::generate(&mut OsRng),
        };
        let public_key = keypair.public();

        if secret.is_some() {
            let balances = self
                .ledger
                .simulate_accounts(&[public_key], epoch + 1)
                .await?;
            let balance = single(&balances)?;
            if !balance.is_identity() {
                let available = balance.read_balance(keypair.secret()).ok_or_else(|| {
                    ClientError::UndecodableBalance {
                        public_key: public_key.to_hex(),
                    }
                })?;
                *self.state.lock().await = AccountState {
                    available,
                    pending: 0,
                    nonce_used: false,
                    last_roll_over: epoch,
                };
                *self.session.write().await = Some(Session {
                    keypair,
                    scheduler,
                    fee,
                });
                tracing::info!(public_key = %public_key, available, "Account recovered successfully");
                return Ok(Registration {
                    public_key,
                    outcome: RegistrationOutcome::Recovered { available },
                });
            }
        }

        let signature = keypair.sign_registration(self.ledger.contract_address(), &mut OsRng);
        let submitted = self.ledger.register(&public_key, &signature).await?;
        tracing::info!(tx_hash = %submitted.tx_hash, "Registration submitted");
        self.confirm(submitted.tx_hash).await?;

        *self.state.lock().await = AccountState {
            last_roll_over: scheduler.epoch_at(self.clock.now()),
            ..AccountState::default()
        };
        *self.session.write().await = Some(Session {
            keypair,
            scheduler,
            fee,
        });
        tracing::info!(public_key = %public_key, "Registration successful");

        Ok(Registration {
            public_key,
            outcome: RegistrationOutcome::Registered {
                tx_hash: submitted.tx_hash,
            },
        })
    }

    /// Move `amount` of plaintext funds into the account's pending balance.
    pub async fn deposit(&self, amount: u64) -> Result<Receipt, ClientError> {
        let _operation = self.operation.lock().await;
        let session = self.session().await?;
        check_amount(amount)?;
        let public_key = session.keypair.public();

        tracing::info!(amount, "Initiating deposit");
        let submitted = self.ledger.deposit(&public_key, amount).await?;
        tracing::info!(tx_hash = %submitted.tx_hash, "Deposit submitted");
        let receipt = self.confirm(submitted.tx_hash).await?;

        let state = self
            .update_state(&session, |state| state.credit(amount))
            .await;
        tracing::info!(amount, balance = state.balance(), "Deposit successful");
        Ok(self.receipt(receipt, state))
    }

    /// Burn `amount` from the account, released to the ledger's sender address.
    pub async fn withdraw(&self, amount: u64) -> Result<Receipt, ClientError> {
        let _operation = self.operation.lock().await;
        let session = self.session().await?;
        check_amount(amount)?;
        let keypair = &session.keypair;
        let public_key = keypair.public();

        let state = self
            .await_window(&session, Operation::Withdraw, amount, "withdrawal")
            .await?;
        let epoch = state.last_roll_over;

        let balances = self.ledger.simulate_accounts(&[public_key], epoch).await?;
        let current = single(&balances)?;
        if current.is_identity() {
            return Err(ClientError::UnregisteredParticipant {
                participant: public_key.to_hex(),
            });
        }

        let statement = BurnStatement {
            target: current.plus(-amount_scalar(amount)),
            public_key,
            epoch,
            recipient: self.ledger.sender_address(),
        };
        let witness = BurnWitness {
            secret: keypair.secret(),
            remaining_available: state.available - amount,
        };
        tracing::info!(amount, epoch, "Initiating withdrawal");
        let proof = self.prover.prove_burn(&statement, &witness)?;

        let submitted = self
            .ledger
            .withdraw(WithdrawRequest {
                public_key,
                amount,
                nonce_binding: nonce_binding(epoch, keypair.secret()),
                proof: proof.serialize(),
            })
            .await?;
        tracing::info!(tx_hash = %submitted.tx_hash, "Withdrawal submitted");
        let receipt = self.confirm(submitted.tx_hash).await?;

        let state = self
            .update_state(&session, |state| state.debit(amount))
            .await;
        tracing::info!(amount, balance = state.balance(), "Withdrawal successful");
        Ok(self.receipt(receipt, state))
    }

    /// Send `amount` to the friend `recipient`, hidden among `decoys`.
    ///
    /// The fee goes to `beneficiary` when given. Sender, recipient and decoys
    /// must together form a power-of-two set.
    pub async fn transfer(
        &self,
        recipient: &str,
        amount: u64,
        decoys: &[&str],
        beneficiary: Option<&str>,
    ) -> Result<Receipt, ClientError> {
        let _operation = self.operation.lock().await;
        let session = self.session().await?;
        check_amount(amount)?;
        let keypair = &session.keypair;
        let public_key = keypair.public();
        let fee = session.fee;

        let (recipient_key, decoy_keys, beneficiary_key) = {
            let friends = self.friends.read().await;
            let recipient_key = friends.resolve(recipient, NameRole::Recipient)?;
            let decoy_keys = decoys
                .iter()
                .map(|name| friends.resolve(name, NameRole::Decoy))
                .collect::<Result<Vec<_>, _>>()?;
            let beneficiary_key = beneficiary
                .map(|name| friends.resolve(name, NameRole::Beneficiary))
                .transpose()?;
            (recipient_key, decoy_keys, beneficiary_key)
        };
        ensure_distinct(&public_key, &recipient_key, &decoy_keys)?;
        let size = decoy_keys.len() + 2;
        ensure_power_of_two(size)?;
        let operation = Operation::Transfer {
            anonymity_set_size: size,
            fee,
        };
        session.scheduler.ensure_provable(operation)?;

        let state = self
            .await_window(&session, operation, amount, "transfer")
            .await?;
        let epoch = state.last_roll_over;

        let set = AnonymitySet::build(public_key, recipient_key, &decoy_keys, &mut OsRng)?;
        let mut queried: Vec<PublicKey> = set.members().to_vec();
        queried.extend(beneficiary_key);
        let balances = self.ledger.simulate_accounts(&queried, epoch).await?;
        if balances.len() != queried.len() {
            return Err(LedgerError::InvalidResponse(format!(
                "Expected {} balances, got {}",
                queried.len(),
                balances.len()
            ))
            .into());
        }
        for (key, balance) in queried.iter().zip(&balances) {
            if balance.is_identity() {
                return Err(ClientError::UnregisteredParticipant {
                    participant: self.describe(key, &public_key).await,
                });
            }
        }

        let randomness = Scalar::random(&mut OsRng);
        let commitment = ProjectivePoint::GENERATOR * randomness;
        let deltas: Vec<Ciphertext> = set
            .members()
            .iter()
            .enumerate()
            .map(|(index, key)| {
                let value = if index == set.sender_index() {
                    -amount_scalar(amount.saturating_add(fee))
                } else if index == set.receiver_index() {
                    amount_scalar(amount)
                } else {
                    Scalar::ZERO
                };
                Ciphertext::encrypt(key, value, &randomness)
            })
            .collect();
        let post_states = balances
            .iter()
            .zip(&deltas)
            .map(|(balance, delta)| *balance + *delta)
            .collect();

        let statement = TransferStatement {
            post_states,
            deltas: deltas.iter().map(|delta| delta.left).collect(),
            commitment,
            participants: set.members().to_vec(),
            epoch,
            fee,
        };
        let witness = TransferWitness {
            secret: keypair.secret(),
            randomness,
            amount,
            remaining_available: state.available - amount - fee,
            sender_index: set.sender_index(),
            receiver_index: set.receiver_index(),
        };
        tracing::info!(amount, fee, anonymity_set_size = size, epoch, "Initiating transfer");
        let proof = self.prover.prove_transfer(&statement, &witness)?;

        let request = TransferRequest {
            deltas: statement.deltas,
            commitment,
            participants: statement.participants,
            nonce_binding: nonce_binding(epoch, keypair.secret()),
            proof: proof.serialize(),
            beneficiary: beneficiary_key,
        };
        // The watcher must not observe the event before the hash is recorded.
        let tx_hash = {
            let mut in_flight = self.in_flight.lock().await;
            let submitted = self.ledger.transfer(request).await?;
            in_flight.insert(submitted.tx_hash);
            submitted.tx_hash
        };
        tracing::info!(tx_hash = %tx_hash, "Transfer submitted");

        let receipt = match self.confirm(tx_hash).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.in_flight.lock().await.remove(&tx_hash);
                return Err(e);
            }
        };

        // A self-paid fee comes straight back into pending.
        let debited = if beneficiary_key == Some(public_key) {
            amount
        } else {
            amount.saturating_add(fee)
        };
        let state = self
            .update_state(&session, |state| state.debit(debited))
            .await;
        tracing::info!(amount, fee, balance = state.balance(), "Transfer successful");
        Ok(self.receipt(receipt, state))
    }

    /// File `key` under `name`, returning the key it replaced.
    pub async fn add_friend(&self, name: impl Into<String>, key: PublicKey) -> Option<PublicKey> {
        let name = name.into();
        tracing::info!(name = %name, "Friend added");
        self.friends.write().await.add(name, key)
    }

    pub async fn remove_friend(&self, name: &str) -> Result<PublicKey, ClientError> {
        let key = self.friends.write().await.remove(name)?;
        tracing::info!(name, "Friend deleted");
        Ok(key)
    }

    pub async fn friends(&self) -> Vec<(String, PublicKey)> {
        self.friends
            .read()
            .await
            .iter()
            .map(|(name, key)| (name.to_string(), *key))
            .collect()
    }

    pub async fn public_key(&self) -> Option<PublicKey> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|session| session.keypair.public())
    }

    /// Hex secret for later recovery via [`Client::register`].
    pub async fn secret_hex(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|session| session.keypair.secret().to_hex())
    }

    /// Account state as of the current epoch.
    pub async fn state(&self) -> AccountState {
        let state = *self.state.lock().await;
        match self.session.read().await.as_ref() {
            Some(session) => state.simulate(session.scheduler.epoch_at(self.clock.now())),
            None => state,
        }
    }

    /// Available plus pending.
    pub async fn balance(&self) -> u64 {
        self.state().await.balance()
    }

    async fn session(&self) -> Result<Session, ClientError> {
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(|| PreconditionError::NotRegistered.into())
    }

    /// Loop over the scheduler gates until the operation may start. Returns
    /// the account state simulated at the epoch it will run in.
    async fn await_window(
        &self,
        session: &Session,
        operation: Operation,
        amount: u64,
        label: &'static str,
    ) -> Result<AccountState, ClientError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let now = self.clock.now();
            let epoch = session.scheduler.epoch_at(now);
            let state = self.simulated_state(epoch).await;

            match session.scheduler.evaluate(operation, amount, &state, now)? {
                Decision::Proceed => return Ok(state),
                Decision::Defer { wait, reason } => {
                    let wait_secs = wait.as_millis().div_ceil(1000);
                    tracing::info!(
                        operation = label,
                        attempt,
                        wait_secs = wait_secs as u64,
                        reason = %reason,
                        "Operation queued until the next epoch"
                    );
                    self.clock.sleep(wait).await;
                }
            }
        }
    }

    async fn simulated_state(&self, epoch: Epoch) -> AccountState {
        let mut state = self.state.lock().await;
        *state = state.simulate(epoch);
        *state
    }

    /// Roll local state to the current epoch, then apply `change`.
    async fn update_state<F>(&self, session: &Session, change: F) -> AccountState
    where
        F: FnOnce(&mut AccountState),
    {
        let epoch = session.scheduler.epoch_at(self.clock.now());
        let mut state = self.state.lock().await;
        *state = state.simulate(epoch);
        change(&mut state);
        *state
    }

    async fn confirm(&self, tx_hash: TxHash) -> Result<TxReceipt, ClientError> {
        let receipt = self.ledger.wait_for_confirmation(tx_hash).await?;
        if !receipt.success {
            return Err(LedgerError::Rejected {
                tx_hash,
                reason: "transaction reverted".to_string(),
            }
            .into());
        }
        Ok(receipt)
    }

    fn receipt(&self, receipt: TxReceipt, state: AccountState) -> Receipt {
        Receipt {
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            balance: state.balance(),
            state,
        }
    }

    async fn describe(&self, key: &PublicKey, own: &PublicKey) -> String {
        if key == own {
            return "self".to_string();
        }
        match self.friends.read().await.name_of(key) {
            Some(name) => name.to_string(),
            None => key.to_hex(),
        }
    }
}

fn check_amount(amount: u64) -> Result<(), PreconditionError> {
    if amount > MAX_AMOUNT {
        return Err(PreconditionError::AmountOutOfRange {
            amount,
            max: MAX_AMOUNT,
        });
    }
    Ok(())
}

fn single(balances: &[Ciphertext]) -> Result<Ciphertext, LedgerError> {
    match balances {
        [balance] => Ok(*balance),
        _ => Err(LedgerError::InvalidResponse(format!(
            "Expected 1 balance, got {}",
            balances.len()
        ))),
    }
}
