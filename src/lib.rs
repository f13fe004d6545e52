// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Zether Client - Confidential Transfer Orchestration
//!
//! This crate drives a single account on a Zether Smart Contract (ZSC):
//! ElGamal-encrypted balances, epoch-gated withdrawals and anonymous
//! transfers, with proof generation delegated to a [`proof::Prover`].
//!
//! ## Modules
//!
//! - `account` - Local balance bookkeeping and the friends directory
//! - `anonset` - Anonymity set assembly and parity repair
//! - `client` - Transaction orchestrator and incoming-transfer watcher
//! - `config` - Environment-driven configuration
//! - `crypto` - secp256k1 keys, ElGamal ciphertexts, wire encoding
//! - `ledger` - Ledger contract, in-memory ZSC and EVM adapter
//! - `schedule` - Epoch arithmetic and proof-window gating
//! - `telemetry` - Tracing subscriber setup

pub mod account;
pub mod anonset;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod proof;
pub mod schedule;
pub mod telemetry;

pub use account::{AccountState, Epoch, FriendsDirectory};
pub use client::{Client, Receipt, Registration, RegistrationOutcome, TransferWatcher};
pub use config::ClientConfig;
pub use crypto::{Ciphertext, KeyPair, PublicKey, SecretKey};
pub use error::{ClientError, PreconditionError};
pub use ledger::{Ledger, LedgerError, MemoryLedger, ZscLedger};
pub use proof::Prover;
pub use schedule::{Clock, ManualClock, SystemClock};
