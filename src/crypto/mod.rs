// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Curve and ciphertext algebra over secp256k1.
//!
//! This module provides:
//! - Account keys and the registration proof of knowledge
//! - ElGamal ciphertexts with homomorphic addition and bounded decryption
//! - The fixed-width `[bytes32; 2]` point encoding used on the ledger
//! - Per-epoch nonce binding (`u = g_epoch^x`)

pub mod elgamal;
pub mod keys;
pub mod nonce;
pub mod wire;

pub use elgamal::{amount_scalar, Ciphertext, MAX_AMOUNT};
pub use keys::{verify_registration, KeyPair, PublicKey, RegistrationSignature, SecretKey};
pub use nonce::{epoch_base, nonce_binding};
pub use wire::{WireCiphertext, WirePoint};

pub use k256::{ProjectivePoint, Scalar};

/// Errors raised while decoding key material or ledger encodings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid curve point encoding")]
    InvalidPoint,

    #[error("Invalid secret key: {0}")]
    InvalidSecret(String),
}
