// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ElGamal ciphertexts over secp256k1.
//!
//! A balance `b` encrypted to `y` with randomness `r` is `(g^b * y^r, g^r)`.
//! Ciphertexts add component-wise, which adds the plaintexts. Decryption
//! recovers `g^b` and then searches for `b` in `[0, 2^32)` with a
//! baby-step/giant-step table built once per process.

use std::collections::HashMap;
use std::ops::Add;
use std::sync::OnceLock;

use k256::elliptic_curve::group::GroupEncoding;
use k256::{CompressedPoint, ProjectivePoint, Scalar};

use super::keys::{PublicKey, SecretKey};
use super::wire::{self, WireCiphertext};
use super::CryptoError;

/// Largest amount the protocol can represent and decrypt.
pub const MAX_AMOUNT: u64 = u32::MAX as u64;

const BABY_STEPS: u64 = 1 << 16;

/// Additively homomorphic ElGamal ciphertext.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ciphertext {
    pub left: ProjectivePoint,
    pub right: ProjectivePoint,
}

impl Ciphertext {
    /// Both halves at the identity: the ledger's answer for an unknown account.
    pub const IDENTITY: Self = Self {
        left: ProjectivePoint::IDENTITY,
        right: ProjectivePoint::IDENTITY,
    };

    pub fn new(left: ProjectivePoint, right: ProjectivePoint) -> Self {
        Self { left, right }
    }

    pub fn encrypt(key: &PublicKey, value: Scalar, randomness: &Scalar) -> Self {
        Self {
            left: ProjectivePoint::GENERATOR * value + key.point() * randomness,
            right: ProjectivePoint::GENERATOR * randomness,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.left == ProjectivePoint::IDENTITY && self.right == ProjectivePoint::IDENTITY
    }

    /// Shift the plaintext by `value` without touching the randomness.
    pub fn plus(&self, value: Scalar) -> Self {
        Self {
            left: self.left + ProjectivePoint::GENERATOR * value,
            right: self.right,
        }
    }

    /// Decrypt to an amount. Returns `None` when the plaintext is negative,
    /// too large, or the ciphertext was not encrypted to this key.
    pub fn read_balance(&self, secret: &SecretKey) -> Option<u64> {
        discrete_log(self.left - self.right * secret.scalar())
    }

    pub fn to_wire(&self) -> WireCiphertext {
        [wire::encode_point(&self.left), wire::encode_point(&self.right)]
    }

    pub fn from_wire(encoded: &WireCiphertext) -> Result<Self, CryptoError> {
        Ok(Self {
            left: wire::decode_point(&encoded[0])?,
            right: wire::decode_point(&encoded[1])?,
        })
    }
}

impl Add for Ciphertext {
    type Output = Ciphertext;

    fn add(self, other: Ciphertext) -> Ciphertext {
        Ciphertext {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

/// Scalar encoding of a plaintext amount. Negate it for debits.
pub fn amount_scalar(value: u64) -> Scalar {
    Scalar::from(value)
}

fn baby_steps() -> &'static HashMap<CompressedPoint, u64> {
    static TABLE: OnceLock<HashMap<CompressedPoint, u64>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = HashMap::with_capacity(BABY_STEPS as usize);
        let mut point = ProjectivePoint::IDENTITY;
        for step in 0..BABY_STEPS {
            table.insert(point.to_bytes(), step);
            point += ProjectivePoint::GENERATOR;
        }
        table
    })
}

/// Solve `g^v = target` for `v` in `[0, 2^32)`.
fn discrete_log(target: ProjectivePoint) -> Option<u64> {
    let table = baby_steps();
    let giant = ProjectivePoint::GENERATOR * Scalar::from(BABY_STEPS);
    let mut current = target;
    for giant_step in 0..BABY_STEPS {
        if let Some(baby_step) = table.get(&current.to_bytes()) {
            return Some(giant_step * BABY_STEPS + baby_step);
        }
        current -= giant;
    }
    None
}
