// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account key material.
//!
//! The account secret is a secp256k1 scalar `x`; the public key is `y = g^x`.
//! Secrets are imported and exported as `0x`-prefixed 64-character hex.

use std::fmt;

use alloy::primitives::{keccak256, Address, B256};
use k256::elliptic_curve::group::GroupEncoding;
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::{Field, PrimeField};
use k256::{FieldBytes, ProjectivePoint, Scalar, U256 as CurveUint};
use rand::{CryptoRng, RngCore};

use super::wire::{self, WirePoint};
use super::CryptoError;

/// Account public key (`y = g^x`).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(ProjectivePoint);

impl PublicKey {
    pub fn from_point(point: ProjectivePoint) -> Self {
        Self(point)
    }

    pub fn point(&self) -> ProjectivePoint {
        self.0
    }

    pub fn to_wire(&self) -> WirePoint {
        wire::encode_point(&self.0)
    }

    /// Decode a key from its ledger encoding. The identity is not a valid key.
    pub fn from_wire(encoded: &WirePoint) -> Result<Self, CryptoError> {
        let point = wire::decode_point(encoded)?;
        if point == ProjectivePoint::IDENTITY {
            return Err(CryptoError::InvalidPoint);
        }
        Ok(Self(point))
    }

    /// Compressed SEC1 hex, `0x` prefixed.
    pub fn to_hex(&self) -> String {
        format!("0x{}", alloy::hex::encode(self.0.to_bytes()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Account secret scalar. Never logged.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SecretKey(Scalar);

impl SecretKey {
    /// Parse a `0x`-prefixed (or bare) 64-character hex secret.
    pub fn from_hex(secret: &str) -> Result<Self, CryptoError> {
        let stripped = secret.strip_prefix("0x").unwrap_or(secret);
        let bytes = alloy::hex::decode(stripped)
            .map_err(|e| CryptoError::InvalidSecret(format!("Invalid hex: {}", e)))?;
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidSecret(format!(
                "Expected 32 bytes, got {}",
                bytes.len()
            )));
        }

        let scalar = Option::<Scalar>::from(Scalar::from_repr(FieldBytes::clone_from_slice(&bytes)))
            .ok_or_else(|| CryptoError::InvalidSecret("Scalar exceeds group order".to_string()))?;
        Self::from_scalar(scalar)
    }

    pub fn from_scalar(scalar: Scalar) -> Result<Self, CryptoError> {
        if bool::from(scalar.is_zero()) {
            return Err(CryptoError::InvalidSecret("Zero scalar".to_string()));
        }
        Ok(Self(scalar))
    }

    pub fn scalar(&self) -> &Scalar {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", alloy::hex::encode(self.0.to_bytes()))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Local account keypair. Created once, immutable afterwards.
#[derive(Clone, Debug)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        loop {
            if let Ok(secret) = SecretKey::from_scalar(Scalar::random(&mut *rng)) {
                return Self::from_secret(secret);
            }
        }
    }

    pub fn from_secret(secret: SecretKey) -> Self {
        let public = PublicKey(ProjectivePoint::GENERATOR * secret.0);
        Self { secret, public }
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public(&self) -> PublicKey {
        self.public
    }

    /// Schnorr proof of knowledge of `x`, bound to the contract address so it
    /// cannot be replayed against another deployment.
    pub fn sign_registration<R: RngCore + CryptoRng>(
        &self,
        contract: Address,
        rng: &mut R,
    ) -> RegistrationSignature {
        let nonce = Scalar::random(&mut *rng);
        let commitment = ProjectivePoint::GENERATOR * nonce;
        let challenge = registration_challenge(contract, &self.public, &commitment);
        RegistrationSignature {
            challenge,
            response: challenge * self.secret.0 + nonce,
        }
    }
}

/// Registration signature `(c, s)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistrationSignature {
    pub challenge: Scalar,
    pub response: Scalar,
}

/// Check a registration signature: `c == H(contract, y, g^s * y^-c)`.
pub fn verify_registration(
    contract: Address,
    key: &PublicKey,
    signature: &RegistrationSignature,
) -> bool {
    let commitment =
        ProjectivePoint::GENERATOR * signature.response - key.0 * signature.challenge;
    registration_challenge(contract, key, &commitment) == signature.challenge
}

fn registration_challenge(
    contract: Address,
    key: &PublicKey,
    commitment: &ProjectivePoint,
) -> Scalar {
    let mut preimage = Vec::with_capacity(32 * 5);
    preimage.extend_from_slice(contract.into_word().as_slice());
    for word in key.to_wire().iter().chain(wire::encode_point(commitment).iter()) {
        preimage.extend_from_slice(word.as_slice());
    }
    scalar_from_digest(keccak256(&preimage))
}

pub(crate) fn scalar_from_digest(digest: B256) -> Scalar {
    <Scalar as Reduce<CurveUint>>::reduce_bytes(FieldBytes::from_slice(digest.as_slice()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    const CONTRACT: Address = Address::repeat_byte(0x42);

    #[test]
    fn secret_hex_round_trips_to_same_public_key() {
        let keypair = KeyPair::generate(&mut OsRng);
        let hex = keypair.secret().to_hex();
        assert!(hex.starts_with("0x"));
        assert_eq!(hex.len(), 66);

        let restored = KeyPair::from_secret(SecretKey::from_hex(&hex).unwrap());
        assert_eq!(restored.public(), keypair.public());
    }

    #[test]
    fn rejects_malformed_secrets() {
        assert!(SecretKey::from_hex("0x1234").is_err());
        assert!(SecretKey::from_hex("not hex").is_err());
        assert!(SecretKey::from_hex(&format!("0x{}", "00".repeat(32))).is_err());
        // Above the group order.
        assert!(SecretKey::from_hex(&format!("0x{}", "ff".repeat(32))).is_err());
    }

    #[test]
    fn secret_debug_is_redacted() {
        let keypair = KeyPair::generate(&mut OsRng);
        let rendered = format!("{:?}", keypair);
        assert!(!rendered.contains(&keypair.secret().to_hex()[2..]));
    }

    #[test]
    fn registration_signature_verifies_for_its_contract_only() {
        let keypair = KeyPair::generate(&mut OsRng);
        let signature = keypair.sign_registration(CONTRACT, &mut OsRng);

        assert!(verify_registration(CONTRACT, &keypair.public(), &signature));
        assert!(!verify_registration(
            Address::repeat_byte(0x43),
            &keypair.public(),
            &signature
        ));

        let other = KeyPair::generate(&mut OsRng);
        assert!(!verify_registration(CONTRACT, &other.public(), &signature));
    }

    #[test]
    fn public_key_wire_rejects_identity() {
        let wire = [B256::ZERO, B256::ZERO];
        assert_eq!(PublicKey::from_wire(&wire), Err(CryptoError::InvalidPoint));
    }
}
