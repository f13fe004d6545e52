// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-epoch nonce binding.
//!
//! Each withdrawal or transfer carries `u = g_epoch^x`. The ledger keeps the
//! set of `u` values seen in the current epoch, so an account can spend at
//! most once per epoch without revealing which account spent.
//!
//! `g_epoch` is hashed onto the curve (keccak-256, try-and-increment on the
//! `x` coordinate) so nobody knows its discrete log relative to `g`.

use alloy::primitives::keccak256;
use k256::elliptic_curve::sec1::FromEncodedPoint;
use k256::{AffinePoint, EncodedPoint, ProjectivePoint};

use super::keys::SecretKey;

const DOMAIN: &[u8] = b"Zether";

/// Epoch generator `g_epoch`.
pub fn epoch_base(epoch: u64) -> ProjectivePoint {
    let mut counter: u32 = 0;
    loop {
        let mut preimage = Vec::with_capacity(DOMAIN.len() + 12);
        preimage.extend_from_slice(DOMAIN);
        preimage.extend_from_slice(&epoch.to_be_bytes());
        preimage.extend_from_slice(&counter.to_be_bytes());
        let x = keccak256(&preimage);

        let mut compressed = [0u8; 33];
        compressed[0] = 0x02;
        compressed[1..].copy_from_slice(x.as_slice());

        if let Ok(encoded) = EncodedPoint::from_bytes(compressed) {
            if let Some(point) = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
            {
                return ProjectivePoint::from(point);
            }
        }
        counter = counter.wrapping_add(1);
    }
}

/// Nonce binding value `u = g_epoch^x`.
pub fn nonce_binding(epoch: u64, secret: &SecretKey) -> ProjectivePoint {
    epoch_base(epoch) * secret.scalar()
}
