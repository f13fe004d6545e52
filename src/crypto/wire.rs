// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger wire encoding for points and scalars.
//!
//! A point is two 32-byte words holding its affine `x` and `y` coordinates.
//! The identity has no affine form and is written as `[0, 0]`, which is also
//! what the contract returns for an account it has never seen.

use alloy::primitives::{B256, U256};
use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::{AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar};

use super::CryptoError;

/// `bytes32[2]` point encoding.
pub type WirePoint = [B256; 2];

/// `bytes32[2][2]` ciphertext encoding (`left`, `right`).
pub type WireCiphertext = [WirePoint; 2];

/// Encode a point as its affine coordinates.
pub fn encode_point(point: &ProjectivePoint) -> WirePoint {
    let encoded = point.to_affine().to_encoded_point(false);
    match (encoded.x(), encoded.y()) {
        (Some(x), Some(y)) => [B256::from_slice(x.as_slice()), B256::from_slice(y.as_slice())],
        _ => [B256::ZERO, B256::ZERO],
    }
}

/// Decode a point, rejecting coordinates that are not on the curve.
pub fn decode_point(wire: &WirePoint) -> Result<ProjectivePoint, CryptoError> {
    if wire[0].is_zero() && wire[1].is_zero() {
        return Ok(ProjectivePoint::IDENTITY);
    }

    let encoded = EncodedPoint::from_affine_coordinates(
        FieldBytes::from_slice(wire[0].as_slice()),
        FieldBytes::from_slice(wire[1].as_slice()),
        false,
    );

    Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        .map(ProjectivePoint::from)
        .ok_or(CryptoError::InvalidPoint)
}

/// Big-endian `uint256` form of a scalar.
pub fn scalar_to_word(scalar: &Scalar) -> U256 {
    U256::from_be_slice(scalar.to_bytes().as_slice())
}
