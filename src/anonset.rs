// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Anonymity Set Builder
//!
//! Shuffles sender, receiver and decoys into a power-of-two participant list
//! in which the sender and receiver sit at indices of opposite parity.
//!
//! The transfer proof pairs slot `2k` with slot `2k + 1`; sender and receiver
//! must fall into different halves of that split.

use rand::seq::SliceRandom;
use rand::{CryptoRng, RngCore};

use crate::crypto::PublicKey;
use crate::error::PreconditionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Sender,
    Receiver,
    Decoy,
}

/// Ordered participant keys with the real parties' positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymitySet {
    members: Vec<PublicKey>,
    sender_index: usize,
    receiver_index: usize,
}

impl AnonymitySet {
    /// Shuffle `sender`, `receiver` and `decoys` with `rng`.
    ///
    /// Fails when any key repeats or the participant count is not a power
    /// of two.
    pub fn build<R>(
        sender: PublicKey,
        receiver: PublicKey,
        decoys: &[PublicKey],
        rng: &mut R,
    ) -> Result<Self, PreconditionError>
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        ensure_distinct(&sender, &receiver, decoys)?;
        ensure_power_of_two(decoys.len() + 2)?;

        let mut slots: Vec<(Slot, PublicKey)> = Vec::with_capacity(decoys.len() + 2);
        slots.push((Slot::Sender, sender));
        slots.push((Slot::Receiver, receiver));
        slots.extend(decoys.iter().map(|key| (Slot::Decoy, *key)));
        slots.shuffle(rng);

        let position = |slot| slots.iter().position(|(s, _)| *s == slot).unwrap_or(0);
        let sender_index = position(Slot::Sender);
        let receiver_index = position(Slot::Receiver);

        let mut members: Vec<PublicKey> = slots.into_iter().map(|(_, key)| key).collect();
        let receiver_index = restore_opposite_parity(&mut members, sender_index, receiver_index);

        Ok(Self {
            members,
            sender_index,
            receiver_index,
        })
    }

    pub fn members(&self) -> &[PublicKey] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn sender_index(&self) -> usize {
        self.sender_index
    }

    pub fn receiver_index(&self) -> usize {
        self.receiver_index
    }
}

/// If sender and receiver share parity, swap the receiver with its pair
/// partner (`index ^ 1`). Returns the receiver's final index.
///
/// The sender never moves. In a set of even length the partner always
/// exists and is never the sender.
pub fn restore_opposite_parity(
    members: &mut [PublicKey],
    sender_index: usize,
    receiver_index: usize,
) -> usize {
    if sender_index % 2 != receiver_index % 2 {
        return receiver_index;
    }
    let partner = receiver_index ^ 1;
    if partner >= members.len() {
        return receiver_index;
    }
    members.swap(receiver_index, partner);
    partner
}

/// Every participant must be a different account.
pub fn ensure_distinct(
    sender: &PublicKey,
    receiver: &PublicKey,
    decoys: &[PublicKey],
) -> Result<(), PreconditionError> {
    if sender == receiver {
        return Err(PreconditionError::SelfTransfer);
    }
    for (index, decoy) in decoys.iter().enumerate() {
        let repeated = decoy == sender || decoy == receiver || decoys[..index].contains(decoy);
        if repeated {
            return Err(PreconditionError::DuplicateParticipant {
                participant: decoy.to_hex(),
            });
        }
    }
    Ok(())
}

/// Closest powers of two below and above `size`.
pub fn nearest_powers(size: usize) -> (usize, usize) {
    let next = size.max(2).next_power_of_two();
    let previous = if next == size { size } else { (next / 2).max(2) };
    (previous, next)
}

/// Sets must hold at least two members and a power-of-two count.
pub fn ensure_power_of_two(size: usize) -> Result<(), PreconditionError> {
    if size >= 2 && size.is_power_of_two() {
        return Ok(());
    }
    let (previous, next) = nearest_powers(size);
    Err(PreconditionError::AnonymitySetNotPowerOfTwo {
        size,
        previous,
        next,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use proptest::prelude::*;
    use rand::rngs::{OsRng, StdRng};
    use rand::SeedableRng;

    fn keys(n: usize) -> Vec<PublicKey> {
        (0..n).map(|_| KeyPair::generate(&mut OsRng).public()).collect()
    }

    #[test]
    fn parity_collision_moves_receiver_to_partner() {
        let k = keys(4);
        // Sender at 1, receiver at 3: both odd.
        let mut members = vec![k[0], k[1], k[2], k[3]];
        let receiver = restore_opposite_parity(&mut members, 1, 3);

        assert_eq!(receiver, 2);
        assert_eq!(members, vec![k[0], k[1], k[3], k[2]]);
    }

    #[test]
    fn opposite_parity_is_left_alone() {
        let k = keys(4);
        let mut members = k.clone();
        assert_eq!(restore_opposite_parity(&mut members, 0, 3), 3);
        assert_eq!(members, k);
    }

    #[test]
    fn repeated_keys_are_rejected() {
        let k = keys(4);
        assert_eq!(
            AnonymitySet::build(k[0], k[0], &k[2..], &mut OsRng).unwrap_err(),
            PreconditionError::SelfTransfer
        );

        // Decoy equal to the sender, to the receiver, and to another decoy.
        for (decoys, repeated) in [
            ([k[2], k[0]], k[0]),
            ([k[1], k[2]], k[1]),
            ([k[3], k[3]], k[3]),
        ] {
            let err = AnonymitySet::build(k[0], k[1], &decoys, &mut OsRng).unwrap_err();
            assert_eq!(
                err,
                PreconditionError::DuplicateParticipant {
                    participant: repeated.to_hex()
                }
            );
        }

        assert!(ensure_distinct(&k[0], &k[1], &k[2..]).is_ok());
    }

    #[test]
    fn three_participants_name_two_and_four() {
        let k = keys(3);
        let err = AnonymitySet::build(k[0], k[1], &k[2..], &mut OsRng).unwrap_err();
        assert_eq!(
            err,
            PreconditionError::AnonymitySetNotPowerOfTwo {
                size: 3,
                previous: 2,
                next: 4
            }
        );
    }

    #[test]
    fn nearest_powers_brackets_size() {
        assert_eq!(nearest_powers(5), (4, 8));
        assert_eq!(nearest_powers(6), (4, 8));
        assert_eq!(nearest_powers(8), (8, 8));
        assert!(ensure_power_of_two(16).is_ok());
        assert!(ensure_power_of_two(1).is_err());
    }

    #[test]
    fn self_transfer_rejected() {
        let k = keys(1);
        assert_eq!(
            AnonymitySet::build(k[0], k[0], &[], &mut OsRng),
            Err(PreconditionError::SelfTransfer)
        );
    }

    #[test]
    fn two_party_set_has_opposite_parity() {
        let k = keys(2);
        for _ in 0..16 {
            let set = AnonymitySet::build(k[0], k[1], &[], &mut OsRng).unwrap();
            assert_eq!(set.len(), 2);
            assert_ne!(set.sender_index(), set.receiver_index());
            assert_eq!(set.members()[set.sender_index()], k[0]);
            assert_eq!(set.members()[set.receiver_index()], k[1]);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn shuffle_is_a_parity_split_permutation(exponent in 1u32..=5, seed in any::<u64>()) {
            let size = 1usize << exponent;
            let k = keys(size);
            let mut rng = StdRng::seed_from_u64(seed);

            let set = AnonymitySet::build(k[0], k[1], &k[2..], &mut rng).unwrap();

            prop_assert_eq!(set.len(), size);
            prop_assert_ne!(set.sender_index() % 2, set.receiver_index() % 2);
            prop_assert_eq!(set.members()[set.sender_index()], k[0]);
            prop_assert_eq!(set.members()[set.receiver_index()], k[1]);

            let mut expected: Vec<String> = k.iter().map(PublicKey::to_hex).collect();
            let mut actual: Vec<String> = set.members().iter().map(PublicKey::to_hex).collect();
            expected.sort();
            actual.sort();
            prop_assert_eq!(actual, expected);
        }
    }
}
