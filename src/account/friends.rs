// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Name -> public key address book.
//!
//! Names are unique; keys are not (the same key may be filed under two
//! names). Entries live for the process lifetime only.

use std::collections::BTreeMap;

use crate::crypto::PublicKey;
use crate::error::PreconditionError;

/// What a looked-up name is used for, reported when it is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameRole {
    Recipient,
    Decoy,
    Beneficiary,
    Friend,
}

impl std::fmt::Display for NameRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            NameRole::Recipient => "recipient",
            NameRole::Decoy => "decoy",
            NameRole::Beneficiary => "beneficiary",
            NameRole::Friend => "friend",
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct FriendsDirectory {
    friends: BTreeMap<String, PublicKey>,
}

impl FriendsDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry. Returns the key previously filed under `name`.
    pub fn add(&mut self, name: impl Into<String>, key: PublicKey) -> Option<PublicKey> {
        self.friends.insert(name.into(), key)
    }

    pub fn remove(&mut self, name: &str) -> Result<PublicKey, PreconditionError> {
        self.friends
            .remove(name)
            .ok_or_else(|| PreconditionError::UnknownName {
                role: NameRole::Friend,
                name: name.to_string(),
            })
    }

    pub fn get(&self, name: &str) -> Option<PublicKey> {
        self.friends.get(name).copied()
    }

    /// Look up `name`, failing with the role it was needed for.
    pub fn resolve(&self, name: &str, role: NameRole) -> Result<PublicKey, PreconditionError> {
        self.get(name).ok_or_else(|| PreconditionError::UnknownName {
            role,
            name: name.to_string(),
        })
    }

    /// First name filed for `key`, if any.
    pub fn name_of(&self, key: &PublicKey) -> Option<&str> {
        self.friends
            .iter()
            .find(|(_, k)| *k == key)
            .map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PublicKey)> {
        self.friends.iter().map(|(name, key)| (name.as_str(), key))
    }

    pub fn len(&self) -> usize {
        self.friends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.friends.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use rand::rngs::OsRng;

    #[test]
    fn add_resolve_remove() {
        let bob = KeyPair::generate(&mut OsRng).public();
        let mut friends = FriendsDirectory::new();

        assert!(friends.add("bob", bob).is_none());
        assert_eq!(friends.resolve("bob", NameRole::Recipient).unwrap(), bob);
        assert_eq!(friends.name_of(&bob), Some("bob"));

        assert_eq!(friends.remove("bob").unwrap(), bob);
        assert!(friends.is_empty());
    }

    #[test]
    fn unknown_names_report_their_role() {
        let friends = FriendsDirectory::new();
        let err = friends.resolve("carol", NameRole::Decoy).unwrap_err();
        assert_eq!(
            err,
            PreconditionError::UnknownName {
                role: NameRole::Decoy,
                name: "carol".to_string()
            }
        );

        let mut friends = friends;
        assert!(matches!(
            friends.remove("carol"),
            Err(PreconditionError::UnknownName { role: NameRole::Friend, .. })
        ));
    }

    #[test]
    fn names_are_unique_keys_are_not() {
        let key = KeyPair::generate(&mut OsRng).public();
        let other = KeyPair::generate(&mut OsRng).public();
        let mut friends = FriendsDirectory::new();

        friends.add("dave", key);
        friends.add("dave-alias", key);
        assert_eq!(friends.len(), 2);

        assert_eq!(friends.add("dave", other), Some(key));
        assert_eq!(friends.get("dave"), Some(other));
    }
}
