// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account bookkeeping and the address book.

pub mod friends;
pub mod state;

pub use friends::{FriendsDirectory, NameRole};
pub use state::{epoch_of, AccountState, Epoch};
