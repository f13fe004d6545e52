// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! by the client. Configuration is loaded from the environment by the
//! embedding application at startup; every value has a default.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `ZETHER_RPC_URL` | JSON-RPC endpoint of the chain hosting the ZSC contract | Required for `ZscLedger` |
//! | `ZETHER_CONTRACT` | Address of the deployed ZSC contract | Required for `ZscLedger` |
//! | `ZETHER_SENDER_KEY` | Hex secp256k1 key paying for submissions | Required for `ZscLedger` |
//! | `ZETHER_PROOF_BASE_MS` | Fixed part of the proof latency estimate | `5200` |
//! | `ZETHER_PROOF_PER_ELEMENT_MS` | Per `n·log2(n)` part of the proof latency estimate | `20` |
//! | `ZETHER_CONFIRMATION_BUFFER_MS` | Slack added after ledger confirmation | `20` |
//! | `ZETHER_WATCH_INTERVAL_MS` | Transfer watcher poll interval | `5000` |
//! | `ZETHER_CONFIRMATION_POLL_MS` | Receipt poll interval while awaiting confirmation | `1000` |
//! | `ZETHER_CONFIRMATION_TIMEOUT_MS` | Give up awaiting a receipt after this long | `120000` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable name for the chain RPC endpoint.
pub const RPC_URL_ENV: &str = "ZETHER_RPC_URL";

/// Environment variable name for the ZSC contract address.
pub const CONTRACT_ENV: &str = "ZETHER_CONTRACT";

/// Environment variable name for the transaction-paying account key.
pub const SENDER_KEY_ENV: &str = "ZETHER_SENDER_KEY";

pub const PROOF_BASE_MS_ENV: &str = "ZETHER_PROOF_BASE_MS";
pub const PROOF_PER_ELEMENT_MS_ENV: &str = "ZETHER_PROOF_PER_ELEMENT_MS";
pub const CONFIRMATION_BUFFER_MS_ENV: &str = "ZETHER_CONFIRMATION_BUFFER_MS";
pub const WATCH_INTERVAL_MS_ENV: &str = "ZETHER_WATCH_INTERVAL_MS";
pub const CONFIRMATION_POLL_MS_ENV: &str = "ZETHER_CONFIRMATION_POLL_MS";
pub const CONFIRMATION_TIMEOUT_MS_ENV: &str = "ZETHER_CONFIRMATION_TIMEOUT_MS";

/// Environment variable selecting `json` or `pretty` log output.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Standard tracing filter variable.
pub const RUST_LOG_ENV: &str = "RUST_LOG";

/// Calibrated upper bound on proving time as a function of anonymity-set
/// size `n`: `ceil(n·log2(n)·per_element_ms + base_ms)`.
///
/// The defaults were measured on a single desktop machine. Slower provers or
/// heavily loaded ledgers need larger constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyModel {
    pub per_element_ms: f64,
    pub base_ms: f64,
    /// Time for the confirmation callback to fire after inclusion.
    pub confirmation_buffer_ms: u64,
}

impl Default for LatencyModel {
    fn default() -> Self {
        Self {
            per_element_ms: 20.0,
            base_ms: 5200.0,
            confirmation_buffer_ms: 20,
        }
    }
}

/// Client tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub latency: LatencyModel,
    pub watch_interval_ms: u64,
    pub confirmation_poll_ms: u64,
    pub confirmation_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            latency: LatencyModel::default(),
            watch_interval_ms: 5_000,
            confirmation_poll_ms: 1_000,
            confirmation_timeout_ms: 120_000,
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with whatever is set in the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup`. Unparseable values are
    /// ignored with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            latency: LatencyModel {
                per_element_ms: parse_or(
                    &lookup,
                    PROOF_PER_ELEMENT_MS_ENV,
                    defaults.latency.per_element_ms,
                ),
                base_ms: parse_or(&lookup, PROOF_BASE_MS_ENV, defaults.latency.base_ms),
                confirmation_buffer_ms: parse_or(
                    &lookup,
                    CONFIRMATION_BUFFER_MS_ENV,
                    defaults.latency.confirmation_buffer_ms,
                ),
            },
            watch_interval_ms: parse_or(&lookup, WATCH_INTERVAL_MS_ENV, defaults.watch_interval_ms),
            confirmation_poll_ms: parse_or(
                &lookup,
                CONFIRMATION_POLL_MS_ENV,
                defaults.confirmation_poll_ms,
            ),
            confirmation_timeout_ms: parse_or(
                &lookup,
                CONFIRMATION_TIMEOUT_MS_ENV,
                defaults.confirmation_timeout_ms,
            ),
        }
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }

    pub fn confirmation_poll(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(variable = name, value = %raw, "Ignoring unparseable configuration value");
                default
            }
        },
        None => default,
    }
}
