// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tracing subscriber setup.
//!
//! `RUST_LOG` selects the filter (default `info`); `LOG_FORMAT` selects
//! `json` or `pretty` output (default `pretty`).

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

use crate::config::{LOG_FORMAT_ENV, RUST_LOG_ENV};

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Invalid log format: {0} (expected `json` or `pretty`)")]
    InvalidFormat(String),

    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("Failed to install tracing subscriber: {0}")]
    Install(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(TelemetryError::InvalidFormat(other.to_string())),
        }
    }
}

/// Install the global subscriber from `RUST_LOG` and `LOG_FORMAT`.
///
/// Fails if a subscriber is already installed; callers that may initialise
/// twice can ignore the error.
pub fn init_tracing() -> Result<(), TelemetryError> {
    let format = match std::env::var(LOG_FORMAT_ENV) {
        Ok(value) => value.parse()?,
        Err(_) => LogFormat::default(),
    };
    let filter = std::env::var(RUST_LOG_ENV).unwrap_or_else(|_| DEFAULT_FILTER.to_string());
    init_with(format, &filter)
}

/// Install the global subscriber with an explicit format and filter.
pub fn init_with(format: LogFormat, filter: &str) -> Result<(), TelemetryError> {
    let filter = build_filter(filter)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
    installed.map_err(|e| TelemetryError::Install(e.to_string()))
}

fn build_filter(directives: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(directives).map_err(|e| TelemetryError::InvalidFilter(e.to_string()))
}
