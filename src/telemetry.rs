// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Logging setup for processes embedding pdns-sync.

use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Log output format selected by `RUST_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable compact lines with ANSI colors
    Text,
    /// One JSON document per line
    Json,
}

impl LogFormat {
    /// Parse a format name; anything but `json` selects text.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Format selected by the `RUST_LOG_FORMAT` environment variable.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var("RUST_LOG_FORMAT").map_or(Self::Text, |value| Self::parse(&value))
    }
}

/// Install the global tracing subscriber.
///
/// Respects `RUST_LOG` (default `info`) and `RUST_LOG_FORMAT` (`text` or `json`).
/// Every line carries the source file and line number. Returns false if a global
/// subscriber was already installed, so tests and embedding services may call this
/// more than once.
pub fn init_logging() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_target(false)
            .json()
            .try_init()
            .is_ok(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_target(false)
            .with_ansi(true)
            .compact()
            .try_init()
            .is_ok(),
    };

    if installed {
        debug!("Logging initialized with file and line number tracking");
    }
    installed
}
