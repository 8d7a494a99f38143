// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for logging initialisation.

#[cfg(test)]
mod tests {
    use crate::telemetry::{init_logging, LogFormat};

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse("text"), LogFormat::Text);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Text);
    }

    #[test]
    fn test_init_logging_twice() {
        let _ = init_logging();
        assert!(
            !init_logging(),
            "second install must report an existing subscriber"
        );
    }
}
