// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Subscriber setup.
//!
//! Logs go to stderr so answers on stdout stay clean.

use std::io;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Configuration for telemetry initialization.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Level for this crate if RUST_LOG is not set.
    pub default_level: Level,

    /// Whether to include the target module path.
    pub include_target: bool,

    /// Whether to use ANSI colors in output.
    pub ansi_colors: bool,

    /// Whether to use compact log format.
    pub compact: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_level: Level::WARN,
            include_target: false,
            ansi_colors: true,
            compact: true,
        }
    }
}

impl TelemetryConfig {
    /// Map `--verbose` / `--trace` onto a config.
    pub fn from_flags(verbose: bool, trace: bool) -> Self {
        let default_level = if trace {
            Level::TRACE
        } else if verbose {
            Level::DEBUG
        } else {
            Level::WARN
        };
        Self {
            default_level,
            include_target: verbose || trace,
            compact: !trace,
            ..Self::default()
        }
    }

    /// Enable or disable ANSI colors.
    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi_colors = ansi;
        self
    }

    /// Filter used when RUST_LOG is absent: this crate at the chosen
    /// level, dependencies at warn.
    pub fn default_directive(&self) -> String {
        format!("warn,fanout={}", self.default_level.to_string().to_lowercase())
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.default_directive()));

    let fmt_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target);

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.compact {
        registry.with(fmt_layer.compact()).try_init()
    } else {
        registry.with(fmt_layer).try_init()
    };
    result.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flags() {
        assert_eq!(TelemetryConfig::from_flags(false, false).default_level, Level::WARN);
        assert_eq!(TelemetryConfig::from_flags(true, false).default_level, Level::DEBUG);

        let trace = TelemetryConfig::from_flags(true, true);
        assert_eq!(trace.default_level, Level::TRACE);
        assert!(!trace.compact);
    }

    #[test]
    fn test_default_directive() {
        let config = TelemetryConfig::from_flags(true, false);
        assert_eq!(config.default_directive(), "warn,fanout=debug");
    }
}
