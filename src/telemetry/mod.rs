// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging and metrics.
//!
//! - **Logging**: `tracing` events, filtered by `RUST_LOG` or `--verbose` / `--trace`
//! - **Metrics**: durations of connects, model calls, and queries; per `server.tool` call counts; token usage
//! - **Correlation IDs**: one per query, attached to each branch span
//!
//! ```rust,ignore
//! use fanout::telemetry::{init_telemetry, TelemetryConfig};
//!
//! init_telemetry(&TelemetryConfig::from_flags(verbose, trace))?;
//! ```

mod correlation;
mod init;
pub mod metrics;

pub use correlation::CorrelationId;
pub use init::{init_telemetry, TelemetryConfig};
pub use metrics::{Metrics, MetricsSnapshot, OperationMetrics, ToolMetrics, GLOBAL_METRICS};
