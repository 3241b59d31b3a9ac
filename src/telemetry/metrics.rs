// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-process metrics for sessions, tool calls, queries, and token usage.
//!
//! Tool calls are keyed `server.tool`, so the same tool name on two
//! servers is counted separately.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// Global metrics instance.
pub static GLOBAL_METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// Latency bucket upper bounds in milliseconds; one overflow bucket follows.
const LATENCY_BUCKETS_MS: [u64; 7] = [10, 50, 250, 1_000, 5_000, 30_000, 120_000];

/// Central metrics collection.
#[derive(Debug)]
pub struct Metrics {
    tools: RwLock<BTreeMap<String, ToolMetrics>>,
    operations: RwLock<BTreeMap<String, OperationMetrics>>,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    started: Instant,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(BTreeMap::new()),
            operations: RwLock::new(BTreeMap::new()),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Record one tool call.
    pub fn record_tool(&self, key: &str, duration: Duration, failed: bool) {
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        tools.entry(key.to_string()).or_default().record(duration, failed);
    }

    /// Record a timed operation such as `session.connect` or `anthropic.chat`.
    pub fn record_operation(&self, name: &str, duration: Duration) {
        let mut ops = self.operations.write().unwrap_or_else(PoisonError::into_inner);
        ops.entry(name.to_string()).or_default().record(duration);
    }

    /// Record token usage of one model call.
    pub fn record_tokens(&self, input: u64, output: u64) {
        self.input_tokens.fetch_add(input, Ordering::Relaxed);
        self.output_tokens.fetch_add(output, Ordering::Relaxed);
    }

    /// Metrics for one `server.tool` key.
    pub fn tool_metrics(&self, key: &str) -> Option<ToolMetrics> {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    /// Metrics for one operation.
    pub fn operation_metrics(&self, name: &str) -> Option<OperationMetrics> {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Total (input, output) tokens.
    pub fn token_counts(&self) -> (u64, u64) {
        (
            self.input_tokens.load(Ordering::Relaxed),
            self.output_tokens.load(Ordering::Relaxed),
        )
    }

    /// Take a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let (input_tokens, output_tokens) = self.token_counts();
        MetricsSnapshot {
            tools: self.tools.read().unwrap_or_else(PoisonError::into_inner).clone(),
            operations: self.operations.read().unwrap_or_else(PoisonError::into_inner).clone(),
            input_tokens,
            output_tokens,
            uptime: self.started.elapsed(),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        self.tools.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.operations.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.input_tokens.store(0, Ordering::Relaxed);
        self.output_tokens.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters for one `server.tool` key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolMetrics {
    pub calls: u64,
    /// Calls that errored or returned `isError`.
    pub failures: u64,
    pub total_duration: Duration,
    pub max_duration: Duration,
}

impl ToolMetrics {
    fn record(&mut self, duration: Duration, failed: bool) {
        self.calls += 1;
        if failed {
            self.failures += 1;
        }
        self.total_duration += duration;
        self.max_duration = self.max_duration.max(duration);
    }

    /// Mean call duration.
    pub fn avg_duration(&self) -> Duration {
        average(self.total_duration, self.calls)
    }
}

/// Counters and latency buckets for one operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationMetrics {
    pub count: u64,
    pub total_duration: Duration,
    pub max_duration: Duration,
    buckets: [u64; LATENCY_BUCKETS_MS.len() + 1],
}

impl OperationMetrics {
    fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.total_duration += duration;
        self.max_duration = self.max_duration.max(duration);

        let ms = duration.as_millis() as u64;
        let idx = LATENCY_BUCKETS_MS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        self.buckets[idx] += 1;
    }

    /// Mean duration.
    pub fn avg_duration(&self) -> Duration {
        average(self.total_duration, self.count)
    }

    /// Upper bound of the bucket holding the `p`th percentile.
    ///
    /// Samples in the overflow bucket report the largest observed duration.
    pub fn percentile(&self, p: f64) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        let target = ((self.count as f64) * p / 100.0).ceil().max(1.0) as u64;
        let mut seen = 0;
        for (idx, &n) in self.buckets.iter().enumerate() {
            seen += n;
            if seen >= target {
                return LATENCY_BUCKETS_MS
                    .get(idx)
                    .map(|&ms| Duration::from_millis(ms))
                    .unwrap_or(self.max_duration);
            }
        }
        self.max_duration
    }
}

fn average(total: Duration, count: u64) -> Duration {
    if count == 0 {
        Duration::ZERO
    } else {
        Duration::from_nanos((total.as_nanos() / count as u128) as u64)
    }
}

/// A snapshot of all metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub tools: BTreeMap<String, ToolMetrics>,
    pub operations: BTreeMap<String, OperationMetrics>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub uptime: Duration,
}

impl MetricsSnapshot {
    /// Human-readable summary, printed on exit with `--verbose`.
    pub fn format_report(&self) -> String {
        let mut report = format!(
            "uptime {:.1?}, tokens {} in / {} out\n",
            self.uptime, self.input_tokens, self.output_tokens
        );

        for (name, op) in &self.operations {
            report.push_str(&format!(
                "  {:<24} {:>5} x  avg {:>9.1?}  p90 {:>9.1?}\n",
                name,
                op.count,
                op.avg_duration(),
                op.percentile(90.0)
            ));
        }
        for (key, tool) in &self.tools {
            report.push_str(&format!(
                "  {:<24} {:>5} x  avg {:>9.1?}  failed {}\n",
                key,
                tool.calls,
                tool.avg_duration(),
                tool.failures
            ));
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_metrics_keyed_per_server() {
        let metrics = Metrics::new();
        metrics.record_tool("weather.get_forecast", Duration::from_millis(100), false);
        metrics.record_tool("weather.get_forecast", Duration::from_millis(300), true);
        metrics.record_tool("maps.get_forecast", Duration::from_millis(10), false);

        let weather = metrics.tool_metrics("weather.get_forecast").unwrap();
        assert_eq!(weather.calls, 2);
        assert_eq!(weather.failures, 1);
        assert_eq!(weather.avg_duration(), Duration::from_millis(200));
        assert_eq!(weather.max_duration, Duration::from_millis(300));
        assert_eq!(metrics.tool_metrics("maps.get_forecast").unwrap().calls, 1);
    }

    #[test]
    fn test_operation_percentiles() {
        let metrics = Metrics::new();
        for _ in 0..9 {
            metrics.record_operation("anthropic.chat", Duration::from_millis(40));
        }
        metrics.record_operation("anthropic.chat", Duration::from_secs(200));

        let op = metrics.operation_metrics("anthropic.chat").unwrap();
        assert_eq!(op.count, 10);
        assert_eq!(op.percentile(50.0), Duration::from_millis(50));
        assert_eq!(op.percentile(90.0), Duration::from_millis(50));
        assert_eq!(op.percentile(100.0), Duration::from_secs(200));
        assert_eq!(OperationMetrics::default().percentile(50.0), Duration::ZERO);
    }

    #[test]
    fn test_tokens_and_reset() {
        let metrics = Metrics::new();
        metrics.record_tokens(100, 20);
        metrics.record_tokens(5, 1);
        assert_eq!(metrics.token_counts(), (105, 21));

        metrics.record_operation("session.connect", Duration::from_millis(1));
        metrics.reset();
        assert_eq!(metrics.token_counts(), (0, 0));
        assert!(metrics.operation_metrics("session.connect").is_none());
    }

    #[test]
    fn test_report_lists_everything() {
        let metrics = Metrics::new();
        metrics.record_operation("orchestrator.query", Duration::from_millis(900));
        metrics.record_tool("weather.get_alerts", Duration::from_millis(30), false);
        let report = metrics.snapshot().format_report();
        assert!(report.contains("orchestrator.query"));
        assert!(report.contains("weather.get_alerts"));
    }
}
