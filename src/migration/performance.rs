//! Layer 4: performance baseline

use super::result::{Check, IssueCode, ValidationLayer, ValidationResult};
use super::MigrationValidator;
use crate::bus::Handler;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Probes run ahead of every real subscriber
const PROBE_PRIORITY: u32 = 0;

/// Process memory footprint at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    pub used_bytes: u64,
}

impl MemorySnapshot {
    pub fn new(used_bytes: u64) -> Self {
        Self { used_bytes }
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl MigrationValidator {
    /// Compare measured handling time for `name` against its baseline
    ///
    /// Average time must stay within the baseline; the slowest dispatch
    /// within `baseline × max_spike_factor`.
    pub fn validate_performance(&self, name: &str) -> ValidationResult {
        let mut check = Check::start(ValidationLayer::PerformanceBaseline, "performance");
        let baseline = self.config.baselines.for_event(name);
        check.detail("event", name);
        check.detail("baselineMs", millis(baseline));

        let stats = match self.bus.get_event_stats(name) {
            Some(stats) if stats.emit_count > 0 => stats,
            _ => {
                check.issue(
                    IssueCode::NoMeasurements,
                    format!("No dispatches of '{}' have been measured", name),
                );
                return self.record(check.finish());
            }
        };

        // Out of range for a Duration means no attainable spike
        let spike_limit =
            Duration::try_from_secs_f64(baseline.as_secs_f64() * self.config.max_spike_factor).ok();
        check.detail("samples", stats.emit_count);
        check.detail("averageMs", millis(stats.average_execution_time));
        check.detail("maxMs", millis(stats.max_execution_time));

        if stats.average_execution_time > baseline {
            check.issue(
                IssueCode::PerformanceRegression,
                format!(
                    "Average handling time {:.1}ms exceeds baseline {:.1}ms",
                    millis(stats.average_execution_time),
                    millis(baseline)
                ),
            );
        }
        if let Some(limit) = spike_limit {
            check.detail("spikeLimitMs", millis(limit));
            if stats.max_execution_time > limit {
                check.issue(
                    IssueCode::PerformanceRegression,
                    format!(
                        "Slowest dispatch {:.1}ms exceeds spike limit {:.1}ms",
                        millis(stats.max_execution_time),
                        millis(limit)
                    ),
                );
            }
        }

        self.record(check.finish())
    }

    /// Check memory growth between two snapshots
    pub fn validate_memory_usage(&self, before: MemorySnapshot, after: MemorySnapshot) -> ValidationResult {
        let mut check = Check::start(ValidationLayer::PerformanceBaseline, "memory_usage");
        let growth = after.used_bytes.saturating_sub(before.used_bytes);
        let ratio = if before.used_bytes == 0 {
            if growth == 0 { 0.0 } else { f64::INFINITY }
        } else {
            growth as f64 / before.used_bytes as f64
        };

        check.detail("beforeBytes", before.used_bytes);
        check.detail("afterBytes", after.used_bytes);
        check.detail("growthBytes", growth);
        if ratio.is_finite() {
            check.detail("growthRatio", ratio);
        }

        if ratio > self.config.max_memory_growth_ratio {
            check.issue(
                IssueCode::MemoryGrowth,
                format!(
                    "Memory grew by {} bytes, above the {:.0}% allowance",
                    growth,
                    self.config.max_memory_growth_ratio * 100.0
                ),
            );
        }

        self.record(check.finish())
    }

    /// Emit `total` events on `name` from a bounded pool of tasks
    ///
    /// At most `max_concurrency` dispatches run at once. Every event must
    /// reach a subscriber, every dispatch must be clean, and throughput must
    /// meet the configured minimum.
    pub async fn validate_concurrent_load(&self, name: &str, total: usize) -> ValidationResult {
        let mut check = Check::start(ValidationLayer::PerformanceBaseline, "concurrent_load");
        let concurrency = self.config.max_concurrency.max(1);
        check.detail("event", name);
        check.detail("events", total);
        check.detail("concurrency", concurrency);

        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&delivered);
        let probe = self.bus.on(
            name,
            Handler::sync(move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }),
            Some(PROBE_PRIORITY),
        );

        let peak = AtomicUsize::new(0);
        let started = Instant::now();
        let outcomes: Vec<bool> = stream::iter(0..total)
            .map(|sequence| {
                let bus = Arc::clone(&self.bus);
                let event = name.to_string();
                let peak = &peak;
                async move {
                    let running = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
                    peak.fetch_max(running, Ordering::Relaxed);
                    let handle = tokio::spawn(async move {
                        bus.emit(&event, json!({ "sequence": sequence }), None).is_clean()
                    });
                    let clean = handle.await.unwrap_or(false);
                    self.in_flight.fetch_sub(1, Ordering::AcqRel);
                    clean
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        let elapsed = started.elapsed();
        self.bus.off(name, probe);

        let handled = delivered.load(Ordering::Relaxed);
        let failed = outcomes.iter().filter(|clean| !**clean).count();
        let throughput = if elapsed.is_zero() {
            f64::INFINITY
        } else {
            total as f64 / elapsed.as_secs_f64()
        };

        check.detail("handled", handled);
        check.detail("failed", failed);
        check.detail("peakConcurrency", peak.load(Ordering::Relaxed));
        check.detail("elapsedMs", millis(elapsed));
        if throughput.is_finite() {
            check.detail("throughputPerSec", throughput);
        }

        if handled < total {
            check.issue(
                IssueCode::DroppedEvents,
                format!("{} of {} events were never delivered", total - handled, total),
            );
        }
        if failed > 0 {
            check.issue(
                IssueCode::HandlerFailure,
                format!("{} of {} dispatches had failing handlers", failed, total),
            );
        }
        if total > 0 && throughput < self.config.min_throughput_per_sec {
            check.issue(
                IssueCode::ThroughputBelowTarget,
                format!(
                    "Throughput {:.1}/s is below the {:.1}/s target",
                    throughput, self.config.min_throughput_per_sec
                ),
            );
        }

        self.record(check.finish())
    }
}
