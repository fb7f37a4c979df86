//! Validation statistics and live monitoring snapshots

use super::result::{ValidationLayer, ValidationResult};
use super::MigrationValidator;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::PoisonError;
use std::time::Duration;

/// Results kept for trend and health calculations
const RECENT_WINDOW: usize = 100;

const HEALTHY_SUCCESS_RATE: f64 = 0.9;
const DEGRADED_SUCCESS_RATE: f64 = 0.7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerCounts {
    pub passed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_validations: u64,
    pub passed: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub average_time: Duration,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entries: usize,
}

/// Behavior over the most recent validations
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trends {
    pub recent_success_rate: f64,
    /// Validations in the recent window
    pub recent_volume: usize,
    /// Validations finished in the last minute
    pub last_minute_volume: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedStats {
    pub overview: Overview,
    pub layers: BTreeMap<ValidationLayer, LayerCounts>,
    pub cache: CacheStats,
    pub trends: Trends,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

impl HealthStatus {
    fn from_success_rate(rate: f64) -> Self {
        if rate >= HEALTHY_SUCCESS_RATE {
            HealthStatus::Healthy
        } else if rate >= DEGRADED_SUCCESS_RATE {
            HealthStatus::Degraded
        } else {
            HealthStatus::Critical
        }
    }
}

/// Point-in-time view for dashboards
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeSnapshot {
    /// Dispatches currently running under load checks
    pub queue_size: usize,
    /// `queue_size` as a fraction of the configured concurrency
    pub current_load: f64,
    pub health: HealthStatus,
    pub recent_success_rate: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
pub(super) struct MonitorState {
    total: u64,
    passed: u64,
    total_time: Duration,
    per_layer: BTreeMap<ValidationLayer, LayerCounts>,
    recent: VecDeque<(bool, DateTime<Utc>)>,
    pub(super) cache_hits: u64,
    pub(super) cache_misses: u64,
}

impl MonitorState {
    pub(super) fn record(&mut self, result: &ValidationResult) {
        self.total += 1;
        self.total_time += result.timing;
        let counts = self.per_layer.entry(result.layer).or_default();
        if result.is_valid {
            self.passed += 1;
            counts.passed += 1;
        } else {
            counts.failed += 1;
        }

        if self.recent.len() == RECENT_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back((result.is_valid, result.timestamp));
    }

    /// Success rate over the recent window; 1.0 with no data
    fn recent_success_rate(&self) -> f64 {
        if self.recent.is_empty() {
            return 1.0;
        }
        let ok = self.recent.iter().filter(|(valid, _)| *valid).count();
        ok as f64 / self.recent.len() as f64
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

impl MigrationValidator {
    pub fn get_detailed_stats(&self) -> DetailedStats {
        let entries = self.cache.lock().unwrap_or_else(PoisonError::into_inner).len();
        let monitor = self.monitor.lock().unwrap_or_else(PoisonError::into_inner);

        let average_time = match u32::try_from(monitor.total) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => monitor.total_time / n,
        };
        let minute_ago = Utc::now() - chrono::Duration::seconds(60);

        DetailedStats {
            overview: Overview {
                total_validations: monitor.total,
                passed: monitor.passed,
                failed: monitor.total - monitor.passed,
                success_rate: ratio(monitor.passed, monitor.total),
                average_time,
            },
            layers: monitor.per_layer.clone(),
            cache: CacheStats {
                hits: monitor.cache_hits,
                misses: monitor.cache_misses,
                hit_rate: ratio(monitor.cache_hits, monitor.cache_hits + monitor.cache_misses),
                entries,
            },
            trends: Trends {
                recent_success_rate: monitor.recent_success_rate(),
                recent_volume: monitor.recent.len(),
                last_minute_volume: monitor
                    .recent
                    .iter()
                    .filter(|(_, at)| *at >= minute_ago)
                    .count(),
            },
        }
    }

    pub fn get_realtime_monitoring(&self) -> RealtimeSnapshot {
        let queue_size = self.in_flight.load(Ordering::Acquire);
        let recent_success_rate = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recent_success_rate();

        RealtimeSnapshot {
            queue_size,
            current_load: queue_size as f64 / self.config.max_concurrency.max(1) as f64,
            health: HealthStatus::from_success_rate(recent_success_rate),
            recent_success_rate,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::naming::EventTypeDefinitions;
    use std::sync::Arc;

    fn validator() -> MigrationValidator {
        MigrationValidator::new(Arc::new(EventBus::new()), Arc::new(EventTypeDefinitions::new()))
    }

    #[test]
    fn test_fresh_validator_is_healthy() {
        let v = validator();
        let stats = v.get_detailed_stats();
        assert_eq!(stats.overview.total_validations, 0);
        assert_eq!(stats.overview.success_rate, 0.0);
        assert!(stats.layers.is_empty());

        let live = v.get_realtime_monitoring();
        assert_eq!(live.queue_size, 0);
        assert_eq!(live.health, HealthStatus::Healthy);
    }

    #[test]
    fn test_layer_counts_and_cache_rate() {
        let v = validator();
        v.validate_configuration("KOBO", None);
        v.validate_configuration("NOOK", None);
        v.validate_workflow("popup_display");
        v.validate_with_cache("UX.UNIVERSAL.CLICK.COMPLETED");
        v.validate_with_cache("UX.UNIVERSAL.CLICK.COMPLETED");

        let stats = v.get_detailed_stats();
        assert_eq!(stats.overview.total_validations, 4);
        assert_eq!(stats.overview.failed, 1);
        assert_eq!(
            stats.layers[&ValidationLayer::Configuration],
            LayerCounts { passed: 1, failed: 1 }
        );
        assert_eq!(stats.layers[&ValidationLayer::FunctionalIntegrity].passed, 1);
        assert_eq!(stats.cache.hits, 1);
        assert_eq!(stats.cache.misses, 1);
        assert_eq!(stats.cache.hit_rate, 0.5);
        assert_eq!(stats.cache.entries, 1);
        assert_eq!(stats.trends.recent_volume, 4);
        assert_eq!(stats.trends.last_minute_volume, 4);
    }

    #[test]
    fn test_health_degrades_with_failures() {
        let v = validator();
        for _ in 0..3 {
            v.validate_configuration("NOOK", None);
        }
        v.validate_configuration("KOBO", None);
        assert_eq!(v.get_realtime_monitoring().health, HealthStatus::Critical);

        v.cleanup();
        assert_eq!(v.get_detailed_stats().overview.total_validations, 0);
        assert_eq!(v.get_realtime_monitoring().health, HealthStatus::Healthy);
    }

    #[test]
    fn test_stats_serialize_layer_keys() {
        let v = validator();
        v.validate_configuration("KOBO", None);
        let json = serde_json::to_value(v.get_detailed_stats()).unwrap();
        assert_eq!(json["layers"]["configuration"]["passed"], 1);
        assert_eq!(json["overview"]["totalValidations"], 1);
    }
}
