//! Migration validator configuration

use crate::error::{DispatchError, Result};
use crate::naming::Platform;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Largest accepted `max_spike_factor`
pub const MAX_SPIKE_FACTOR: f64 = 1_000.0;

/// Handling-time baselines per reference category (milliseconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceBaselines {
    /// EXTRACTION events
    pub extraction_ms: u64,
    /// DATA / STORAGE events
    pub storage_ms: u64,
    /// UX / UI / PAGE events
    pub ui_ms: u64,
    /// Everything else
    pub default_ms: u64,
}

impl Default for PerformanceBaselines {
    fn default() -> Self {
        Self {
            extraction_ms: 100,
            storage_ms: 50,
            ui_ms: 30,
            default_ms: 100,
        }
    }
}

impl PerformanceBaselines {
    /// Baseline for an event name, chosen by its first segment
    pub fn for_event(&self, name: &str) -> Duration {
        let category = name.split('.').next().unwrap_or_default();
        let ms = match category {
            "EXTRACTION" => self.extraction_ms,
            "DATA" | "STORAGE" => self.storage_ms,
            "UX" | "UI" | "PAGE" => self.ui_ms,
            _ => self.default_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Migration validator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidatorConfig {
    /// Platforms migration may be certified for
    pub supported_platforms: Vec<Platform>,

    /// Platform used when converting without an explicit target
    pub default_platform: Platform,

    /// Sections a customized platform configuration must declare
    pub required_sections: Vec<String>,

    /// Extra legacy → modern mappings on top of the built-in table
    pub legacy_mappings: HashMap<String, String>,

    /// Validation cache time-to-live
    pub cache_ttl_secs: u64,

    /// Retry backoff unit; attempt `n` waits `n × base`
    pub retry_base_delay_ms: u64,

    pub default_max_retries: u32,

    /// Upper bound on simultaneous dispatches during load checks
    pub max_concurrency: usize,

    /// Events emitted by the load check in a full run
    pub load_test_events: usize,

    /// Minimum acceptable throughput during load checks (events per second)
    pub min_throughput_per_sec: f64,

    pub baselines: PerformanceBaselines,

    /// Max handling time may reach `baseline × max_spike_factor`
    pub max_spike_factor: f64,

    /// Allowed memory growth as a fraction of the starting footprint
    pub max_memory_growth_ratio: f64,

    pub max_module_latency_ms: u64,

    /// Probes taking longer than this are treated as unreachable
    pub probe_timeout_ms: u64,

    pub max_recovery_time_ms: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            supported_platforms: vec![
                Platform::Readmoo,
                Platform::Kindle,
                Platform::Kobo,
                Platform::Bookwalker,
                Platform::BooksCom,
            ],
            default_platform: Platform::Readmoo,
            required_sections: vec!["extraction_rules".to_string()],
            legacy_mappings: HashMap::new(),
            cache_ttl_secs: 300,
            retry_base_delay_ms: 100,
            default_max_retries: 3,
            max_concurrency: 10,
            load_test_events: 100,
            min_throughput_per_sec: 50.0,
            baselines: PerformanceBaselines::default(),
            max_spike_factor: 3.0,
            max_memory_growth_ratio: 0.10,
            max_module_latency_ms: 100,
            probe_timeout_ms: 1_000,
            max_recovery_time_ms: 1_000,
        }
    }
}

impl ValidatorConfig {
    /// Parse a JSON configuration, filling unspecified fields with defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no validator can run with
    pub fn validate(&self) -> Result<()> {
        if self.supported_platforms.is_empty() {
            return Err(DispatchError::Config(
                "supportedPlatforms must not be empty".to_string(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(DispatchError::Config(
                "maxConcurrency must be at least 1".to_string(),
            ));
        }
        if !(1.0..=MAX_SPIKE_FACTOR).contains(&self.max_spike_factor) {
            return Err(DispatchError::Config(format!(
                "maxSpikeFactor must be between 1.0 and {}, got {}",
                MAX_SPIKE_FACTOR, self.max_spike_factor
            )));
        }
        if self.max_memory_growth_ratio.is_nan() || self.max_memory_growth_ratio < 0.0 {
            return Err(DispatchError::Config(format!(
                "maxMemoryGrowthRatio must not be negative, got {}",
                self.max_memory_growth_ratio
            )));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}
