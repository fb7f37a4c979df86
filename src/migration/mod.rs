//! Migration validator — certify legacy → modern event paths layer by layer
//!
//! `MigrationValidator` runs five independent layers of checks against a live
//! `EventBus`: configuration, event conversion, functional integrity,
//! performance baseline and integration. Each check returns a
//! `ValidationResult`; failures are values, never errors, so a full run
//! reports everything it finds.

mod config;
mod configuration;
mod conversion;
mod dual_track;
mod functional;
mod integration;
mod monitor;
mod performance;
mod result;
mod smart;

pub use config::{PerformanceBaselines, ValidatorConfig, MAX_SPIKE_FACTOR};
pub use conversion::{Conversion, EventConverter, DEFAULT_LEGACY_MAPPINGS, INFERRED_DOMAIN};
pub use functional::{ModuleProbe, Workflow, WorkflowStep};
pub use integration::{FailureScenario, JourneyStep, UserJourney};
pub use monitor::{
    CacheStats, DetailedStats, HealthStatus, LayerCounts, Overview, RealtimeSnapshot, Trends,
};
pub use performance::MemorySnapshot;
pub use result::{
    IssueCode, Severity, ValidationIssue, ValidationLayer, ValidationReport, ValidationResult,
};
pub use smart::{
    retry_with, ActionKind, CachedValidation, ErrorCategories, RecommendedAction, RetryAttempt,
    RetryOptions, RetryOutcome,
};

use crate::bus::EventBus;
use crate::error::{DispatchError, Result};
use crate::naming::{EventTypeDefinitions, Platform};
use monitor::MonitorState;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

struct CacheEntry {
    result: ValidationResult,
    stored_at: tokio::time::Instant,
}

/// Layered migration certifier bound to one bus
pub struct MigrationValidator {
    config: ValidatorConfig,
    bus: Arc<EventBus>,
    definitions: Arc<EventTypeDefinitions>,
    converter: EventConverter,
    workflows: RwLock<HashMap<String, Workflow>>,
    probes: RwLock<BTreeMap<String, Arc<dyn ModuleProbe>>>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    monitor: Mutex<MonitorState>,
    /// Dispatches currently running under a load check
    in_flight: AtomicUsize,
}

impl MigrationValidator {
    pub fn new(bus: Arc<EventBus>, definitions: Arc<EventTypeDefinitions>) -> Self {
        Self::build(ValidatorConfig::default(), bus, definitions)
    }

    /// Create a validator with custom settings; unusable settings are
    /// rejected with `DispatchError::Config`
    pub fn with_config(
        config: ValidatorConfig,
        bus: Arc<EventBus>,
        definitions: Arc<EventTypeDefinitions>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, bus, definitions))
    }

    fn build(config: ValidatorConfig, bus: Arc<EventBus>, definitions: Arc<EventTypeDefinitions>) -> Self {
        let mut converter = EventConverter::new(config.default_platform);
        for (legacy, modern) in &config.legacy_mappings {
            converter.insert(legacy.clone(), modern.clone());
        }

        Self {
            config,
            bus,
            definitions,
            converter,
            workflows: RwLock::new(functional::default_workflows()),
            probes: RwLock::new(BTreeMap::new()),
            cache: Mutex::new(HashMap::new()),
            monitor: Mutex::new(MonitorState::default()),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn converter(&self) -> &EventConverter {
        &self.converter
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Add or replace a named workflow
    pub fn register_workflow(&self, workflow: Workflow) {
        tracing::debug!(workflow = %workflow.name, steps = workflow.steps.len(), "Workflow registered");
        self.workflows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(workflow.name.clone(), workflow);
    }

    /// Names of registered workflows, sorted
    pub fn workflow_names(&self) -> Vec<String> {
        let workflows = self.workflows.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = workflows.keys().cloned().collect();
        names.sort();
        names
    }

    /// Add or replace the reachability probe for a module
    pub fn register_module_probe(&self, module: &str, probe: impl ModuleProbe + 'static) {
        tracing::debug!(module = %module, "Module probe registered");
        self.probes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(module.to_string(), Arc::new(probe));
    }

    /// Modules with a registered probe, sorted
    pub fn module_names(&self) -> Vec<String> {
        let probes = self.probes.read().unwrap_or_else(PoisonError::into_inner);
        probes.keys().cloned().collect()
    }

    /// Clear the cache, statistics, probes and custom workflows
    pub fn cleanup(&self) {
        let cached = {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            let n = cache.len();
            cache.clear();
            n
        };
        *self.monitor.lock().unwrap_or_else(PoisonError::into_inner) = MonitorState::default();
        self.probes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *self.workflows.write().unwrap_or_else(PoisonError::into_inner) =
            functional::default_workflows();

        tracing::info!(cached, "Migration validator cleaned up");
    }

    /// Count a finished check in the monitoring statistics
    fn record(&self, result: ValidationResult) -> ValidationResult {
        if result.is_valid {
            tracing::debug!(
                layer = %result.layer,
                check = %result.check,
                elapsed_us = result.timing.as_micros() as u64,
                "Validation passed"
            );
        } else {
            tracing::warn!(
                layer = %result.layer,
                check = %result.check,
                issues = result.issues.len(),
                "Validation failed"
            );
        }
        self.monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(&result);
        result
    }

    /// Parse `platform` and check that migration supports it
    pub fn supported_platform(&self, platform: &str) -> Result<Platform> {
        match platform.parse::<Platform>() {
            Ok(p) if self.config.supported_platforms.contains(&p) => Ok(p),
            _ => Err(DispatchError::UnsupportedPlatform(platform.to_string())),
        }
    }
}
