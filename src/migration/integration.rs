//! Layer 5: end-to-end integration, and the full multi-layer run

use super::result::{Check, IssueCode, ValidationLayer, ValidationReport, ValidationResult};
use super::MigrationValidator;
use crate::bus::Handler;
use crate::error::DispatchError;
use crate::naming::{Action, Domain, EventName, Platform, State};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

/// Injected failures run ahead of every real subscriber
const INJECTED_PRIORITY: u32 = 0;

/// One step of a user journey
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyStep {
    /// Legacy or modern name
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    /// Require at least one subscriber to handle this step
    #[serde(default)]
    pub expect_handled: bool,
}

impl JourneyStep {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
            expect_handled: false,
        }
    }

    pub fn expect_handled(mut self) -> Self {
        self.expect_handled = true;
        self
    }
}

/// Ordered end-to-end step sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJourney {
    pub name: String,
    pub steps: Vec<JourneyStep>,
}

/// A fault to inject on one event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureScenario {
    pub name: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl FailureScenario {
    pub fn new(name: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            event: event.into(),
            payload,
        }
    }
}

impl MigrationValidator {
    /// Replay a journey in order, stopping at the first failed step
    pub fn validate_user_journey(&self, journey: &UserJourney) -> ValidationResult {
        let mut check = Check::start(ValidationLayer::Integration, "user_journey");
        check.detail("journey", journey.name.as_str());
        check.detail("totalSteps", journey.steps.len());

        let mut completed = 0;
        for (index, step) in journey.steps.iter().enumerate() {
            let modern = match self.converter.convert(&step.event) {
                Ok(conversion) => conversion.modern,
                Err(e) => {
                    check.issue(
                        IssueCode::StepFailed,
                        format!("Step {} ('{}'): {}", index + 1, step.event, e),
                    );
                    break;
                }
            };

            let report = self.bus.emit(&modern, step.payload.clone(), None);
            if !report.is_clean() {
                check.issue(
                    IssueCode::StepFailed,
                    format!(
                        "Step {} ('{}'): {} of {} handlers failed",
                        index + 1,
                        modern,
                        report.failed,
                        report.invoked
                    ),
                );
                break;
            }
            if step.expect_handled && report.invoked == 0 {
                check.issue(
                    IssueCode::StepFailed,
                    format!("Step {} ('{}') reached no subscriber", index + 1, modern),
                );
                break;
            }
            completed += 1;
        }
        check.detail("completedSteps", completed);

        self.record(check.finish())
    }

    /// Inject a failing handler for each scenario and check isolation and
    /// recovery
    ///
    /// While injected, the fault must fail the dispatch without keeping any
    /// other subscriber from running. Once removed, a clean dispatch must
    /// follow within `max_recovery_time_ms`.
    pub fn validate_error_recovery(&self, scenarios: &[FailureScenario]) -> ValidationResult {
        let mut check = Check::start(ValidationLayer::Integration, "error_recovery");
        let max_recovery = Duration::from_millis(self.config.max_recovery_time_ms);

        let mut outcomes = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            let others = self.bus.listener_count(&scenario.event);
            let fault = scenario.name.clone();
            let injected = self.bus.on(
                &scenario.event,
                Handler::sync(move |_| Err(DispatchError::handler(format!("injected fault: {}", fault)))),
                Some(INJECTED_PRIORITY),
            );

            let faulted = self.bus.emit(&scenario.event, scenario.payload.clone(), None);
            let isolated = faulted.failed >= 1 && faulted.invoked == others + 1;
            if !isolated {
                check.issue(
                    IssueCode::RecoveryFailed,
                    format!(
                        "Scenario '{}': fault on '{}' was not isolated ({} of {} handlers ran)",
                        scenario.name,
                        scenario.event,
                        faulted.invoked,
                        others + 1
                    ),
                );
            }

            let recovery_started = Instant::now();
            self.bus.off(&scenario.event, injected);
            let recovered = self.bus.emit(&scenario.event, scenario.payload.clone(), None);
            let recovery_time = recovery_started.elapsed();

            if !recovered.is_clean() {
                check.issue(
                    IssueCode::RecoveryFailed,
                    format!(
                        "Scenario '{}': '{}' still fails after the fault was removed",
                        scenario.name, scenario.event
                    ),
                );
            } else if recovery_time > max_recovery {
                check.issue(
                    IssueCode::RecoveryTimeout,
                    format!(
                        "Scenario '{}' recovered in {}ms (limit {}ms)",
                        scenario.name,
                        recovery_time.as_millis(),
                        max_recovery.as_millis()
                    ),
                );
            }

            outcomes.push(json!({
                "scenario": scenario.name,
                "event": scenario.event,
                "isolated": isolated,
                "recovered": recovered.is_clean(),
                "recoveryMs": recovery_time.as_secs_f64() * 1000.0,
            }));
        }
        check.detail("scenarios", outcomes);

        self.record(check.finish())
    }

    /// Legacy compatibility against the default platform
    pub fn validate_legacy_compatibility(&self, legacy_names: &[&str]) -> ValidationResult {
        self.validate_legacy_compatibility_for(legacy_names, self.converter.default_platform())
    }

    /// Run the dual-track comparison for every listed legacy name, with
    /// replacements resolved for `platform`
    pub fn validate_legacy_compatibility_for(&self, legacy_names: &[&str], platform: Platform) -> ValidationResult {
        let mut check = Check::start(ValidationLayer::Integration, "legacy_compatibility");
        check.detail("platform", platform.as_str());
        let tracks: Vec<Value> = legacy_names
            .iter()
            .map(|legacy| {
                self.run_dual_track(&mut check, legacy, json!({ "legacyCheck": legacy }), platform)
            })
            .collect();
        check.detail("tracks", tracks);

        self.record(check.finish())
    }

    /// Run every layer for `platform` and aggregate the results
    ///
    /// An unsupported platform stops the run after the configuration layer.
    /// Module connectivity is checked only for modules with registered
    /// probes; memory usage needs caller-supplied snapshots and is not part
    /// of the run.
    pub async fn run_full_validation(&self, platform: &str, platform_config: Option<&Value>) -> ValidationReport {
        let started = Instant::now();
        tracing::info!(platform = %platform, "Full migration validation started");

        let mut results = vec![self.validate_configuration(platform, platform_config)];
        let Ok(target) = self.supported_platform(platform) else {
            return self.finish_report(platform, results, started);
        };

        let legacy_names = self.converter.legacy_names();
        for legacy in &legacy_names {
            results.push(self.validate_event_conversion_for(legacy, target));
        }

        for workflow in self.workflow_names() {
            results.push(self.validate_workflow_for(&workflow, target));
        }
        let modules = self.module_names();
        if !modules.is_empty() {
            let modules: Vec<&str> = modules.iter().map(String::as_str).collect();
            results.push(self.validate_module_connectivity(&modules).await);
        }

        let load_target = platform_event(Domain::Extraction, target, Action::Extract, State::Completed);
        results.push(
            self.validate_concurrent_load(&load_target, self.config.load_test_events)
                .await,
        );
        results.push(self.validate_performance(&load_target));

        results.push(self.validate_user_journey(&default_journey(target)));
        results.push(self.validate_error_recovery(&[FailureScenario::new(
            "extraction_failure",
            platform_event(Domain::Extraction, target, Action::Extract, State::Failed),
            json!({"reason": "injected"}),
        )]));
        let legacy: Vec<&str> = legacy_names.iter().map(String::as_str).collect();
        results.push(self.validate_legacy_compatibility_for(&legacy, target));

        self.finish_report(platform, results, started)
    }

    fn finish_report(&self, platform: &str, results: Vec<ValidationResult>, started: Instant) -> ValidationReport {
        let report = ValidationReport::new(platform, results, started.elapsed());
        tracing::info!(
            platform = %platform,
            passed = report.passed,
            failed = report.failed,
            elapsed_ms = report.total_time.as_millis() as u64,
            "Full migration validation finished"
        );
        report
    }
}

/// Render a name known to be compatible with every book platform
fn platform_event(domain: Domain, platform: Platform, action: Action, state: State) -> String {
    EventName::new(domain, platform, action, state)
        .map(|name| name.to_string())
        .unwrap_or_else(|_| format!("{}.{}.{}.{}", domain, platform, action, state))
}

fn default_journey(platform: Platform) -> UserJourney {
    let steps = vec![
        JourneyStep::new(
            platform_event(Domain::Page, platform, Action::Detect, State::Detected),
            json!({"url": "library"}),
        ),
        JourneyStep::new(
            platform_event(Domain::Extraction, platform, Action::Extract, State::Started),
            json!({}),
        ),
        JourneyStep::new(
            platform_event(Domain::Extraction, platform, Action::Extract, State::Completed),
            json!({"books": 0}),
        ),
        JourneyStep::new(
            platform_event(Domain::Data, platform, Action::Save, State::Completed),
            json!({"saved": 0}),
        ),
        JourneyStep::new("UX.UNIVERSAL.RENDER.COMPLETED", json!({})),
    ];
    UserJourney {
        name: "library_sync".to_string(),
        steps,
    }
}
