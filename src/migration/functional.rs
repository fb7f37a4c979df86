//! Layer 3: functional integrity

use super::result::{Check, IssueCode, ValidationLayer, ValidationResult};
use super::MigrationValidator;
use crate::error::Result;
use crate::naming::Platform;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

/// Reachability check for one collaborating module
#[async_trait]
pub trait ModuleProbe: Send + Sync {
    async fn ping(&self) -> Result<()>;
}

#[async_trait]
impl<F> ModuleProbe for F
where
    F: Fn() -> Result<()> + Send + Sync,
{
    async fn ping(&self) -> Result<()> {
        self()
    }
}

/// One emitted event within a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    /// Legacy or modern name; legacy names are converted before emitting
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl WorkflowStep {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

/// Named multi-step workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub name: String,
    pub steps: Vec<WorkflowStep>,
}

pub(super) fn default_workflows() -> HashMap<String, Workflow> {
    let book_extraction = Workflow {
        name: "book_extraction".to_string(),
        steps: vec![
            WorkflowStep::new("EXTRACTION.DATA.STARTED", json!({"source": "library"})),
            WorkflowStep::new("EXTRACTION.PROGRESS.UPDATED", json!({"processed": 1, "total": 2})),
            WorkflowStep::new("EXTRACTION.DATA.COMPLETED", json!({"books": 2})),
            WorkflowStep::new("STORAGE.SAVE.COMPLETED", json!({"saved": 2})),
        ],
    };
    let popup_display = Workflow {
        name: "popup_display".to_string(),
        steps: vec![
            WorkflowStep::new("UI.POPUP.OPENED", json!({})),
            WorkflowStep::new("UI.PROGRESS.UPDATE", json!({"percent": 100})),
        ],
    };
    [book_extraction, popup_display]
        .into_iter()
        .map(|w| (w.name.clone(), w))
        .collect()
}

impl MigrationValidator {
    /// Run a registered workflow against the default platform
    pub fn validate_workflow(&self, name: &str) -> ValidationResult {
        self.validate_workflow_for(name, self.converter.default_platform())
    }

    /// Run a registered workflow step by step, converting legacy steps for
    /// `platform`
    ///
    /// A step succeeds when its event converts through an explicit mapping
    /// (or is already modern) and every handler it reaches succeeds.
    pub fn validate_workflow_for(&self, name: &str, platform: Platform) -> ValidationResult {
        let mut check = Check::start(ValidationLayer::FunctionalIntegrity, "workflow");
        check.detail("workflow", name);
        check.detail("platform", platform.as_str());

        let workflow = {
            let workflows = self.workflows.read().unwrap_or_else(PoisonError::into_inner);
            workflows.get(name).cloned()
        };
        let Some(workflow) = workflow else {
            check.issue(
                IssueCode::UnknownWorkflow,
                format!("No workflow named '{}'", name),
            );
            return self.record(check.finish());
        };

        let mut steps = Vec::with_capacity(workflow.steps.len());
        for (index, step) in workflow.steps.iter().enumerate() {
            let conversion = match self.converter.convert_for(&step.event, platform) {
                Ok(conversion) if !conversion.inferred => conversion,
                Ok(_) => {
                    check.issue(
                        IssueCode::StepFailed,
                        format!("Step {} ('{}') has no explicit mapping", index + 1, step.event),
                    );
                    steps.push(json!({"event": step.event, "success": false}));
                    continue;
                }
                Err(e) => {
                    check.issue(
                        IssueCode::StepFailed,
                        format!("Step {} ('{}'): {}", index + 1, step.event, e),
                    );
                    steps.push(json!({"event": step.event, "success": false}));
                    continue;
                }
            };

            let report = self.bus.emit(&conversion.modern, step.payload.clone(), None);
            if !report.is_clean() {
                check.issue(
                    IssueCode::StepFailed,
                    format!(
                        "Step {} ('{}'): {} of {} handlers failed",
                        index + 1,
                        conversion.modern,
                        report.failed,
                        report.invoked
                    ),
                );
            }
            steps.push(json!({
                "event": step.event,
                "modern": conversion.modern,
                "invoked": report.invoked,
                "success": report.is_clean(),
            }));
        }
        check.detail("steps", steps);

        self.record(check.finish())
    }

    /// Check that every required field is present and non-null in `data`
    ///
    /// Fields may be dotted paths into nested objects (`book.title`).
    pub fn validate_data_integrity(&self, data: &Value, required_fields: &[&str]) -> ValidationResult {
        let mut check = Check::start(ValidationLayer::FunctionalIntegrity, "data_integrity");

        let missing: Vec<&str> = required_fields
            .iter()
            .copied()
            .filter(|field| lookup(data, field).map_or(true, Value::is_null))
            .collect();
        for field in &missing {
            check.issue(
                IssueCode::MissingField,
                format!("Required field '{}' is missing", field),
            );
        }
        check.detail("checked", required_fields.len());
        check.detail("missing", missing);

        self.record(check.finish())
    }

    /// Ping each module's registered probe and check its latency
    pub async fn validate_module_connectivity(&self, modules: &[&str]) -> ValidationResult {
        let mut check = Check::start(ValidationLayer::FunctionalIntegrity, "module_connectivity");
        let timeout = Duration::from_millis(self.config.probe_timeout_ms);
        let max_latency = Duration::from_millis(self.config.max_module_latency_ms);

        let mut latencies = serde_json::Map::new();
        for module in modules {
            let probe = {
                let probes = self.probes.read().unwrap_or_else(PoisonError::into_inner);
                probes.get(*module).map(Arc::clone)
            };
            let Some(probe) = probe else {
                check.issue(
                    IssueCode::ModuleUnreachable,
                    format!("No probe registered for module '{}'", module),
                );
                continue;
            };

            let started = tokio::time::Instant::now();
            match tokio::time::timeout(timeout, probe.ping()).await {
                Ok(Ok(())) => {
                    let latency = started.elapsed();
                    latencies.insert(module.to_string(), json!(latency.as_millis() as u64));
                    if latency > max_latency {
                        check.issue(
                            IssueCode::LatencyExceeded,
                            format!(
                                "Module '{}' answered in {}ms (limit {}ms)",
                                module,
                                latency.as_millis(),
                                max_latency.as_millis()
                            ),
                        );
                    }
                }
                Ok(Err(e)) => check.issue(
                    IssueCode::ModuleUnreachable,
                    format!("Module '{}' failed its probe: {}", module, e),
                ),
                Err(_) => check.issue(
                    IssueCode::ModuleUnreachable,
                    format!("Module '{}' did not answer within {}ms", module, timeout.as_millis()),
                ),
            }
        }
        check.detail("latencyMs", Value::Object(latencies));

        self.record(check.finish())
    }
}

fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(data, |value, key| value.get(key))
}
