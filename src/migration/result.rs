//! Validation results, issues, and reports

use crate::error::DispatchError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// The five certification layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLayer {
    Configuration,
    EventConversion,
    FunctionalIntegrity,
    PerformanceBaseline,
    Integration,
}

impl ValidationLayer {
    pub const ALL: [ValidationLayer; 5] = [
        ValidationLayer::Configuration,
        ValidationLayer::EventConversion,
        ValidationLayer::FunctionalIntegrity,
        ValidationLayer::PerformanceBaseline,
        ValidationLayer::Integration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationLayer::Configuration => "configuration",
            ValidationLayer::EventConversion => "event_conversion",
            ValidationLayer::FunctionalIntegrity => "functional_integrity",
            ValidationLayer::PerformanceBaseline => "performance_baseline",
            ValidationLayer::Integration => "integration",
        }
    }
}

impl fmt::Display for ValidationLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How urgently an issue needs attention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// What went wrong in a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    UnsupportedPlatform,
    MissingSection,
    InvalidMapping,
    InvalidName,
    DataDivergence,
    HandlerFailure,
    UnknownWorkflow,
    StepFailed,
    MissingField,
    ModuleUnreachable,
    DroppedEvents,
    RecoveryFailed,
    PerformanceRegression,
    NoMeasurements,
    LatencyExceeded,
    MemoryGrowth,
    ThroughputBelowTarget,
    RecoveryTimeout,
    InferredMapping,
    PriorityShift,
}

impl IssueCode {
    pub fn severity(&self) -> Severity {
        use IssueCode::*;
        match self {
            UnsupportedPlatform | MissingSection | InvalidMapping | InvalidName
            | DataDivergence | HandlerFailure | UnknownWorkflow | StepFailed | MissingField
            | ModuleUnreachable | DroppedEvents | RecoveryFailed => Severity::Critical,
            PerformanceRegression | NoMeasurements | LatencyExceeded | MemoryGrowth
            | ThroughputBelowTarget | RecoveryTimeout => Severity::Warning,
            InferredMapping | PriorityShift => Severity::Info,
        }
    }
}

/// A single finding from a check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub code: IssueCode,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

/// Immutable outcome of one layer check
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub layer: ValidationLayer,
    /// Which check within the layer produced this result
    pub check: String,
    /// True when no critical or warning issue was found
    pub is_valid: bool,
    pub details: serde_json::Value,
    pub issues: Vec<ValidationIssue>,
    pub timing: Duration,
    pub timestamp: DateTime<Utc>,
}

impl ValidationResult {
    /// Convert a failed result into a `ValidationFailure` error
    pub fn into_result(self) -> crate::Result<Self> {
        if self.is_valid {
            return Ok(self);
        }
        let reason = self
            .issues
            .iter()
            .filter(|i| i.severity() != Severity::Info)
            .map(|i| i.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Err(DispatchError::ValidationFailure {
            layer: self.layer.to_string(),
            reason,
        })
    }
}

/// In-progress check; accumulates details and issues, then freezes into a result
pub(crate) struct Check {
    layer: ValidationLayer,
    name: &'static str,
    started: Instant,
    details: serde_json::Map<String, serde_json::Value>,
    issues: Vec<ValidationIssue>,
}

impl Check {
    pub(crate) fn start(layer: ValidationLayer, name: &'static str) -> Self {
        Self {
            layer,
            name,
            started: Instant::now(),
            details: serde_json::Map::new(),
            issues: Vec::new(),
        }
    }

    pub(crate) fn detail(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.details.insert(key.to_string(), value.into());
    }

    pub(crate) fn issue(&mut self, code: IssueCode, message: impl Into<String>) {
        self.issues.push(ValidationIssue::new(code, message));
    }

    pub(crate) fn has_blocking_issues(&self) -> bool {
        self.issues.iter().any(|i| i.severity() != Severity::Info)
    }

    pub(crate) fn finish(self) -> ValidationResult {
        let is_valid = !self.has_blocking_issues();
        ValidationResult {
            layer: self.layer,
            check: self.name.to_string(),
            is_valid,
            details: serde_json::Value::Object(self.details),
            issues: self.issues,
            timing: self.started.elapsed(),
            timestamp: Utc::now(),
        }
    }
}

/// Aggregate of a full multi-layer run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub platform: String,
    pub is_valid: bool,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<ValidationResult>,
    pub total_time: Duration,
}

impl ValidationReport {
    pub(crate) fn new(platform: &str, results: Vec<ValidationResult>, total_time: Duration) -> Self {
        let passed = results.iter().filter(|r| r.is_valid).count();
        let failed = results.len() - passed;
        Self {
            platform: platform.to_string(),
            is_valid: failed == 0,
            passed,
            failed,
            results,
            total_time,
        }
    }

    pub fn layer_results(&self, layer: ValidationLayer) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(move |r| r.layer == layer)
    }

    /// Every issue from every result, in run order
    pub fn issues(&self) -> Vec<ValidationIssue> {
        self.results
            .iter()
            .flat_map(|r| r.issues.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_validity_ignores_info() {
        let mut check = Check::start(ValidationLayer::EventConversion, "event_conversion");
        check.issue(IssueCode::InferredMapping, "no explicit mapping");
        let result = check.finish();
        assert!(result.is_valid);
        assert_eq!(result.issues.len(), 1);

        let mut check = Check::start(ValidationLayer::PerformanceBaseline, "performance");
        check.issue(IssueCode::PerformanceRegression, "too slow");
        assert!(!check.finish().is_valid);
    }

    #[test]
    fn test_into_result_reports_layer() {
        let mut check = Check::start(ValidationLayer::Configuration, "configuration");
        check.detail("platform", "NOOK");
        check.issue(IssueCode::UnsupportedPlatform, "NOOK is not supported");
        let err = check.finish().into_result().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed in layer 'configuration': NOOK is not supported"
        );
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(IssueCode::DroppedEvents.severity(), Severity::Critical);
        assert_eq!(IssueCode::MemoryGrowth.severity(), Severity::Warning);
        assert_eq!(IssueCode::PriorityShift.severity(), Severity::Info);
        assert!(Severity::Critical < Severity::Warning);
    }

    #[test]
    fn test_report_counts() {
        let ok = Check::start(ValidationLayer::Integration, "user_journey").finish();
        let mut bad = Check::start(ValidationLayer::Integration, "error_recovery");
        bad.issue(IssueCode::RecoveryFailed, "still failing");
        let report = ValidationReport::new("READMOO", vec![ok, bad.finish()], Duration::ZERO);

        assert!(!report.is_valid);
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.layer_results(ValidationLayer::Integration).count(), 2);
        assert_eq!(report.issues().len(), 1);
    }
}
