//! Retry, caching and error triage on top of the layer checks

use super::result::{
    Check, IssueCode, Severity, ValidationIssue, ValidationLayer, ValidationResult,
};
use super::{CacheEntry, MigrationValidator};
use crate::naming::{classify, LegacyEventName};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::PoisonError;
use std::time::{Duration, Instant};

/// Retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryOptions {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Attempt `n` is followed by a `n × base_delay` pause
    pub base_delay: Duration,
}

impl RetryOptions {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }
}

/// One attempt in a retry trace
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryAttempt {
    /// 1-based
    pub attempt: u32,
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub timing: Duration,
    /// Pause taken before the next attempt, if any
    pub backoff: Option<Duration>,
}

/// Final verdict plus the full attempt history
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryOutcome {
    pub name: String,
    pub is_valid: bool,
    pub attempts: Vec<RetryAttempt>,
    pub final_result: ValidationResult,
    pub total_time: Duration,
}

/// Run `check` until it passes or the retries are used up
///
/// Backoff is linear: after failed attempt `n` the retry waits
/// `n × base_delay`.
pub async fn retry_with<F, Fut>(name: &str, options: RetryOptions, mut check: F) -> RetryOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ValidationResult>,
{
    let started = tokio::time::Instant::now();
    let max_attempts = options.max_retries.saturating_add(1);
    let mut attempts = Vec::new();
    let mut attempt = 1;

    loop {
        let result = check().await;
        let exhausted = result.is_valid || attempt >= max_attempts;
        let backoff = (!exhausted).then(|| backoff_delay(options.base_delay, attempt));

        attempts.push(RetryAttempt {
            attempt,
            is_valid: result.is_valid,
            issues: result.issues.clone(),
            timing: result.timing,
            backoff,
        });

        match backoff {
            None => {
                if !result.is_valid {
                    tracing::warn!(check = %name, attempts = attempt, "Validation failed after retries");
                }
                return RetryOutcome {
                    name: name.to_string(),
                    is_valid: result.is_valid,
                    attempts,
                    final_result: result,
                    total_time: started.elapsed(),
                };
            }
            Some(delay) => {
                tracing::debug!(
                    check = %name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Validation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Pause after failed attempt `attempt`, saturating at `Duration::MAX`
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}

/// A cache lookup outcome
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedValidation {
    pub result: ValidationResult,
    pub from_cache: bool,
    /// Time spent serving this call
    pub execution_time: Duration,
}

/// Follow-up class for a bucket of issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ImmediateFix,
    ScheduledFix,
    Monitor,
}

impl ActionKind {
    fn for_severity(severity: Severity) -> Self {
        match severity {
            Severity::Critical => ActionKind::ImmediateFix,
            Severity::Warning => ActionKind::ScheduledFix,
            Severity::Info => ActionKind::Monitor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedAction {
    pub severity: Severity,
    pub action: ActionKind,
    /// Issues this action covers
    pub count: usize,
}

/// Issues bucketed by severity, with actions ordered most urgent first
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorCategories {
    pub critical: Vec<ValidationIssue>,
    pub warning: Vec<ValidationIssue>,
    pub info: Vec<ValidationIssue>,
    pub actions: Vec<RecommendedAction>,
}

impl MigrationValidator {
    /// Validate one event name
    ///
    /// Legacy names go through the conversion check; anything else must be
    /// a valid modern name. Rejected names carry suggestions in the details.
    pub fn validate_event(&self, name: &str) -> ValidationResult {
        if classify(name).is_err() && LegacyEventName::parse(name).is_some() {
            return self.validate_event_conversion(name);
        }

        let mut check = Check::start(ValidationLayer::EventConversion, "event_name");
        check.detail("event", name);
        if let Err(rejection) = self.definitions.validate_event_name(name) {
            check.issue(
                IssueCode::InvalidName,
                format!("'{}' is not a valid event name ({})", name, rejection.code()),
            );
            check.detail("suggestions", self.definitions.suggest_corrections(name));
        }
        self.definitions.record_event_usage(name);
        self.record(check.finish())
    }

    /// `validate_event` with retries; `None` uses the configured policy
    pub async fn validate_with_retry(&self, name: &str, options: Option<RetryOptions>) -> RetryOutcome {
        let options = options.unwrap_or_else(|| {
            RetryOptions::new(self.config.default_max_retries, self.config.retry_base_delay())
        });
        retry_with(name, options, move || async move { self.validate_event(name) }).await
    }

    /// `validate_event` memoized for the configured TTL
    ///
    /// Every miss also drops entries that have expired.
    pub fn validate_with_cache(&self, name: &str) -> CachedValidation {
        let started = Instant::now();
        let ttl = self.config.cache_ttl();

        let cached = {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            cache
                .get(name)
                .filter(|entry| entry.stored_at.elapsed() < ttl)
                .map(|entry| entry.result.clone())
        };
        if let Some(result) = cached {
            self.monitor
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .cache_hits += 1;
            return CachedValidation {
                result,
                from_cache: true,
                execution_time: started.elapsed(),
            };
        }

        let result = self.validate_event(name);
        self.monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cache_misses += 1;
        {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            cache.retain(|_, entry| entry.stored_at.elapsed() < ttl);
            cache.insert(
                name.to_string(),
                CacheEntry {
                    result: result.clone(),
                    stored_at: tokio::time::Instant::now(),
                },
            );
        }

        CachedValidation {
            result,
            from_cache: false,
            execution_time: started.elapsed(),
        }
    }

    /// Drop cache entries older than the TTL; returns how many were removed
    pub fn evict_expired(&self) -> usize {
        let ttl = self.config.cache_ttl();
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let before = cache.len();
        cache.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        let evicted = before - cache.len();
        if evicted > 0 {
            tracing::debug!(evicted, "Expired validation cache entries evicted");
        }
        evicted
    }

    /// Bucket issues by severity and derive the follow-up actions
    pub fn categorize_errors(issues: &[ValidationIssue]) -> ErrorCategories {
        let mut categories = ErrorCategories::default();
        for issue in issues {
            match issue.severity() {
                Severity::Critical => categories.critical.push(issue.clone()),
                Severity::Warning => categories.warning.push(issue.clone()),
                Severity::Info => categories.info.push(issue.clone()),
            }
        }

        let buckets = [
            (Severity::Critical, categories.critical.len()),
            (Severity::Warning, categories.warning.len()),
            (Severity::Info, categories.info.len()),
        ];
        categories.actions = buckets
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(severity, count)| RecommendedAction {
                severity,
                action: ActionKind::for_severity(severity),
                count,
            })
            .collect();
        categories
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::naming::EventTypeDefinitions;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn validator() -> MigrationValidator {
        MigrationValidator::new(Arc::new(EventBus::new()), Arc::new(EventTypeDefinitions::new()))
    }

    fn outcome(valid: bool) -> ValidationResult {
        let mut check = Check::start(ValidationLayer::Integration, "flaky");
        if !valid {
            check.issue(IssueCode::ModuleUnreachable, "not yet");
        }
        check.finish()
    }

    #[test]
    fn test_validate_event_modern_and_legacy() {
        let v = validator();
        assert!(v.validate_event("DATA.KOBO.SAVE.COMPLETED").is_valid);

        let legacy = v.validate_event("STORAGE.SAVE.COMPLETED");
        assert!(legacy.is_valid);
        assert_eq!(legacy.check, "event_conversion");

        let bad = v.validate_event("DATA.KOBO.SAVE.COMPLETE");
        assert!(!bad.is_valid);
        assert_eq!(bad.details["suggestions"][0], "DATA.KOBO.SAVE.COMPLETED");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_linear_backoff() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let result = retry_with("flaky", RetryOptions::new(3, Duration::from_millis(100)), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { outcome(n >= 2) }
        })
        .await;

        assert!(result.is_valid);
        assert_eq!(result.attempts.len(), 3);
        assert_eq!(result.attempts[0].backoff, Some(Duration::from_millis(100)));
        assert_eq!(result.attempts[1].backoff, Some(Duration::from_millis(200)));
        assert_eq!(result.attempts[2].backoff, None);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up() {
        let result = retry_with("down", RetryOptions::new(2, Duration::from_millis(10)), || async {
            outcome(false)
        })
        .await;
        assert!(!result.is_valid);
        assert_eq!(result.attempts.len(), 3);
        assert!(!result.final_result.is_valid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate_with_retry_passes_first_time() {
        let v = validator();
        let result = v
            .validate_with_retry("UX.UNIVERSAL.CLICK.COMPLETED", None)
            .await;
        assert!(result.is_valid);
        assert_eq!(result.attempts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_ttl() {
        let v = validator();
        let first = v.validate_with_cache("DATA.KOBO.LOAD.READY");
        assert!(!first.from_cache);

        let second = v.validate_with_cache("DATA.KOBO.LOAD.READY");
        assert!(second.from_cache);
        assert!(second.result.is_valid);
        assert!(second.execution_time < Duration::from_millis(5));

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(v.evict_expired(), 1);
        let third = v.validate_with_cache("DATA.KOBO.LOAD.READY");
        assert!(!third.from_cache);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_miss_sweeps_expired_entries() {
        let v = validator();
        v.validate_with_cache("DATA.KOBO.LOAD.READY");
        v.validate_with_cache("DATA.KOBO.SAVE.COMPLETED");

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(!v.validate_with_cache("DATA.KINDLE.LOAD.READY").from_cache);

        // Both stale entries went with the miss
        assert_eq!(v.evict_expired(), 0);
        assert_eq!(v.cache.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_backoff_delay_saturates() {
        assert_eq!(backoff_delay(Duration::from_millis(100), 3), Duration::from_millis(300));
        assert_eq!(backoff_delay(Duration::MAX, 2), Duration::MAX);
        assert_eq!(backoff_delay(Duration::from_secs(u64::MAX / 2 + 1), 2), Duration::MAX);
    }

    #[test]
    fn test_categorize_errors() {
        let issues = vec![
            ValidationIssue::new(IssueCode::PriorityShift, "band moved"),
            ValidationIssue::new(IssueCode::DroppedEvents, "3 dropped"),
            ValidationIssue::new(IssueCode::InvalidName, "bad name"),
        ];
        let categories = MigrationValidator::categorize_errors(&issues);
        assert_eq!(categories.critical.len(), 2);
        assert!(categories.warning.is_empty());
        assert_eq!(categories.info.len(), 1);
        assert_eq!(
            categories.actions,
            vec![
                RecommendedAction {
                    severity: Severity::Critical,
                    action: ActionKind::ImmediateFix,
                    count: 2,
                },
                RecommendedAction {
                    severity: Severity::Info,
                    action: ActionKind::Monitor,
                    count: 1,
                },
            ]
        );
    }
}
