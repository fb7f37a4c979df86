//! Layer 2: event conversion and dual-track equivalence

use super::result::{Check, IssueCode, ValidationLayer, ValidationResult};
use super::MigrationValidator;
use crate::bus::Handler;
use crate::naming::{classify, Platform};
use crate::priority::EventPriorityManager;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, PoisonError};

/// Probes run ahead of every real subscriber
const PROBE_PRIORITY: u32 = 0;

impl MigrationValidator {
    /// Convert `legacy` for the default platform and check the mapping
    pub fn validate_event_conversion(&self, legacy: &str) -> ValidationResult {
        self.validate_event_conversion_for(legacy, self.converter.default_platform())
    }

    /// Convert `legacy` for `platform` and check the mapping
    ///
    /// The conversion must be deterministic and, unless inferred, land on a
    /// valid modern name. Inferred names and priority-band changes are
    /// reported as informational issues.
    pub fn validate_event_conversion_for(&self, legacy: &str, platform: Platform) -> ValidationResult {
        let mut check = Check::start(ValidationLayer::EventConversion, "event_conversion");
        self.check_conversion(&mut check, legacy, platform);
        self.record(check.finish())
    }

    fn check_conversion(&self, check: &mut Check, legacy: &str, platform: Platform) {
        check.detail("legacy", legacy);
        check.detail("platform", platform.as_str());

        let conversion = match self.converter.convert_for(legacy, platform) {
            Ok(conversion) => conversion,
            Err(e) => {
                check.issue(IssueCode::InvalidName, e.to_string());
                return;
            }
        };
        check.detail("modern", conversion.modern.as_str());
        check.detail("inferred", conversion.inferred);

        match self.converter.convert_for(legacy, platform) {
            Ok(again) if again == conversion => {}
            _ => check.issue(
                IssueCode::InvalidMapping,
                format!("Conversion of '{}' is not deterministic", legacy),
            ),
        }

        if conversion.inferred {
            check.issue(
                IssueCode::InferredMapping,
                format!(
                    "'{}' has no explicit mapping; inferred '{}'",
                    legacy, conversion.modern
                ),
            );
        } else if let Err(rejection) = classify(&conversion.modern) {
            check.issue(
                IssueCode::InvalidMapping,
                format!(
                    "'{}' maps to invalid name '{}' ({})",
                    legacy,
                    conversion.modern,
                    rejection.code()
                ),
            );
        }

        let before = EventPriorityManager::classify(legacy);
        let after = EventPriorityManager::classify(&conversion.modern);
        check.detail("legacyBand", json!(before));
        check.detail("modernBand", json!(after));
        if before != after {
            check.issue(
                IssueCode::PriorityShift,
                format!("Priority band changes from {:?} to {:?}", before, after),
            );
        }

        self.definitions.record_event_usage(&conversion.modern);
    }

    /// Dual-track comparison against the default platform
    pub fn validate_dual_track(&self, legacy: &str, payload: Value) -> ValidationResult {
        self.validate_dual_track_for(legacy, payload, self.converter.default_platform())
    }

    /// Emit `payload` on both the legacy name and its `platform` replacement
    /// and compare what reaches each side
    ///
    /// Existing subscribers on both names run as usual; any failure among
    /// them fails the check.
    pub fn validate_dual_track_for(&self, legacy: &str, payload: Value, platform: Platform) -> ValidationResult {
        let mut check = Check::start(ValidationLayer::EventConversion, "dual_track");
        check.detail("platform", platform.as_str());
        let outcome = self.run_dual_track(&mut check, legacy, payload, platform);
        check.detail("tracks", outcome);
        self.record(check.finish())
    }

    /// Shared by the dual-track and legacy-compatibility checks; returns a
    /// per-track summary
    pub(super) fn run_dual_track(
        &self,
        check: &mut Check,
        legacy: &str,
        payload: Value,
        platform: Platform,
    ) -> Value {
        let conversion = match self.converter.convert_for(legacy, platform) {
            Ok(conversion) => conversion,
            Err(e) => {
                check.issue(IssueCode::InvalidName, e.to_string());
                return json!({ "legacy": legacy });
            }
        };

        let legacy_seen = Arc::new(Mutex::new(None));
        let modern_seen = Arc::new(Mutex::new(None));
        let legacy_probe = self
            .bus
            .on(&conversion.legacy, capture(&legacy_seen), Some(PROBE_PRIORITY));
        let modern_probe = self
            .bus
            .on(&conversion.modern, capture(&modern_seen), Some(PROBE_PRIORITY));

        let legacy_report = self.bus.emit(&conversion.legacy, payload.clone(), None);
        let modern_report = self.bus.emit(&conversion.modern, payload, None);

        self.bus.off(&conversion.legacy, legacy_probe);
        self.bus.off(&conversion.modern, modern_probe);

        for report in [&legacy_report, &modern_report] {
            if !report.is_clean() {
                check.issue(
                    IssueCode::HandlerFailure,
                    format!("{} of {} handlers failed on '{}'", report.failed, report.invoked, report.name),
                );
            }
        }

        let legacy_seen = legacy_seen.lock().unwrap_or_else(PoisonError::into_inner).take();
        let modern_seen = modern_seen.lock().unwrap_or_else(PoisonError::into_inner).take();
        match (&legacy_seen, &modern_seen) {
            (Some(a), Some(b)) if a == b => {}
            (Some(_), Some(_)) => check.issue(
                IssueCode::DataDivergence,
                format!("'{}' and '{}' delivered different payloads", conversion.legacy, conversion.modern),
            ),
            _ => check.issue(
                IssueCode::DataDivergence,
                format!("'{}' and '{}' did not both deliver", conversion.legacy, conversion.modern),
            ),
        }

        json!({
            "legacy": conversion.legacy,
            "modern": conversion.modern,
            "legacyInvoked": legacy_report.invoked,
            "modernInvoked": modern_report.invoked,
        })
    }
}

/// Probe storing the last payload it saw
fn capture(slot: &Arc<Mutex<Option<Value>>>) -> Handler {
    let slot = Arc::clone(slot);
    Handler::sync(move |event| {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(event.payload.clone());
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::error::DispatchError;
    use crate::naming::EventTypeDefinitions;

    fn validator() -> (MigrationValidator, Arc<EventBus>, Arc<EventTypeDefinitions>) {
        let bus = Arc::new(EventBus::new());
        let definitions = Arc::new(EventTypeDefinitions::new());
        let v = MigrationValidator::new(Arc::clone(&bus), Arc::clone(&definitions));
        (v, bus, definitions)
    }

    #[test]
    fn test_mapped_conversion_passes() {
        let (v, _, definitions) = validator();
        let result = v.validate_event_conversion("EXTRACTION.DATA.COMPLETED");
        assert!(result.is_valid);
        assert!(result.issues.is_empty());
        assert_eq!(result.details["modern"], "EXTRACTION.READMOO.EXTRACT.COMPLETED");
        assert_eq!(definitions.get_usage_stats().valid, 1);
    }

    #[test]
    fn test_inferred_conversion_is_informational() {
        let (v, _, _) = validator();
        let result = v.validate_event_conversion_for("LIBRARY.SORT.CHANGED", Platform::Kobo);
        assert!(result.is_valid);
        assert_eq!(result.details["modern"], "UNKNOWN.KOBO.SORT.CHANGED");
        assert!(result.issues.iter().any(|i| i.code == IssueCode::InferredMapping));
    }

    #[test]
    fn test_band_shift_reported() {
        let (v, _, _) = validator();
        // INIT alone is platform management; the SYSTEM domain is critical
        let result = v.validate_event_conversion("BACKGROUND.INIT.COMPLETED");
        assert!(result.is_valid);
        assert!(result.issues.iter().any(|i| i.code == IssueCode::PriorityShift));
    }

    #[test]
    fn test_garbage_conversion_fails() {
        let (v, _, _) = validator();
        let result = v.validate_event_conversion("extraction-data");
        assert!(!result.is_valid);
        assert_eq!(result.issues[0].code, IssueCode::InvalidName);
    }

    #[test]
    fn test_dual_track_equivalence() {
        let (v, bus, _) = validator();
        bus.on("STORAGE.SAVE.COMPLETED", Handler::sync(|_| Ok(())), None);
        bus.on("DATA.READMOO.SAVE.COMPLETED", Handler::sync(|_| Ok(())), None);

        let result = v.validate_dual_track("STORAGE.SAVE.COMPLETED", json!({"books": 12}));
        assert!(result.is_valid, "{:?}", result.issues);
        assert_eq!(result.details["tracks"]["legacyInvoked"], 2);
        assert_eq!(result.details["tracks"]["modernInvoked"], 2);

        // Probes are removed afterwards
        assert_eq!(bus.listener_count("STORAGE.SAVE.COMPLETED"), 1);
        assert_eq!(bus.listener_count("DATA.READMOO.SAVE.COMPLETED"), 1);
    }

    #[test]
    fn test_dual_track_handler_failure() {
        let (v, bus, _) = validator();
        bus.on(
            "DATA.READMOO.SAVE.COMPLETED",
            Handler::sync(|_| Err(DispatchError::handler("quota exceeded"))),
            None,
        );
        let result = v.validate_dual_track("STORAGE.SAVE.COMPLETED", json!({}));
        assert!(!result.is_valid);
        assert_eq!(result.issues[0].code, IssueCode::HandlerFailure);
    }

    #[test]
    fn test_dual_track_targets_requested_platform() {
        let (v, bus, _) = validator();
        bus.on(
            "DATA.KOBO.SAVE.COMPLETED",
            Handler::sync(|_| Err(DispatchError::handler("kobo storage offline"))),
            None,
        );

        // The default platform never reaches the broken subscriber
        assert!(v.validate_dual_track("STORAGE.SAVE.COMPLETED", json!({})).is_valid);

        let result = v.validate_dual_track_for("STORAGE.SAVE.COMPLETED", json!({}), Platform::Kobo);
        assert!(!result.is_valid);
        assert_eq!(result.details["tracks"]["modern"], "DATA.KOBO.SAVE.COMPLETED");
        assert_eq!(result.issues[0].code, IssueCode::HandlerFailure);
    }
}
