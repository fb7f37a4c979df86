//! Layer 1: platform configuration

use super::result::{Check, IssueCode, ValidationLayer, ValidationResult};
use super::MigrationValidator;
use crate::naming::{classify, LegacyEventName};
use serde_json::Value;

const EVENT_MAPPINGS_SECTION: &str = "event_mappings";

impl MigrationValidator {
    /// Check that `platform` is supported and its configuration is complete
    ///
    /// `None` means the platform runs on built-in defaults. A customized
    /// configuration must be an object declaring every required section, and
    /// an optional `event_mappings` object must map legacy names to valid
    /// modern ones.
    pub fn validate_configuration(&self, platform: &str, config: Option<&Value>) -> ValidationResult {
        let mut check = Check::start(ValidationLayer::Configuration, "configuration");
        check.detail("platform", platform);

        if let Err(e) = self.supported_platform(platform) {
            check.issue(IssueCode::UnsupportedPlatform, e.to_string());
            return self.record(check.finish());
        }

        let Some(config) = config else {
            check.detail("customized", false);
            return self.record(check.finish());
        };
        check.detail("customized", true);

        let Some(sections) = config.as_object() else {
            check.issue(
                IssueCode::MissingSection,
                "Platform configuration must be an object",
            );
            return self.record(check.finish());
        };

        let mut missing = Vec::new();
        for section in &self.config.required_sections {
            if !sections.contains_key(section) {
                check.issue(
                    IssueCode::MissingSection,
                    format!("Missing required section '{}'", section),
                );
                missing.push(section.clone());
            }
        }
        check.detail("missingSections", missing);

        if let Some(mappings) = sections.get(EVENT_MAPPINGS_SECTION) {
            check_mappings(&mut check, mappings);
        }

        self.record(check.finish())
    }
}

fn check_mappings(check: &mut Check, mappings: &Value) {
    let Some(mappings) = mappings.as_object() else {
        check.issue(
            IssueCode::InvalidMapping,
            format!("'{}' must be an object", EVENT_MAPPINGS_SECTION),
        );
        return;
    };

    for (legacy, modern) in mappings {
        if LegacyEventName::parse(legacy).is_none() {
            check.issue(
                IssueCode::InvalidMapping,
                format!("'{}' is not a legacy event name", legacy),
            );
        }
        match modern.as_str().map(classify) {
            Some(Ok(_)) => {}
            Some(Err(rejection)) => check.issue(
                IssueCode::InvalidMapping,
                format!("'{}' maps to an invalid name ({})", legacy, rejection.code()),
            ),
            None => check.issue(
                IssueCode::InvalidMapping,
                format!("'{}' must map to a string", legacy),
            ),
        }
    }
    check.detail("mappingCount", mappings.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::naming::EventTypeDefinitions;
    use serde_json::json;
    use std::sync::Arc;

    fn validator() -> MigrationValidator {
        MigrationValidator::new(Arc::new(EventBus::new()), Arc::new(EventTypeDefinitions::new()))
    }

    #[test]
    fn test_default_config_passes() {
        let v = validator();
        let result = v.validate_configuration("READMOO", None);
        assert!(result.is_valid);
        assert_eq!(result.details["customized"], false);
    }

    #[test]
    fn test_unsupported_platform_rejected() {
        let v = validator();
        for platform in ["NOOK", "UNIVERSAL", ""] {
            let result = v.validate_configuration(platform, Some(&json!({})));
            assert!(!result.is_valid, "{}", platform);
            assert_eq!(result.issues.len(), 1);
            assert_eq!(result.issues[0].code, IssueCode::UnsupportedPlatform);
        }
    }

    #[test]
    fn test_missing_required_section() {
        let v = validator();
        let result = v.validate_configuration("KOBO", Some(&json!({"selectors": {}})));
        assert!(!result.is_valid);
        assert_eq!(result.issues[0].code, IssueCode::MissingSection);
        assert_eq!(result.details["missingSections"], json!(["extraction_rules"]));

        let result = v.validate_configuration("KOBO", Some(&json!(["extraction_rules"])));
        assert!(!result.is_valid);
    }

    #[test]
    fn test_event_mappings_checked() {
        let v = validator();
        let good = json!({
            "extraction_rules": {"selector": ".book"},
            "event_mappings": {"LIBRARY.SORT.CHANGED": "UX.UNIVERSAL.UPDATE.COMPLETED"}
        });
        assert!(v.validate_configuration("KINDLE", Some(&good)).is_valid);

        let bad = json!({
            "extraction_rules": {},
            "event_mappings": {
                "not-legacy": "UX.UNIVERSAL.UPDATE.COMPLETED",
                "LIBRARY.SORT.CHANGED": "UX.KINDLE.INIT.COMPLETED",
                "LIBRARY.SORT.FAILED": 42
            }
        });
        let result = v.validate_configuration("KINDLE", Some(&bad));
        assert!(!result.is_valid);
        assert_eq!(result.issues.len(), 3);
        assert!(result.issues.iter().all(|i| i.code == IssueCode::InvalidMapping));
    }
}
