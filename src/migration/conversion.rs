//! Legacy → modern event-name conversion

use crate::error::{DispatchError, Result};
use crate::naming::{classify, EventName, LegacyEventName, Platform};
use serde::Serialize;
use std::collections::HashMap;

/// Domain used for names with no explicit mapping
pub const INFERRED_DOMAIN: &str = "UNKNOWN";

/// Built-in legacy mappings, all targeting the reference platform
pub const DEFAULT_LEGACY_MAPPINGS: &[(&str, &str)] = &[
    ("EXTRACTION.DATA.STARTED", "EXTRACTION.READMOO.EXTRACT.STARTED"),
    ("EXTRACTION.DATA.COMPLETED", "EXTRACTION.READMOO.EXTRACT.COMPLETED"),
    ("EXTRACTION.DATA.FAILED", "EXTRACTION.READMOO.EXTRACT.FAILED"),
    ("EXTRACTION.PROGRESS.UPDATED", "EXTRACTION.READMOO.EXTRACT.PROGRESS"),
    ("STORAGE.SAVE.REQUESTED", "DATA.READMOO.SAVE.REQUESTED"),
    ("STORAGE.SAVE.COMPLETED", "DATA.READMOO.SAVE.COMPLETED"),
    ("STORAGE.LOAD.COMPLETED", "DATA.READMOO.LOAD.COMPLETED"),
    ("UI.POPUP.OPENED", "UX.UNIVERSAL.RENDER.COMPLETED"),
    ("UI.PROGRESS.UPDATE", "UX.UNIVERSAL.UPDATE.REQUESTED"),
    ("CONTENT.PAGE.DETECTED", "PAGE.READMOO.DETECT.DETECTED"),
    ("BACKGROUND.INIT.COMPLETED", "SYSTEM.UNIVERSAL.INIT.COMPLETED"),
    ("MESSAGE.SEND.COMPLETED", "MESSAGING.UNIVERSAL.SEND.COMPLETED"),
    ("ANALYTICS.TRACK.COMPLETED", "ANALYTICS.READMOO.TRACK.COMPLETED"),
];

/// Result of converting one name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversion {
    pub legacy: String,
    pub modern: String,
    /// True when no explicit mapping existed and the name was inferred
    pub inferred: bool,
}

/// Deterministic legacy → modern name mapper
#[derive(Debug, Clone)]
pub struct EventConverter {
    mappings: HashMap<String, String>,
    default_platform: Platform,
}

impl Default for EventConverter {
    fn default() -> Self {
        Self::new(Platform::Readmoo)
    }
}

impl EventConverter {
    /// Converter with the built-in mapping table
    pub fn new(default_platform: Platform) -> Self {
        let mappings = DEFAULT_LEGACY_MAPPINGS
            .iter()
            .map(|(legacy, modern)| (legacy.to_string(), modern.to_string()))
            .collect();
        Self {
            mappings,
            default_platform,
        }
    }

    /// Add or replace a mapping
    pub fn insert(&mut self, legacy: impl Into<String>, modern: impl Into<String>) {
        self.mappings.insert(legacy.into(), modern.into());
    }

    pub fn is_mapped(&self, legacy: &str) -> bool {
        self.mappings.contains_key(legacy)
    }

    /// Mapped legacy names, sorted
    pub fn legacy_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.mappings.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn default_platform(&self) -> Platform {
        self.default_platform
    }

    /// Convert using the default platform
    pub fn convert(&self, name: &str) -> Result<Conversion> {
        self.convert_for(name, self.default_platform)
    }

    /// Convert for a specific platform
    ///
    /// Modern names pass through unchanged. Mapped names targeting a book
    /// platform are retargeted to `platform` when the result stays valid.
    /// Unmapped legacy names become `UNKNOWN.<PLATFORM>.<action>.<state>`.
    pub fn convert_for(&self, name: &str, platform: Platform) -> Result<Conversion> {
        if classify(name).is_ok() {
            return Ok(Conversion {
                legacy: name.to_string(),
                modern: name.to_string(),
                inferred: false,
            });
        }

        let legacy = LegacyEventName::parse(name).ok_or_else(|| DispatchError::MalformedName {
            name: name.to_string(),
            reason: "not a legacy MODULE.ACTION.STATE name".to_string(),
        })?;

        let modern = match self.mappings.get(name) {
            Some(mapped) => retarget(mapped, platform),
            None => {
                return Ok(Conversion {
                    legacy: name.to_string(),
                    modern: format!(
                        "{}.{}.{}.{}",
                        INFERRED_DOMAIN, platform, legacy.action, legacy.state
                    ),
                    inferred: true,
                })
            }
        };

        Ok(Conversion {
            legacy: name.to_string(),
            modern,
            inferred: false,
        })
    }
}

fn retarget(mapped: &str, platform: Platform) -> String {
    match mapped.parse::<EventName>() {
        Ok(name) if name.platform.is_book_platform() && platform.is_book_platform() => {
            EventName::new(name.domain, platform, name.action, name.state)
                .map(|n| n.to_string())
                .unwrap_or_else(|_| mapped.to_string())
        }
        _ => mapped.to_string(),
    }
}
