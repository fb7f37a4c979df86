//! Event type definitions — validate, parse, build, and repair event names
//!
//! `EventTypeDefinitions` is consulted for diagnostics, not on the dispatch
//! hot path. It also keeps usage counters so operators can see which names
//! producers actually emit.

use super::name::{classify, EventName, LegacyEventName, NameRejection, Segment, MAX_EVENT_NAME_LEN};
use super::similarity::nearest;
use super::vocab::{Action, Domain, Platform};
use crate::error::{DispatchError, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

/// Minimum similarity for a nearest-match substitution
pub const SUGGESTION_THRESHOLD: f64 = 0.7;

/// Suggested when nothing structural can be recovered from the input
pub const CANONICAL_EXAMPLES: &[&str] = &[
    "EXTRACTION.READMOO.EXTRACT.COMPLETED",
    "DATA.READMOO.SAVE.COMPLETED",
    "UX.UNIVERSAL.RENDER.COMPLETED",
    "SYSTEM.UNIVERSAL.INIT.COMPLETED",
];

const WRONG_SEPARATORS: &[char] = &['-', ':', '/', ' '];

/// Snapshot of recorded name usage
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    /// Every recorded name, valid or not
    pub total: u64,
    pub valid: u64,
    pub invalid: u64,
    /// Count per distinct name as recorded
    pub by_name: HashMap<String, u64>,
}

#[derive(Default)]
struct UsageCounters {
    stats: UsageStats,
    by_domain: BTreeMap<Domain, u64>,
    by_platform: BTreeMap<Platform, u64>,
}

/// Owner of the event-name vocabularies and usage statistics
#[derive(Default)]
pub struct EventTypeDefinitions {
    usage: RwLock<UsageCounters>,
}

impl EventTypeDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `name` is a well-formed modern event name. Never panics.
    pub fn is_valid_event_name(&self, name: &str) -> bool {
        self.validate_event_name(name).is_ok()
    }

    /// Classify `name`, returning the parsed name or the rejection class
    pub fn validate_event_name(&self, name: &str) -> std::result::Result<EventName, NameRejection> {
        let result = classify(name);
        if let Err(rejection) = &result {
            tracing::debug!(event = %truncate(name), rejection = %rejection, "Event name rejected");
        }
        result
    }

    /// Classify a loosely-typed value; anything but a JSON string is `InvalidType`
    pub fn classify_value(&self, value: &serde_json::Value) -> std::result::Result<EventName, NameRejection> {
        match value.as_str() {
            Some(name) => self.validate_event_name(name),
            None => Err(NameRejection::InvalidType),
        }
    }

    /// Parse a modern name into its four segments
    pub fn parse_event_name(&self, name: &str) -> Result<EventName> {
        name.parse()
    }

    /// `parse_event_name` for a loosely-typed value
    pub fn parse_event_value(&self, value: &serde_json::Value) -> Result<EventName> {
        match value {
            serde_json::Value::String(name) => self.parse_event_name(name),
            other => Err(DispatchError::InvalidInput(format!(
                "expected an event name string, got {}",
                json_type(other)
            ))),
        }
    }

    /// Build a modern name from string segments, failing on the first invalid one
    pub fn build_event_name(
        &self,
        domain: &str,
        platform: &str,
        action: &str,
        state: &str,
    ) -> Result<String> {
        let name = EventName::from_parts(domain, platform, action, state)?;
        let rendered = name.to_string();
        if rendered.len() > MAX_EVENT_NAME_LEN {
            return Err(DispatchError::MalformedName {
                name: rendered,
                reason: format!("exceeds {} characters", MAX_EVENT_NAME_LEN),
            });
        }
        Ok(rendered)
    }

    /// Ordered, de-duplicated list of valid names close to `invalid`
    pub fn suggest_corrections(&self, invalid: &str) -> Vec<String> {
        let normalized = normalize(invalid);
        let mut candidates = Vec::new();

        if let Some(legacy) = LegacyEventName::parse(&normalized) {
            candidates.extend(expand_legacy(&legacy));
        }

        let segments: Vec<&str> = normalized.split('.').collect();
        if segments.len() == 4 {
            if classify(&normalized).is_ok() {
                candidates.push(normalized.clone());
            } else if let Some(fixed) = substitute_invalid_segment(&segments) {
                candidates.push(fixed);
            }
        }

        if candidates.is_empty() {
            candidates.extend(CANONICAL_EXAMPLES.iter().map(|s| s.to_string()));
        }

        let mut seen = HashSet::new();
        candidates.retain(|c| seen.insert(c.clone()));
        candidates
    }

    /// Count one occurrence of `name`
    ///
    /// Invalid names count toward totals but not toward the domain and
    /// platform breakdowns.
    pub fn record_event_usage(&self, name: &str) {
        let parsed = classify(name).ok();
        let mut usage = self.usage.write().unwrap_or_else(PoisonError::into_inner);
        usage.stats.total += 1;
        *usage.stats.by_name.entry(name.to_string()).or_insert(0) += 1;
        match parsed {
            Some(parsed) => {
                usage.stats.valid += 1;
                *usage.by_domain.entry(parsed.domain).or_insert(0) += 1;
                *usage.by_platform.entry(parsed.platform).or_insert(0) += 1;
            }
            None => usage.stats.invalid += 1,
        }
    }

    pub fn get_usage_stats(&self) -> UsageStats {
        let usage = self.usage.read().unwrap_or_else(PoisonError::into_inner);
        usage.stats.clone()
    }

    pub fn get_domain_distribution(&self) -> BTreeMap<Domain, u64> {
        let usage = self.usage.read().unwrap_or_else(PoisonError::into_inner);
        usage.by_domain.clone()
    }

    pub fn get_platform_distribution(&self) -> BTreeMap<Platform, u64> {
        let usage = self.usage.read().unwrap_or_else(PoisonError::into_inner);
        usage.by_platform.clone()
    }

    pub fn reset_usage_stats(&self) {
        let mut usage = self.usage.write().unwrap_or_else(PoisonError::into_inner);
        *usage = UsageCounters::default();
        tracing::info!("Event usage statistics reset");
    }

    /// Human-readable list of every naming violation in `name`
    ///
    /// Empty for a valid name.
    pub fn detect_naming_errors(&self, name: &str) -> Vec<String> {
        if name.is_empty() {
            return vec!["Event name is empty".to_string()];
        }

        let mut errors = Vec::new();
        let length = name.chars().count();
        if length > MAX_EVENT_NAME_LEN {
            errors.push(format!(
                "Event name is {} characters long, maximum is {}",
                length, MAX_EVENT_NAME_LEN
            ));
        }

        for sep in WRONG_SEPARATORS {
            if name.contains(*sep) {
                errors.push(format!("Use '.' as the segment separator instead of '{}'", sep));
            }
        }

        if name.chars().any(|c| c.is_lowercase()) {
            errors.push("Event name must be uppercase".to_string());
        }

        let mut bad_chars: Vec<char> = name
            .chars()
            .filter(|c| {
                !c.is_alphanumeric() && *c != '_' && *c != '.' && !WRONG_SEPARATORS.contains(c)
            })
            .collect();
        bad_chars.dedup();
        for c in bad_chars {
            errors.push(format!("Invalid character '{}'", c));
        }

        let normalized = normalize(name);
        let segments: Vec<&str> = normalized.split('.').collect();
        if segments.len() != 4 {
            let mut msg = format!(
                "Expected 4 segments (DOMAIN.PLATFORM.ACTION.STATE), found {}",
                segments.len()
            );
            if segments.len() == 3 {
                msg.push_str("; this looks like a legacy MODULE.ACTION.STATE name");
            }
            errors.push(msg);
            return errors;
        }

        for (segment, value) in Segment::ORDER.iter().zip(&segments) {
            if value.is_empty() {
                errors.push(format!("Empty {} segment", segment.label()));
            } else if !segment.contains(value) {
                let mut msg = format!("Unknown {} '{}'", segment.label(), value);
                if let Some((hint, score)) = nearest(value, &segment.vocabulary()) {
                    if score > SUGGESTION_THRESHOLD {
                        msg.push_str(&format!(" (did you mean '{}'?)", hint));
                    }
                }
                errors.push(msg);
            }
        }

        if errors.is_empty() {
            if let Err(DispatchError::InvalidComponent { segment, value }) =
                EventName::from_parts(segments[0], segments[1], segments[2], segments[3])
            {
                errors.push(format!(
                    "{} '{}' is not compatible with the preceding segment",
                    capitalize(&segment),
                    value
                ));
            }
        }

        errors
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Uppercase and replace common wrong separators with '.'
fn normalize(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if WRONG_SEPARATORS.contains(&c) {
                '.'
            } else {
                c.to_ascii_uppercase()
            }
        })
        .collect()
}

/// Every modern form valid for a legacy name's module
fn expand_legacy(legacy: &LegacyEventName) -> Vec<String> {
    let Ok(domain) = legacy.module.parse::<Domain>() else {
        return Vec::new();
    };
    domain
        .platforms()
        .iter()
        .filter_map(|platform| {
            EventName::from_parts(
                domain.as_str(),
                platform.as_str(),
                &legacy.action,
                &legacy.state,
            )
            .ok()
        })
        .map(|name| name.to_string())
        .collect()
}

/// Replace the first unknown or incompatible segment with its nearest valid value
fn substitute_invalid_segment(segments: &[&str]) -> Option<String> {
    let domain = segments[0].parse::<Domain>().ok();
    let platform = segments[1].parse::<Platform>().ok();
    let action = segments[2].parse::<Action>().ok();

    let position = Segment::ORDER.iter().position(|segment| {
        let value = segments[segment_index(*segment)];
        match segment {
            Segment::Domain => domain.is_none(),
            Segment::Platform => match (domain, platform) {
                (Some(d), Some(p)) => !d.supports(p),
                (_, p) => p.is_none(),
            },
            Segment::Action => match (platform, action) {
                (Some(p), Some(a)) => !p.supports(a),
                (_, a) => a.is_none(),
            },
            Segment::State => match action {
                Some(a) => !a.states().iter().any(|s| s.as_str() == value),
                None => !segment.contains(value),
            },
        }
    })?;

    let segment = Segment::ORDER[position];
    let allowed: Vec<&'static str> = match segment {
        Segment::Platform => match domain {
            Some(d) => d.platforms().iter().map(|p| p.as_str()).collect(),
            None => segment.vocabulary(),
        },
        Segment::Action => match platform {
            Some(p) => p.actions().iter().map(|a| a.as_str()).collect(),
            None => segment.vocabulary(),
        },
        Segment::State => match action {
            Some(a) => a.states().iter().map(|s| s.as_str()).collect(),
            None => segment.vocabulary(),
        },
        Segment::Domain => segment.vocabulary(),
    };

    let (replacement, score) = nearest(segments[position], &allowed)?;
    if score <= SUGGESTION_THRESHOLD {
        return None;
    }

    let mut fixed: Vec<&str> = segments.to_vec();
    fixed[position] = replacement;
    let candidate = fixed.join(".");
    classify(&candidate).ok().map(|_| candidate)
}

fn segment_index(segment: Segment) -> usize {
    match segment {
        Segment::Domain => 0,
        Segment::Platform => 1,
        Segment::Action => 2,
        Segment::State => 3,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Clip untrusted names before they reach the logs
fn truncate(name: &str) -> &str {
    match name.char_indices().nth(MAX_EVENT_NAME_LEN) {
        Some((idx, _)) => &name[..idx],
        None => name,
    }
}
