//! Typed event names
//!
//! `EventName` holds the four segments as vocabulary enums, so a value of this
//! type is valid by construction. The dotted string form exists only at the
//! boundaries (logging, bus keys, serialization).

use super::vocab::{Action, Domain, Platform, State};
use crate::error::{DispatchError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of a modern event name
pub const MAX_EVENT_NAME_LEN: usize = 100;

/// A structured `DOMAIN.PLATFORM.ACTION.STATE` event name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventName {
    pub domain: Domain,
    pub platform: Platform,
    pub action: Action,
    pub state: State,
}

impl EventName {
    /// Build a name, rejecting segments incompatible with their predecessor
    pub fn new(domain: Domain, platform: Platform, action: Action, state: State) -> Result<Self> {
        if !domain.supports(platform) {
            return Err(incompatible(Platform::LABEL, platform.as_str()));
        }
        if !platform.supports(action) {
            return Err(incompatible(Action::LABEL, action.as_str()));
        }
        if !action.supports(state) {
            return Err(incompatible(State::LABEL, state.as_str()));
        }
        Ok(Self {
            domain,
            platform,
            action,
            state,
        })
    }

    /// Build a name from its four string segments
    ///
    /// Fails on the first segment (in domain → state order) that is unknown
    /// or incompatible.
    pub fn from_parts(domain: &str, platform: &str, action: &str, state: &str) -> Result<Self> {
        let domain: Domain = domain.parse()?;
        let platform: Platform = platform.parse()?;
        if !domain.supports(platform) {
            return Err(incompatible(Platform::LABEL, platform.as_str()));
        }
        let action: Action = action.parse()?;
        if !platform.supports(action) {
            return Err(incompatible(Action::LABEL, action.as_str()));
        }
        let state: State = state.parse()?;
        Self::new(domain, platform, action, state)
    }

    /// Legacy three-segment form (`DOMAIN.ACTION.STATE`)
    pub fn to_legacy(&self) -> LegacyEventName {
        LegacyEventName {
            module: self.domain.as_str().to_string(),
            action: self.action.as_str().to_string(),
            state: self.state.as_str().to_string(),
        }
    }
}

fn incompatible(segment: &str, value: &str) -> DispatchError {
    DispatchError::InvalidComponent {
        segment: segment.to_string(),
        value: value.to_string(),
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.domain, self.platform, self.action, self.state
        )
    }
}

impl FromStr for EventName {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        let segments: Vec<&str> = s.split('.').collect();
        if segments.len() != 4 {
            return Err(DispatchError::MalformedName {
                name: s.to_string(),
                reason: format!("expected 4 segments, found {}", segments.len()),
            });
        }
        Self::from_parts(segments[0], segments[1], segments[2], segments[3])
    }
}

impl From<EventName> for String {
    fn from(name: EventName) -> Self {
        name.to_string()
    }
}

/// Reason a string was rejected as an event name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NameRejection {
    /// Not a string at all
    InvalidType,
    /// Longer than `MAX_EVENT_NAME_LEN`
    TooLong,
    /// Empty, or characters outside `[A-Z0-9_.]`
    InvalidFormat,
    /// Not exactly four non-empty segments
    InvalidStructure,
    /// Unknown or incompatible segment value
    InvalidComponents,
}

impl NameRejection {
    pub fn code(&self) -> &'static str {
        match self {
            NameRejection::InvalidType => "INVALID_TYPE",
            NameRejection::TooLong => "TOO_LONG",
            NameRejection::InvalidFormat => "INVALID_FORMAT",
            NameRejection::InvalidStructure => "INVALID_STRUCTURE",
            NameRejection::InvalidComponents => "INVALID_COMPONENTS",
        }
    }
}

impl fmt::Display for NameRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Classify a candidate name, returning the parsed form when valid
pub fn classify(name: &str) -> std::result::Result<EventName, NameRejection> {
    if name.chars().count() > MAX_EVENT_NAME_LEN {
        return Err(NameRejection::TooLong);
    }
    if name.is_empty() || !name.chars().all(is_name_char) {
        return Err(NameRejection::InvalidFormat);
    }
    let segments: Vec<&str> = name.split('.').collect();
    if segments.len() != 4 || segments.iter().any(|s| s.is_empty()) {
        return Err(NameRejection::InvalidStructure);
    }
    EventName::from_parts(segments[0], segments[1], segments[2], segments[3])
        .map_err(|_| NameRejection::InvalidComponents)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '.'
}

/// A pre-migration `MODULE.ACTION.STATE` event name
///
/// Segments are kept as strings: legacy modules predate the closed
/// vocabularies and need not be members of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyEventName {
    pub module: String,
    pub action: String,
    pub state: String,
}

impl LegacyEventName {
    /// Parse three non-empty uppercase segments; anything else is not legacy
    pub fn parse(name: &str) -> Option<Self> {
        if name.is_empty() || !name.chars().all(is_name_char) {
            return None;
        }
        let segments: Vec<&str> = name.split('.').collect();
        if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        Some(Self {
            module: segments[0].to_string(),
            action: segments[1].to_string(),
            state: segments[2].to_string(),
        })
    }
}

impl fmt::Display for LegacyEventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.module, self.action, self.state)
    }
}

/// Position of a segment within a modern name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    Domain,
    Platform,
    Action,
    State,
}

impl Segment {
    pub const ORDER: [Segment; 4] = [
        Segment::Domain,
        Segment::Platform,
        Segment::Action,
        Segment::State,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Segment::Domain => Domain::LABEL,
            Segment::Platform => Platform::LABEL,
            Segment::Action => Action::LABEL,
            Segment::State => State::LABEL,
        }
    }

    /// Wire spellings of this segment's vocabulary
    pub fn vocabulary(&self) -> Vec<&'static str> {
        match self {
            Segment::Domain => Domain::ALL.iter().map(|v| v.as_str()).collect(),
            Segment::Platform => Platform::ALL.iter().map(|v| v.as_str()).collect(),
            Segment::Action => Action::ALL.iter().map(|v| v.as_str()).collect(),
            Segment::State => State::ALL.iter().map(|v| v.as_str()).collect(),
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.vocabulary().contains(&value)
    }
}
