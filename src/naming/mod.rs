//! Structured event-name taxonomy
//!
//! Modern names take the form `DOMAIN.PLATFORM.ACTION.STATE`, every segment
//! drawn from a closed vocabulary. Legacy `MODULE.ACTION.STATE` names are
//! recognized for conversion and suggestions only.

mod definitions;
mod name;
pub mod similarity;
mod vocab;

pub use definitions::{EventTypeDefinitions, UsageStats, CANONICAL_EXAMPLES, SUGGESTION_THRESHOLD};
pub use name::{classify, EventName, LegacyEventName, NameRejection, Segment, MAX_EVENT_NAME_LEN};
pub use vocab::{Action, Domain, Platform, State};
