//! Closed vocabularies for structured event names
//!
//! Each of the four segments of `DOMAIN.PLATFORM.ACTION.STATE` is drawn from
//! a fixed enum. Compatibility between adjacent segments is declared here as
//! well: which platforms a domain may address, which actions a platform
//! supports, and which states an action can report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declares a vocabulary enum with its wire spelling and an `ALL` list.
macro_rules! vocabulary {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Every member of the vocabulary, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Segment label used in diagnostics
            pub const LABEL: &'static str = $label;

            /// Uppercase wire spelling
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = crate::error::DispatchError;

            fn from_str(s: &str) -> crate::error::Result<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(crate::error::DispatchError::InvalidComponent {
                        segment: $label.to_string(),
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

vocabulary! {
    /// Top-level subsystem that owns an event
    Domain, "domain" {
        System => "SYSTEM",
        Platform => "PLATFORM",
        Extraction => "EXTRACTION",
        Data => "DATA",
        Messaging => "MESSAGING",
        Page => "PAGE",
        Ux => "UX",
        Security => "SECURITY",
        Analytics => "ANALYTICS",
    }
}

vocabulary! {
    /// Book platform an event concerns (`UNIVERSAL` for platform-agnostic)
    Platform, "platform" {
        Readmoo => "READMOO",
        Kindle => "KINDLE",
        Kobo => "KOBO",
        Bookwalker => "BOOKWALKER",
        BooksCom => "BOOKS_COM",
        Universal => "UNIVERSAL",
    }
}

vocabulary! {
    /// Operation being reported
    Action, "action" {
        Init => "INIT",
        Detect => "DETECT",
        Switch => "SWITCH",
        Extract => "EXTRACT",
        Validate => "VALIDATE",
        Save => "SAVE",
        Load => "LOAD",
        Sync => "SYNC",
        Send => "SEND",
        Receive => "RECEIVE",
        Render => "RENDER",
        Update => "UPDATE",
        Click => "CLICK",
        Track => "TRACK",
        Analyze => "ANALYZE",
        Cleanup => "CLEANUP",
    }
}

vocabulary! {
    /// Lifecycle state of the operation
    State, "state" {
        Requested => "REQUESTED",
        Started => "STARTED",
        Progress => "PROGRESS",
        Completed => "COMPLETED",
        Failed => "FAILED",
        Cancelled => "CANCELLED",
        Timeout => "TIMEOUT",
        Detected => "DETECTED",
        Ready => "READY",
    }
}

const BOOK_PLATFORMS: &[Platform] = &[
    Platform::Readmoo,
    Platform::Kindle,
    Platform::Kobo,
    Platform::Bookwalker,
    Platform::BooksCom,
];

const UNIVERSAL_ONLY: &[Platform] = &[Platform::Universal];

const BOOK_PLATFORM_ACTIONS: &[Action] = &[
    Action::Detect,
    Action::Switch,
    Action::Extract,
    Action::Validate,
    Action::Save,
    Action::Load,
    Action::Sync,
    Action::Send,
    Action::Receive,
    Action::Render,
    Action::Update,
    Action::Click,
    Action::Track,
    Action::Analyze,
];

impl Domain {
    /// Platforms this domain may address
    pub fn platforms(&self) -> &'static [Platform] {
        match self {
            Domain::System | Domain::Security => UNIVERSAL_ONLY,
            Domain::Extraction | Domain::Page => BOOK_PLATFORMS,
            Domain::Platform
            | Domain::Data
            | Domain::Messaging
            | Domain::Ux
            | Domain::Analytics => Platform::ALL,
        }
    }

    pub fn supports(&self, platform: Platform) -> bool {
        self.platforms().contains(&platform)
    }
}

impl Platform {
    /// Actions supported on this platform
    pub fn actions(&self) -> &'static [Action] {
        match self {
            Platform::Universal => Action::ALL,
            _ => BOOK_PLATFORM_ACTIONS,
        }
    }

    pub fn supports(&self, action: Action) -> bool {
        self.actions().contains(&action)
    }

    /// True for concrete book platforms (everything except `UNIVERSAL`)
    pub fn is_book_platform(&self) -> bool {
        *self != Platform::Universal
    }
}

impl Action {
    /// States this action can report
    pub fn states(&self) -> &'static [State] {
        use State::*;
        match self {
            Action::Init => &[Requested, Started, Completed, Failed, Ready],
            Action::Detect => &[Started, Detected, Completed, Failed, Timeout],
            Action::Switch => &[Requested, Started, Completed, Failed, Cancelled],
            Action::Extract => &[
                Requested, Started, Progress, Completed, Failed, Cancelled, Timeout,
            ],
            Action::Validate => &[Started, Completed, Failed],
            Action::Save => &[Requested, Started, Completed, Failed],
            Action::Load => &[Requested, Started, Completed, Failed, Ready],
            Action::Sync => &[
                Requested, Started, Progress, Completed, Failed, Cancelled, Timeout,
            ],
            Action::Send => &[Requested, Completed, Failed, Timeout],
            Action::Receive => &[Completed, Failed],
            Action::Render => &[Requested, Started, Completed, Failed, Ready],
            Action::Update => &[Requested, Completed, Failed],
            Action::Click => &[Requested, Completed],
            Action::Track => &[Started, Completed, Failed],
            Action::Analyze => &[Started, Progress, Completed, Failed],
            Action::Cleanup => &[Requested, Started, Completed, Failed],
        }
    }

    pub fn supports(&self, state: State) -> bool {
        self.states().contains(&state)
    }
}
