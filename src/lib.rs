//! # a3s-dispatch
//!
//! Priority-ordered in-process event dispatch for the A3S ecosystem, with a
//! structured event-name taxonomy and a layered migration validator.
//!
//! ## Overview
//!
//! Producers emit named events with a JSON payload; subscribers register
//! handlers on those names. Every name maps to an urgency band, and handlers
//! run in ascending priority order. A failing handler is isolated: it is
//! logged and counted, and the handlers after it still run.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_dispatch::{EventBus, Handler};
//!
//! let bus = EventBus::new();
//!
//! // Priority resolved from the name: EXTRACTION work is business processing
//! bus.on(
//!     "EXTRACTION.READMOO.EXTRACT.COMPLETED",
//!     Handler::sync(|event| {
//!         println!("{} books", event.payload["books"]);
//!         Ok(())
//!     }),
//!     None,
//! );
//!
//! let report = bus.emit(
//!     "EXTRACTION.READMOO.EXTRACT.COMPLETED",
//!     serde_json::json!({"books": 42}),
//!     None,
//! );
//! assert_eq!(report.invoked, 1);
//! assert!(report.is_clean());
//! ```
//!
//! ## Architecture
//!
//! - **EventBus** — subscriber registry and priority-ordered dispatch
//! - **Handler** — sync (run inline) or detached (spawned on tokio)
//! - **EventPriorityManager** — classifies names into five urgency bands
//! - **EventTypeDefinitions** — `DOMAIN.PLATFORM.ACTION.STATE` validation,
//!   parsing, building, and "did you mean" suggestions
//! - **MigrationValidator** — five-layer certification of legacy → modern
//!   event paths, with retry, caching, and monitoring

pub mod bus;
pub mod error;
pub mod migration;
pub mod naming;
pub mod priority;
pub mod types;

// Re-export core types
pub use bus::{BusConfig, BusStats, EmitReport, EventBus, EventStats, Handler, SubscriptionId};
pub use error::{DispatchError, Result};
pub use naming::{
    Action, Domain, EventName, EventTypeDefinitions, LegacyEventName, NameRejection, Platform,
    State, UsageStats,
};
pub use priority::{
    EventPriorityManager, PriorityBand, PriorityConfig, PRIORITY_LIMIT, UNASSIGNED_PRIORITY,
};
pub use types::Event;

// Re-export the validator entry points
pub use migration::{
    MigrationValidator, ValidationLayer, ValidationReport, ValidationResult, ValidatorConfig,
};
