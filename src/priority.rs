//! Event priority manager — classify names into urgency bands
//!
//! Every event name maps to one of five non-overlapping bands; the assigned
//! priority is the band's midpoint. Lower numbers dispatch first. Priorities
//! can be overridden manually, and slow events are demoted based on recorded
//! handler execution times.

use crate::bus::{EventBus, Handler, SubscriptionId};
use crate::error::{DispatchError, Result};
use crate::types::now_millis;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

/// Sentinel returned for unusable names; sorts after every real band
pub const UNASSIGNED_PRIORITY: u32 = 999;

/// Exclusive upper bound for assigned priorities
pub const PRIORITY_LIMIT: u32 = 500;

/// Domains whose band cannot be overridden by keywords
const FORCED_BACKGROUND_DOMAINS: &[&str] = &["ANALYTICS"];

const URGENT_KEYWORDS: &[&str] = &["ERROR", "CRITICAL", "SECURITY", "FAILURE", "URGENT"];

const DOMAIN_OVERRIDES: &[(&str, PriorityBand)] = &[
    ("SYSTEM", PriorityBand::SystemCritical),
    ("SECURITY", PriorityBand::SystemCritical),
    ("PLATFORM", PriorityBand::PlatformManagement),
    ("UX", PriorityBand::UserInteraction),
];

const BACKGROUND_KEYWORDS: &[&str] = &["ANALYTICS", "TRACK", "SYNC", "CLEANUP", "LOG", "METRICS"];

const BAND_KEYWORDS: &[(PriorityBand, &[&str])] = &[
    (
        PriorityBand::PlatformManagement,
        &["PLATFORM", "DETECT", "SWITCH", "INIT", "ADAPTER"],
    ),
    (
        PriorityBand::UserInteraction,
        &["UX", "UI", "CLICK", "RENDER", "POPUP", "INPUT"],
    ),
    (
        PriorityBand::BusinessProcessing,
        &["EXTRACT", "VALIDATE", "SAVE", "LOAD", "PROCESS"],
    ),
];

/// Urgency band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorityBand {
    SystemCritical,
    PlatformManagement,
    UserInteraction,
    BusinessProcessing,
    BackgroundProcessing,
}

impl PriorityBand {
    pub const ALL: [PriorityBand; 5] = [
        PriorityBand::SystemCritical,
        PriorityBand::PlatformManagement,
        PriorityBand::UserInteraction,
        PriorityBand::BusinessProcessing,
        PriorityBand::BackgroundProcessing,
    ];

    pub fn range(&self) -> RangeInclusive<u32> {
        match self {
            PriorityBand::SystemCritical => 0..=99,
            PriorityBand::PlatformManagement => 100..=199,
            PriorityBand::UserInteraction => 200..=299,
            PriorityBand::BusinessProcessing => 300..=399,
            PriorityBand::BackgroundProcessing => 400..=499,
        }
    }

    pub fn midpoint(&self) -> u32 {
        let range = self.range();
        (range.start() + range.end() + 1) / 2
    }

    /// Band containing `priority`, if any
    pub fn of(priority: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|band| band.range().contains(&priority))
    }
}

/// Priority manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PriorityConfig {
    /// Average handling time above which an event is demoted
    pub slow_threshold_ms: u64,
    /// Amount added to a slow event's priority per optimization pass
    pub performance_step: u32,
    /// Performance demotion never pushes a priority past this value
    pub performance_cap: u32,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            slow_threshold_ms: 300,
            performance_step: 50,
            performance_cap: 450,
        }
    }
}

/// Kind of change recorded in a name's priority history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PriorityAction {
    Assigned,
    Adjusted,
    PerformanceAdjusted,
}

/// One entry of the append-only priority history
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityChange {
    pub action: PriorityAction,
    pub old: Option<u32>,
    pub new: u32,
    pub timestamp: u64,
}

/// A name whose history holds more than one distinct priority
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityConflict {
    pub event_name: String,
    /// Distinct priorities in first-seen order
    pub priorities: Vec<u32>,
}

/// A demotion applied by `optimize_based_on_performance`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceAdjustment {
    pub event_name: String,
    pub old: u32,
    pub new: u32,
    pub average_ms: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Timing {
    total: Duration,
    samples: u32,
}

impl Timing {
    fn average(&self) -> Option<Duration> {
        (self.samples > 0).then(|| self.total / self.samples)
    }
}

#[derive(Default)]
struct PriorityState {
    priorities: HashMap<String, u32>,
    history: HashMap<String, Vec<PriorityChange>>,
    timings: HashMap<String, Timing>,
}

impl PriorityState {
    fn set(&mut self, name: &str, action: PriorityAction, new: u32) -> Option<u32> {
        let old = self.priorities.insert(name.to_string(), new);
        self.history
            .entry(name.to_string())
            .or_default()
            .push(PriorityChange {
                action,
                old,
                new,
                timestamp: now_millis(),
            });
        old
    }
}

/// Classifies event names and owns their priority assignments
#[derive(Default)]
pub struct EventPriorityManager {
    config: PriorityConfig,
    state: RwLock<PriorityState>,
}

impl EventPriorityManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PriorityConfig) -> Self {
        Self {
            config,
            state: RwLock::new(PriorityState::default()),
        }
    }

    pub fn config(&self) -> &PriorityConfig {
        &self.config
    }

    /// Band a name would be classified into, without assigning it
    pub fn classify(name: &str) -> PriorityBand {
        let upper = name.to_ascii_uppercase();
        let segments: Vec<&str> = upper.split('.').collect();
        let domain = segments.first().copied().unwrap_or_default();

        if FORCED_BACKGROUND_DOMAINS.contains(&domain) {
            return PriorityBand::BackgroundProcessing;
        }
        if URGENT_KEYWORDS.iter().any(|k| upper.contains(k)) {
            return PriorityBand::SystemCritical;
        }
        if let Some((_, band)) = DOMAIN_OVERRIDES.iter().find(|(d, _)| *d == domain) {
            return *band;
        }
        if segments.iter().any(|s| BACKGROUND_KEYWORDS.contains(s)) {
            return PriorityBand::BackgroundProcessing;
        }
        for (band, keywords) in BAND_KEYWORDS {
            if segments.iter().any(|s| keywords.contains(s)) {
                return *band;
            }
        }
        PriorityBand::BusinessProcessing
    }

    /// Assign (or return the cached) priority for `name`
    ///
    /// Fails open: `None` or a blank name logs a warning and yields
    /// `UNASSIGNED_PRIORITY` instead of an error.
    pub fn assign_event_priority<'a>(&self, name: impl Into<Option<&'a str>>) -> u32 {
        let name = match name.into() {
            Some(name) if !name.trim().is_empty() => name,
            other => {
                tracing::warn!(
                    input = ?other,
                    fallback = UNASSIGNED_PRIORITY,
                    "Invalid event name for priority assignment"
                );
                return UNASSIGNED_PRIORITY;
            }
        };

        if let Some(priority) = self.get_event_priority(name) {
            return priority;
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(priority) = state.priorities.get(name) {
            return *priority;
        }
        let band = Self::classify(name);
        let priority = band.midpoint();
        state.set(name, PriorityAction::Assigned, priority);

        tracing::debug!(event = %name, band = ?band, priority, "Priority assigned");
        priority
    }

    /// Manually override a name's priority
    pub fn adjust_event_priority(&self, name: &str, priority: u32) -> Result<()> {
        if priority >= PRIORITY_LIMIT {
            return Err(DispatchError::InvalidPriority(priority));
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old = state.set(name, PriorityAction::Adjusted, priority);

        tracing::info!(event = %name, old = ?old, new = priority, "Priority adjusted");
        Ok(())
    }

    pub fn get_event_priority(&self, name: &str) -> Option<u32> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.priorities.get(name).copied()
    }

    /// Full change history for a name (empty if never assigned)
    pub fn history(&self, name: &str) -> Vec<PriorityChange> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.history.get(name).cloned().unwrap_or_default()
    }

    /// Names whose history holds more than one distinct value, sorted by name
    pub fn detect_priority_conflicts(&self) -> Vec<PriorityConflict> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut conflicts: Vec<PriorityConflict> = state
            .history
            .iter()
            .filter_map(|(name, changes)| {
                let mut distinct: Vec<u32> = Vec::new();
                for change in changes {
                    if !distinct.contains(&change.new) {
                        distinct.push(change.new);
                    }
                }
                (distinct.len() > 1).then(|| PriorityConflict {
                    event_name: name.clone(),
                    priorities: distinct,
                })
            })
            .collect();
        conflicts.sort_by(|a, b| a.event_name.cmp(&b.event_name));
        conflicts
    }

    /// Collapse every history to its most recent entry (last write wins)
    ///
    /// Returns the number of histories that were collapsed.
    pub fn optimize_event_priorities(&self) -> usize {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let PriorityState {
            priorities,
            history,
            ..
        } = &mut *state;

        let mut collapsed = 0;
        for (name, changes) in history.iter_mut() {
            if changes.len() > 1 {
                changes.drain(..changes.len() - 1);
                collapsed += 1;
            }
            if let Some(last) = changes.last() {
                priorities.insert(name.clone(), last.new);
            }
        }

        if collapsed > 0 {
            tracing::info!(collapsed, "Priority histories collapsed");
        }
        collapsed
    }

    /// Feed one observed handling time for `name`
    pub fn record_execution_time(&self, name: &str, elapsed: Duration) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let timing = state.timings.entry(name.to_string()).or_default();
        timing.total += elapsed;
        timing.samples = timing.samples.saturating_add(1);
    }

    pub fn average_execution_time(&self, name: &str) -> Option<Duration> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.timings.get(name).and_then(Timing::average)
    }

    /// Demote every event whose average handling time exceeds the threshold
    ///
    /// Each pass adds `performance_step`, capped at `performance_cap`.
    pub fn optimize_based_on_performance(&self) -> Vec<PerformanceAdjustment> {
        let threshold = Duration::from_millis(self.config.slow_threshold_ms);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        let slow: Vec<(String, Duration)> = state
            .timings
            .iter()
            .filter_map(|(name, timing)| timing.average().map(|avg| (name.clone(), avg)))
            .filter(|(_, avg)| *avg > threshold)
            .collect();

        let mut adjustments = Vec::new();
        for (name, average) in slow {
            let current = match state.priorities.get(&name) {
                Some(p) => *p,
                None => Self::classify(&name).midpoint(),
            };
            if current >= self.config.performance_cap {
                continue;
            }
            let new = (current + self.config.performance_step).min(self.config.performance_cap);
            state.set(&name, PriorityAction::PerformanceAdjusted, new);

            tracing::info!(
                event = %name,
                old = current,
                new,
                average_ms = average.as_millis() as u64,
                "Slow event demoted"
            );
            adjustments.push(PerformanceAdjustment {
                event_name: name,
                old: current,
                new,
                average_ms: average.as_millis() as u64,
            });
        }
        adjustments.sort_by(|a, b| a.event_name.cmp(&b.event_name));
        adjustments
    }

    /// Number of assigned names per band
    pub fn band_distribution(&self) -> BTreeMap<PriorityBand, usize> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut distribution = BTreeMap::new();
        for priority in state.priorities.values() {
            if let Some(band) = PriorityBand::of(*priority) {
                *distribution.entry(band).or_insert(0) += 1;
            }
        }
        distribution
    }

    /// Assign a priority for `name` and subscribe `handler` at it
    pub fn register_with_priority(
        &self,
        bus: &EventBus,
        name: &str,
        handler: Handler,
    ) -> SubscriptionId {
        let priority = self.assign_event_priority(name);
        bus.on(name, handler, Some(priority))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_midpoints() {
        assert_eq!(PriorityBand::SystemCritical.midpoint(), 50);
        assert_eq!(PriorityBand::PlatformManagement.midpoint(), 150);
        assert_eq!(PriorityBand::UserInteraction.midpoint(), 250);
        assert_eq!(PriorityBand::BusinessProcessing.midpoint(), 350);
        assert_eq!(PriorityBand::BackgroundProcessing.midpoint(), 450);
        assert_eq!(PriorityBand::of(199), Some(PriorityBand::PlatformManagement));
        assert_eq!(PriorityBand::of(UNASSIGNED_PRIORITY), None);
    }

    #[test]
    fn test_assign_is_idempotent() {
        let mgr = EventPriorityManager::new();
        let first = mgr.assign_event_priority("EXTRACTION.READMOO.EXTRACT.COMPLETED");
        let second = mgr.assign_event_priority("EXTRACTION.READMOO.EXTRACT.COMPLETED");
        assert_eq!(first, second);
        assert_eq!(first, 350);
        assert_eq!(mgr.history("EXTRACTION.READMOO.EXTRACT.COMPLETED").len(), 1);
    }

    #[test]
    fn test_assign_fails_open() {
        let mgr = EventPriorityManager::new();
        assert_eq!(mgr.assign_event_priority(None), UNASSIGNED_PRIORITY);
        assert_eq!(mgr.assign_event_priority(""), UNASSIGNED_PRIORITY);
        assert_eq!(mgr.assign_event_priority("   "), UNASSIGNED_PRIORITY);
        assert!(mgr.get_event_priority("").is_none());
    }

    #[test]
    fn test_system_failure_is_critical() {
        let mgr = EventPriorityManager::new();
        let p = mgr.assign_event_priority("SYSTEM.UNIVERSAL.INIT.FAILED");
        assert!(PriorityBand::SystemCritical.range().contains(&p));
    }

    #[test]
    fn test_analytics_domain_overrides_keywords() {
        let mgr = EventPriorityManager::new();
        for name in [
            "ANALYTICS.READMOO.TRACK.COMPLETED",
            "ANALYTICS.UNIVERSAL.ERROR.CRITICAL",
            "ANALYTICS.UX.CLICK.COMPLETED",
        ] {
            let p = mgr.assign_event_priority(name);
            assert!((400..=499).contains(&p), "{} got {}", name, p);
        }
    }

    #[test]
    fn test_classification_order() {
        use PriorityBand::*;
        assert_eq!(EventPriorityManager::classify("DATA.READMOO.SAVE.ERROR"), SystemCritical);
        assert_eq!(EventPriorityManager::classify("SECURITY.UNIVERSAL.VALIDATE.COMPLETED"), SystemCritical);
        assert_eq!(EventPriorityManager::classify("PLATFORM.KOBO.SYNC.STARTED"), PlatformManagement);
        assert_eq!(EventPriorityManager::classify("UX.UNIVERSAL.RENDER.COMPLETED"), UserInteraction);
        assert_eq!(EventPriorityManager::classify("DATA.READMOO.SYNC.PROGRESS"), BackgroundProcessing);
        assert_eq!(EventPriorityManager::classify("PAGE.READMOO.DETECT.DETECTED"), PlatformManagement);
        assert_eq!(EventPriorityManager::classify("MESSAGING.UNIVERSAL.CLICK.REQUESTED"), UserInteraction);
        assert_eq!(EventPriorityManager::classify("EXTRACTION.READMOO.EXTRACT.STARTED"), BusinessProcessing);
        assert_eq!(EventPriorityManager::classify("SOMETHING.ELSE"), BusinessProcessing);
        assert_eq!(EventPriorityManager::classify("extraction.extract.completed"), BusinessProcessing);
    }

    #[test]
    fn test_adjust_validates_range() {
        let mgr = EventPriorityManager::new();
        let err = mgr.adjust_event_priority("DATA.KOBO.SAVE.COMPLETED", 500).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidPriority(500)));

        mgr.adjust_event_priority("DATA.KOBO.SAVE.COMPLETED", 10).unwrap();
        assert_eq!(mgr.get_event_priority("DATA.KOBO.SAVE.COMPLETED"), Some(10));
        let history = mgr.history("DATA.KOBO.SAVE.COMPLETED");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].old, None);
        assert_eq!(history[0].action, PriorityAction::Adjusted);
    }

    #[test]
    fn test_conflicts_and_optimization() {
        let mgr = EventPriorityManager::new();
        let name = "EXTRACTION.KINDLE.EXTRACT.PROGRESS";
        mgr.assign_event_priority(name);
        mgr.adjust_event_priority(name, 120).unwrap();
        mgr.assign_event_priority("DATA.KOBO.LOAD.READY");

        let conflicts = mgr.detect_priority_conflicts();
        assert_eq!(
            conflicts,
            vec![PriorityConflict {
                event_name: name.to_string(),
                priorities: vec![350, 120],
            }]
        );

        assert_eq!(mgr.optimize_event_priorities(), 1);
        assert!(mgr.detect_priority_conflicts().is_empty());
        assert_eq!(mgr.get_event_priority(name), Some(120));
        assert_eq!(mgr.history(name).len(), 1);
    }

    #[test]
    fn test_performance_demotion_is_capped() {
        let mgr = EventPriorityManager::new();
        let slow = "EXTRACTION.READMOO.EXTRACT.COMPLETED";
        let fast = "UX.UNIVERSAL.CLICK.COMPLETED";
        mgr.assign_event_priority(slow);
        mgr.assign_event_priority(fast);

        mgr.record_execution_time(slow, Duration::from_millis(400));
        mgr.record_execution_time(slow, Duration::from_millis(500));
        mgr.record_execution_time(fast, Duration::from_millis(10));
        assert_eq!(mgr.average_execution_time(slow), Some(Duration::from_millis(450)));

        let adjustments = mgr.optimize_based_on_performance();
        assert_eq!(adjustments.len(), 1);
        assert_eq!(adjustments[0].old, 350);
        assert_eq!(adjustments[0].new, 400);
        assert_eq!(mgr.get_event_priority(fast), Some(250));

        mgr.optimize_based_on_performance();
        assert_eq!(mgr.get_event_priority(slow), Some(450));
        assert!(mgr.optimize_based_on_performance().is_empty());
        assert_eq!(mgr.get_event_priority(slow), Some(450));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mgr = EventPriorityManager::new();
        mgr.record_execution_time("DATA.KOBO.SAVE.COMPLETED", Duration::from_millis(300));
        assert!(mgr.optimize_based_on_performance().is_empty());
    }

    #[test]
    fn test_band_distribution() {
        let mgr = EventPriorityManager::new();
        mgr.assign_event_priority("SYSTEM.UNIVERSAL.INIT.READY");
        mgr.assign_event_priority("ANALYTICS.KOBO.TRACK.STARTED");
        mgr.assign_event_priority("ANALYTICS.KINDLE.TRACK.STARTED");

        let dist = mgr.band_distribution();
        assert_eq!(dist[&PriorityBand::SystemCritical], 1);
        assert_eq!(dist[&PriorityBand::BackgroundProcessing], 2);
        assert!(!dist.contains_key(&PriorityBand::UserInteraction));
    }
}
