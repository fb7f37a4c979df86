//! Priority-ordered in-process event bus
//!
//! `EventBus` keeps one subscriber list per event name, sorted by ascending
//! priority with ties broken by registration order. `emit` runs every sync
//! handler inline in that order and spawns detached handlers on the ambient
//! tokio runtime without awaiting them. A failing or panicking handler is
//! logged and counted; it never stops the handlers after it.

use crate::error::Result;
use crate::priority::EventPriorityManager;
use crate::types::{now_millis, Event};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

type SyncFn = dyn Fn(&Event) -> Result<()> + Send + Sync;
type DetachedFn = dyn Fn(Event) -> BoxFuture<'static, Result<()>> + Send + Sync;

/// A subscriber callback
///
/// The kind is fixed at registration: `Sync` handlers complete before `emit`
/// returns, `Detached` handlers are spawned and their completion is invisible
/// to the emitter (failures are still logged and counted).
#[derive(Clone)]
pub enum Handler {
    Sync(Arc<SyncFn>),
    Detached(Arc<DetachedFn>),
}

impl Handler {
    /// Handler run inline during `emit`
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
    {
        Handler::Sync(Arc::new(f))
    }

    /// Handler spawned as a tokio task during `emit`
    pub fn detached<F, Fut>(f: F) -> Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Handler::Detached(Arc::new(move |event| f(event).boxed()))
    }

    pub fn is_detached(&self) -> bool {
        matches!(self, Handler::Detached(_))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Sync(_) => f.write_str("Handler::Sync"),
            Handler::Detached(_) => f.write_str("Handler::Detached"),
        }
    }
}

/// Handle returned by `on`/`once`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    priority: u32,
    once: bool,
    fired: AtomicBool,
    handler: Handler,
}

/// Bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusConfig {
    /// Registering past this many listeners for one name logs a warning
    pub max_listeners_per_event: usize,
    /// Sync handlers slower than this log a warning
    pub slow_handler_threshold_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_listeners_per_event: 100,
            slow_handler_threshold_ms: 300,
        }
    }
}

/// Outcome of a single `emit`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitReport {
    pub event_id: String,
    pub name: String,
    pub priority: u32,
    /// Handlers invoked (sync and detached)
    pub invoked: usize,
    /// Sync handlers that failed, plus detached handlers that could not be spawned
    pub failed: usize,
    /// Detached handlers spawned
    pub detached: usize,
    /// Time spent dispatching, excluding detached task completion
    pub duration: Duration,
}

impl EmitReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Per-name statistics
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStats {
    pub listener_count: usize,
    pub emit_count: u64,
    pub handler_invocations: u64,
    pub error_count: u64,
    pub total_execution_time: Duration,
    pub average_execution_time: Duration,
    pub max_execution_time: Duration,
    /// Unix milliseconds of the last emit or registration
    pub last_activity: Option<u64>,
}

/// Aggregate bus statistics
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusStats {
    pub total_events: u64,
    pub total_listeners: usize,
    pub registered_events: usize,
    pub total_errors: u64,
    pub detached_spawned: u64,
    pub total_execution_time: Duration,
    pub average_execution_time: Duration,
    pub last_activity: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct EventCounters {
    emit_count: u64,
    invocations: u64,
    errors: u64,
    total_time: Duration,
    max_time: Duration,
    last_activity: Option<u64>,
}

#[derive(Default)]
struct StatsState {
    /// Bumped by `destroy`; detached tasks from an older generation are not counted
    generation: u64,
    total_events: u64,
    total_errors: u64,
    detached_spawned: u64,
    total_time: Duration,
    last_activity: Option<u64>,
    per_event: HashMap<String, EventCounters>,
}

impl StatsState {
    fn touch(&mut self, name: &str) -> &mut EventCounters {
        let now = now_millis();
        self.last_activity = Some(now);
        let counters = self.per_event.entry(name.to_string()).or_default();
        counters.last_activity = Some(now);
        counters
    }
}

/// In-process publish/subscribe bus with priority-ordered dispatch
pub struct EventBus {
    config: BusConfig,
    priorities: Arc<EventPriorityManager>,

    /// Subscribers per name, kept sorted by (priority, registration order)
    listeners: RwLock<HashMap<String, Vec<Arc<Subscription>>>>,

    /// Shared with detached tasks so they can count their own failures
    stats: Arc<Mutex<StatsState>>,

    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with its own priority manager
    pub fn new() -> Self {
        Self::with_config(BusConfig::default(), Arc::new(EventPriorityManager::new()))
    }

    /// Create a bus that resolves priorities through a shared manager
    pub fn with_priority_manager(priorities: Arc<EventPriorityManager>) -> Self {
        Self::with_config(BusConfig::default(), priorities)
    }

    pub fn with_config(config: BusConfig, priorities: Arc<EventPriorityManager>) -> Self {
        Self {
            config,
            priorities,
            listeners: RwLock::new(HashMap::new()),
            stats: Arc::new(Mutex::new(StatsState::default())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn priority_manager(&self) -> &Arc<EventPriorityManager> {
        &self.priorities
    }

    /// Subscribe persistently; `None` resolves the priority from the manager
    pub fn on(&self, name: &str, handler: Handler, priority: Option<u32>) -> SubscriptionId {
        self.subscribe(name, handler, priority, false)
    }

    /// Subscribe for a single invocation
    pub fn once(&self, name: &str, handler: Handler, priority: Option<u32>) -> SubscriptionId {
        self.subscribe(name, handler, priority, true)
    }

    fn subscribe(
        &self,
        name: &str,
        handler: Handler,
        priority: Option<u32>,
        once: bool,
    ) -> SubscriptionId {
        let priority = priority.unwrap_or_else(|| self.priorities.assign_event_priority(name));
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let detached = handler.is_detached();
        let subscription = Arc::new(Subscription {
            id,
            priority,
            once,
            fired: AtomicBool::new(false),
            handler,
        });

        let count = {
            let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
            let list = listeners.entry(name.to_string()).or_default();
            // Ids grow monotonically, so inserting after every equal priority
            // preserves registration order within a priority.
            let idx = list.partition_point(|s| s.priority <= priority);
            list.insert(idx, subscription);
            list.len()
        };

        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .touch(name);

        if count > self.config.max_listeners_per_event {
            tracing::warn!(
                event = %name,
                listeners = count,
                limit = self.config.max_listeners_per_event,
                "Listener limit exceeded"
            );
        }

        tracing::debug!(
            event = %name,
            subscription = id.0,
            priority,
            once,
            detached,
            "Handler registered"
        );
        id
    }

    /// Remove a subscription; returns false if it was not registered
    pub fn off(&self, name: &str, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = listeners.get_mut(name) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(name);
        }
        if removed {
            tracing::debug!(event = %name, subscription = id.0, "Handler removed");
        }
        removed
    }

    /// Dispatch `data` to every subscriber of `name`
    ///
    /// Emitting a name with no subscribers is a valid no-op that still
    /// counts toward the total-event statistic.
    pub fn emit(&self, name: &str, data: serde_json::Value, priority: Option<u32>) -> EmitReport {
        let priority = priority.unwrap_or_else(|| self.priorities.assign_event_priority(name));
        let event = Event::new(name, data, priority);

        let snapshot: Vec<Arc<Subscription>> = {
            let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
            listeners.get(name).cloned().unwrap_or_default()
        };

        let started = Instant::now();
        let slow = Duration::from_millis(self.config.slow_handler_threshold_ms);
        let mut invoked = 0;
        let mut failed = 0;
        let mut detached = 0;
        let mut sync_invoked = 0;
        let mut consumed = Vec::new();

        for sub in &snapshot {
            if sub.once {
                if sub.fired.swap(true, Ordering::AcqRel) {
                    continue;
                }
                consumed.push(sub.id);
            }
            invoked += 1;

            match &sub.handler {
                Handler::Sync(f) => {
                    sync_invoked += 1;
                    let handler_started = Instant::now();
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&event)));
                    let elapsed = handler_started.elapsed();

                    match outcome {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            failed += 1;
                            tracing::warn!(
                                event = %name,
                                subscription = sub.id.0,
                                error = %e,
                                "Handler failed"
                            );
                        }
                        Err(payload) => {
                            failed += 1;
                            tracing::warn!(
                                event = %name,
                                subscription = sub.id.0,
                                panic = %panic_message(&payload),
                                "Handler panicked"
                            );
                        }
                    }

                    if elapsed > slow {
                        tracing::warn!(
                            event = %name,
                            subscription = sub.id.0,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Slow handler"
                        );
                    }
                }
                Handler::Detached(f) => {
                    if self.spawn_detached(f, &event, sub.id) {
                        detached += 1;
                    } else {
                        failed += 1;
                    }
                }
            }
        }

        if !consumed.is_empty() {
            let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(list) = listeners.get_mut(name) {
                list.retain(|s| !consumed.contains(&s.id));
                if list.is_empty() {
                    listeners.remove(name);
                }
            }
        }

        let duration = started.elapsed();
        {
            let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            stats.total_events += 1;
            stats.total_errors += failed as u64;
            stats.detached_spawned += detached as u64;
            stats.total_time += duration;
            let counters = stats.touch(name);
            counters.emit_count += 1;
            counters.invocations += invoked as u64;
            counters.errors += failed as u64;
            counters.total_time += duration;
            counters.max_time = counters.max_time.max(duration);
        }

        if sync_invoked > 0 {
            self.priorities.record_execution_time(name, duration);
        }

        tracing::debug!(
            event = %name,
            event_id = %event.id,
            priority,
            invoked,
            failed,
            detached,
            elapsed_us = duration.as_micros() as u64,
            "Event dispatched"
        );

        EmitReport {
            event_id: event.id,
            name: name.to_string(),
            priority,
            invoked,
            failed,
            detached,
            duration,
        }
    }

    /// Spawn a detached handler; false when no runtime is available or the
    /// handler panicked while building its future
    fn spawn_detached(&self, f: &Arc<DetachedFn>, event: &Event, id: SubscriptionId) -> bool {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!(
                    event = %event.name,
                    subscription = id.0,
                    error = %e,
                    "No tokio runtime for detached handler"
                );
                return false;
            }
        };

        let future = match panic::catch_unwind(AssertUnwindSafe(|| f(event.clone()))) {
            Ok(future) => future,
            Err(payload) => {
                tracing::warn!(
                    event = %event.name,
                    subscription = id.0,
                    panic = %panic_message(&payload),
                    "Detached handler panicked"
                );
                return false;
            }
        };

        let stats = Arc::clone(&self.stats);
        let generation = stats.lock().unwrap_or_else(PoisonError::into_inner).generation;
        let name = event.name.clone();
        runtime.spawn(async move {
            if let Err(e) = future.await {
                tracing::warn!(
                    event = %name,
                    subscription = id.0,
                    error = %e,
                    "Detached handler failed"
                );
                let mut stats = stats.lock().unwrap_or_else(PoisonError::into_inner);
                if stats.generation == generation {
                    stats.total_errors += 1;
                    stats.per_event.entry(name).or_default().errors += 1;
                }
            }
        });
        true
    }

    pub fn listener_count(&self, name: &str) -> usize {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        listeners.get(name).map_or(0, Vec::len)
    }

    pub fn has_listeners(&self, name: &str) -> bool {
        self.listener_count(name) > 0
    }

    /// Names with at least one subscriber, sorted
    pub fn event_names(&self) -> Vec<String> {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = listeners.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get_stats(&self) -> BusStats {
        let (total_listeners, registered_events) = {
            let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
            (listeners.values().map(Vec::len).sum(), listeners.len())
        };
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        BusStats {
            total_events: stats.total_events,
            total_listeners,
            registered_events,
            total_errors: stats.total_errors,
            detached_spawned: stats.detached_spawned,
            total_execution_time: stats.total_time,
            average_execution_time: average(stats.total_time, stats.total_events),
            last_activity: stats.last_activity,
        }
    }

    /// Statistics for one name; `None` if it was never registered or emitted
    pub fn get_event_stats(&self, name: &str) -> Option<EventStats> {
        let listener_count = self.listener_count(name);
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let counters = stats.per_event.get(name).copied();
        if counters.is_none() && listener_count == 0 {
            return None;
        }
        let c = counters.unwrap_or_default();
        Some(EventStats {
            listener_count,
            emit_count: c.emit_count,
            handler_invocations: c.invocations,
            error_count: c.errors,
            total_execution_time: c.total_time,
            average_execution_time: average(c.total_time, c.emit_count),
            max_execution_time: c.max_time,
            last_activity: c.last_activity,
        })
    }

    /// Drop every subscription and zero all statistics
    pub fn destroy(&self) {
        let removed: usize = {
            let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
            let n = listeners.values().map(Vec::len).sum();
            listeners.clear();
            n
        };
        {
            let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            let generation = stats.generation.wrapping_add(1);
            *stats = StatsState {
                generation,
                ..StatsState::default()
            };
        }
        tracing::info!(removed, "Event bus destroyed");
    }
}

fn average(total: Duration, count: u64) -> Duration {
    match u32::try_from(count) {
        Ok(0) => Duration::ZERO,
        Ok(n) => total / n,
        Err(_) => Duration::from_secs_f64(total.as_secs_f64() / count as f64),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;
    use std::sync::atomic::AtomicUsize;

    const NAME: &str = "EXTRACTION.READMOO.EXTRACT.COMPLETED";

    fn recorder(log: &Arc<Mutex<Vec<u32>>>, tag: u32) -> Handler {
        let log = Arc::clone(log);
        Handler::sync(move |_| {
            log.lock().unwrap().push(tag);
            Ok(())
        })
    }

    #[test]
    fn test_dispatch_in_ascending_priority() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.on(NAME, recorder(&log, 300), Some(300));
        bus.on(NAME, recorder(&log, 100), Some(100));
        bus.on(NAME, recorder(&log, 200), Some(200));

        let report = bus.emit(NAME, serde_json::json!({}), None);
        assert_eq!(report.invoked, 3);
        assert_eq!(*log.lock().unwrap(), vec![100, 200, 300]);
    }

    #[test]
    fn test_ties_keep_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.on(NAME, recorder(&log, 1), Some(200));
        bus.on(NAME, recorder(&log, 2), Some(200));
        bus.on(NAME, recorder(&log, 0), Some(10));
        bus.on(NAME, recorder(&log, 3), Some(200));

        bus.emit(NAME, serde_json::json!(null), None);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_failing_handler_is_isolated() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.on(NAME, recorder(&log, 1), Some(1));
        bus.on(
            NAME,
            Handler::sync(|_| Err(DispatchError::handler("boom"))),
            Some(2),
        );
        bus.on(NAME, recorder(&log, 3), Some(3));

        let before = bus.get_stats().total_errors;
        let report = bus.emit(NAME, serde_json::json!({}), None);

        assert_eq!(report.failed, 1);
        assert!(!report.is_clean());
        assert_eq!(*log.lock().unwrap(), vec![1, 3]);
        assert_eq!(bus.get_stats().total_errors, before + 1);
        assert_eq!(bus.get_event_stats(NAME).unwrap().error_count, 1);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.on(NAME, Handler::sync(|_| panic!("handler exploded")), Some(1));
        bus.on(NAME, recorder(&log, 2), Some(2));

        let report = bus.emit(NAME, serde_json::json!({}), None);
        assert_eq!(report.failed, 1);
        assert_eq!(*log.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_once_fires_at_most_once() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        bus.once(
            NAME,
            Handler::sync(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            None,
        );

        assert_eq!(bus.listener_count(NAME), 1);
        bus.emit(NAME, serde_json::json!({}), None);
        bus.emit(NAME, serde_json::json!({}), None);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(NAME), 0);
    }

    #[test]
    fn test_off_removes_only_target() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = bus.on(NAME, recorder(&log, 1), None);
        bus.on(NAME, recorder(&log, 2), None);

        assert!(bus.off(NAME, a));
        assert!(!bus.off(NAME, a));
        assert!(!bus.off("UX.UNIVERSAL.CLICK.COMPLETED", a));

        bus.emit(NAME, serde_json::json!({}), None);
        assert_eq!(*log.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_emit_without_subscribers_is_noop() {
        let bus = EventBus::new();
        let before = bus.get_stats().total_events;
        let report = bus.emit("DATA.KOBO.SAVE.COMPLETED", serde_json::json!({}), None);
        assert_eq!(report.invoked, 0);
        assert!(report.is_clean());
        assert_eq!(bus.get_stats().total_events, before + 1);
    }

    #[test]
    fn test_priority_resolved_from_manager() {
        let bus = EventBus::new();
        bus.on("SYSTEM.UNIVERSAL.INIT.FAILED", Handler::sync(|_| Ok(())), None);
        assert_eq!(
            bus.priority_manager().get_event_priority("SYSTEM.UNIVERSAL.INIT.FAILED"),
            Some(50)
        );

        let report = bus.emit("SYSTEM.UNIVERSAL.INIT.FAILED", serde_json::json!({}), None);
        assert_eq!(report.priority, 50);
        let report = bus.emit("SYSTEM.UNIVERSAL.INIT.FAILED", serde_json::json!({}), Some(7));
        assert_eq!(report.priority, 7);
    }

    #[test]
    fn test_handler_receives_payload() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(None));
        let s = Arc::clone(&seen);
        bus.on(
            NAME,
            Handler::sync(move |event| {
                *s.lock().unwrap() = Some(event.payload.clone());
                Ok(())
            }),
            None,
        );
        bus.emit(NAME, serde_json::json!({"books": 3}), None);
        assert_eq!(seen.lock().unwrap().as_ref().unwrap()["books"], 3);
    }

    #[test]
    fn test_reentrant_subscribe_during_emit() {
        let bus = Arc::new(EventBus::new());
        let inner = Arc::clone(&bus);
        bus.on(
            NAME,
            Handler::sync(move |_| {
                inner.on("UX.UNIVERSAL.RENDER.COMPLETED", Handler::sync(|_| Ok(())), None);
                inner.emit("UX.UNIVERSAL.RENDER.COMPLETED", serde_json::json!({}), None);
                Ok(())
            }),
            None,
        );

        let report = bus.emit(NAME, serde_json::json!({}), None);
        assert!(report.is_clean());
        assert_eq!(bus.listener_count("UX.UNIVERSAL.RENDER.COMPLETED"), 1);
        assert_eq!(bus.get_stats().total_events, 2);
    }

    #[test]
    fn test_stats_and_destroy() {
        let bus = EventBus::new();
        bus.on(NAME, Handler::sync(|_| Ok(())), None);
        bus.on(NAME, Handler::sync(|_| Ok(())), None);
        bus.on("DATA.KOBO.SAVE.COMPLETED", Handler::sync(|_| Ok(())), None);
        bus.emit(NAME, serde_json::json!({}), None);
        bus.emit(NAME, serde_json::json!({}), None);

        let stats = bus.get_stats();
        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.total_listeners, 3);
        assert_eq!(stats.registered_events, 2);
        assert!(stats.last_activity.is_some());

        let per = bus.get_event_stats(NAME).unwrap();
        assert_eq!(per.listener_count, 2);
        assert_eq!(per.emit_count, 2);
        assert_eq!(per.handler_invocations, 4);
        assert!(per.max_execution_time >= per.average_execution_time);
        assert!(bus.get_event_stats("UX.UNIVERSAL.CLICK.COMPLETED").is_none());

        bus.destroy();
        let stats = bus.get_stats();
        assert_eq!(stats.total_events, 0);
        assert_eq!(stats.total_listeners, 0);
        assert!(bus.event_names().is_empty());
        assert!(bus.get_event_stats(NAME).is_none());
    }

    #[test]
    fn test_detached_without_runtime_counts_as_failure() {
        let bus = EventBus::new();
        bus.on(NAME, Handler::detached(|_| async { Ok(()) }), None);
        let report = bus.emit(NAME, serde_json::json!({}), None);
        assert_eq!(report.invoked, 1);
        assert_eq!(report.detached, 0);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_detached_handler_is_spawned() {
        let bus = EventBus::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        bus.on(
            NAME,
            Handler::detached(move |event| {
                let tx = tx.clone();
                async move {
                    tokio::task::yield_now().await;
                    tx.send(event.payload["n"].as_i64()).ok();
                    Ok(())
                }
            }),
            None,
        );

        let report = bus.emit(NAME, serde_json::json!({"n": 5}), None);
        assert_eq!(report.detached, 1);
        assert!(report.is_clean());

        let got = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert_eq!(got, Some(Some(5)));
    }

    #[tokio::test]
    async fn test_detached_failure_is_counted() {
        let bus = EventBus::new();
        bus.on(
            NAME,
            Handler::detached(|_| async { Err(DispatchError::handler("late failure")) }),
            None,
        );

        let report = bus.emit(NAME, serde_json::json!({}), None);
        assert!(report.is_clean());

        for _ in 0..50 {
            if bus.get_stats().total_errors == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(bus.get_stats().total_errors, 1);
    }

    #[tokio::test]
    async fn test_detached_failure_after_destroy_is_not_counted() {
        let bus = EventBus::new();
        let gate = Arc::new(tokio::sync::Notify::new());
        let done = Arc::new(AtomicBool::new(false));
        let (g, d) = (Arc::clone(&gate), Arc::clone(&done));
        bus.on(
            NAME,
            Handler::detached(move |_| {
                let (g, d) = (Arc::clone(&g), Arc::clone(&d));
                async move {
                    g.notified().await;
                    d.store(true, Ordering::SeqCst);
                    Err(DispatchError::handler("finished after destroy"))
                }
            }),
            None,
        );

        bus.emit(NAME, serde_json::json!({}), None);
        bus.destroy();
        gate.notify_one();

        for _ in 0..50 {
            if done.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(done.load(Ordering::SeqCst));
        tokio::task::yield_now().await;

        assert_eq!(bus.get_stats().total_errors, 0);
        assert!(bus.get_event_stats(NAME).is_none());
    }

    #[test]
    fn test_emit_feeds_execution_time() {
        let bus = EventBus::new();
        bus.on(NAME, Handler::sync(|_| Ok(())), None);
        bus.emit(NAME, serde_json::json!({}), None);
        assert!(bus.priority_manager().average_execution_time(NAME).is_some());
        assert!(bus
            .priority_manager()
            .average_execution_time("DATA.KOBO.SAVE.COMPLETED")
            .is_none());
    }
}
