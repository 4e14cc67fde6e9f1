use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use evl_types::{ClusterEvent, NamespacedName};

use crate::error::FetchError;

/// Read boundary into the orchestrator's object store.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch the current snapshot of the named event.
    async fn get(&self, name: &NamespacedName) -> Result<ClusterEvent, FetchError>;
}

struct ScriptedFailure {
    error: FetchError,
    remaining: Option<usize>,
}

/// Event store held in memory, keyed by namespaced name.
///
/// Backs the file-driven CLI mode and test suites. Failures can be scripted
/// to exercise the retry path.
#[derive(Default)]
pub struct InMemoryEventSource {
    events: RwLock<HashMap<NamespacedName, ClusterEvent>>,
    failure: Mutex<Option<ScriptedFailure>>,
    gets: AtomicUsize,
}

impl InMemoryEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from snapshots. Later duplicates replace earlier ones.
    pub fn from_events(events: impl IntoIterator<Item = ClusterEvent>) -> Self {
        let source = Self::new();
        for event in events {
            source.insert(event);
        }
        source
    }

    /// Insert or replace the snapshot stored under the event's own name.
    pub fn insert(&self, event: ClusterEvent) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event.namespaced_name(), event);
    }

    pub fn remove(&self, name: &NamespacedName) -> Option<ClusterEvent> {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Stored names in ascending order.
    pub fn names(&self) -> Vec<NamespacedName> {
        let mut names: Vec<_> = self
            .events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Fail every following get with `error`.
    pub fn fail_with(&self, error: FetchError) {
        self.script(Some(ScriptedFailure {
            error,
            remaining: None,
        }));
    }

    /// Fail the next `times` gets with `error`, then serve normally.
    pub fn fail_next(&self, error: FetchError, times: usize) {
        self.script(Some(ScriptedFailure {
            error,
            remaining: Some(times),
        }));
    }

    pub fn recover(&self) {
        self.script(None);
    }

    /// Total get calls, including failed ones.
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    fn script(&self, failure: Option<ScriptedFailure>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = failure;
    }

    fn take_failure(&self) -> Option<FetchError> {
        let mut slot = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(slot.as_ref().and_then(|s| s.remaining), Some(0)) {
            *slot = None;
        }
        let scripted = slot.as_mut()?;
        if let Some(remaining) = scripted.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(scripted.error.clone())
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    async fn get(&self, name: &NamespacedName) -> Result<ClusterEvent, FetchError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(name.to_string()))
    }
}
