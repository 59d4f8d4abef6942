use std::{
    collections::VecDeque,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::model::TimelineState;

pub const DEFAULT_MAX_HISTORY: usize = 50;

pub type Snapshot = Arc<TimelineState>;

type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryStats {
    pub undo_count: usize,
    pub redo_count: usize,
    pub max_depth: usize,
}

pub struct HistoryEngine {
    past: VecDeque<Snapshot>,
    present: Option<Snapshot>,
    future: VecDeque<Snapshot>,
    max_depth: usize,
    listeners: Arc<Mutex<ListenerRegistry>>,
}

impl Default for HistoryEngine {
    fn default() -> Self {
        Self::with_max_depth(DEFAULT_MAX_HISTORY)
    }
}

impl std::fmt::Debug for HistoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryEngine")
            .field("past", &self.past.len())
            .field("has_present", &self.present.is_some())
            .field("future", &self.future.len())
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

impl HistoryEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            past: VecDeque::new(),
            present: None,
            future: VecDeque::new(),
            max_depth: max_depth.max(1),
            listeners: Arc::new(Mutex::new(ListenerRegistry::default())),
        }
    }

    #[must_use]
    pub fn present(&self) -> Option<&Snapshot> {
        self.present.as_ref()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            undo_count: self.past.len(),
            redo_count: self.future.len(),
            max_depth: self.max_depth,
        }
    }

    pub fn push(&mut self, snapshot: impl Into<Snapshot>) -> bool {
        let snapshot = snapshot.into();
        if self
            .present
            .as_ref()
            .is_some_and(|present| **present == *snapshot)
        {
            debug!("history push ignored: snapshot identical to present");
            return false;
        }

        if let Some(previous) = self.present.replace(snapshot) {
            self.past.push_back(previous);
        }
        while self.past.len() > self.max_depth {
            self.past.pop_front();
        }
        self.future.clear();

        trace!(undo_count = self.past.len(), "history pushed");
        self.notify();
        true
    }

    pub fn undo(&mut self) -> Option<Snapshot> {
        let previous = self.past.pop_back()?;
        if let Some(current) = self.present.replace(Arc::clone(&previous)) {
            self.future.push_front(current);
        }

        debug!(
            undo_count = self.past.len(),
            redo_count = self.future.len(),
            "history undo"
        );
        self.notify();
        Some(previous)
    }

    pub fn redo(&mut self) -> Option<Snapshot> {
        let next = self.future.pop_front()?;
        if let Some(current) = self.present.replace(Arc::clone(&next)) {
            self.past.push_back(current);
        }
        while self.past.len() > self.max_depth {
            self.past.pop_front();
        }

        debug!(
            undo_count = self.past.len(),
            redo_count = self.future.len(),
            "history redo"
        );
        self.notify();
        Some(next)
    }

    pub fn clear(&mut self) {
        self.past.clear();
        self.present = None;
        self.future.clear();
        debug!("history cleared");
        self.notify();
    }

    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        let mut registry = self.listeners.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(listener)));

        Subscription {
            registry: Arc::downgrade(&self.listeners),
            id,
        }
    }

    fn notify(&self) {
        // Listeners run outside the lock so they may (un)subscribe re-entrantly.
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener();
        }
    }
}

pub struct Subscription {
    registry: Weak<Mutex<ListenerRegistry>>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }

    pub fn detach(mut self) {
        self.registry = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .listeners
                .retain(|(id, _)| *id != self.id);
        }
    }
}
