use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::model::{LocalId, SyncStatus};

/// Per-photo sync state. Lives for the process only; anything without an
/// entry reads as [`SyncStatus::NotSynced`].
pub trait StatusStore: Send + Sync {
    fn get(&self, id: LocalId) -> SyncStatus;
    fn set(&self, id: LocalId, status: SyncStatus);
    fn clear(&self, id: LocalId);
}

#[derive(Debug, Default)]
pub struct StatusTracker {
    states: Mutex<HashMap<LocalId, SyncStatus>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StatusStore for StatusTracker {
    fn get(&self, id: LocalId) -> SyncStatus {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .copied()
            .unwrap_or_default()
    }

    fn set(&self, id: LocalId, status: SyncStatus) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, status);
    }

    fn clear(&self, id: LocalId) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub processed: usize,
    pub total: usize,
    pub is_running: bool,
}

/// Counters for the bulk sweep, readable from any thread while it runs.
#[derive(Debug, Default)]
pub struct SyncProgress {
    processed: AtomicUsize,
    total: AtomicUsize,
    running: AtomicBool,
}

impl SyncProgress {
    /// Claims the progress slot; false when a sweep is already running.
    pub(crate) fn try_start(&self) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.processed.store(0, Ordering::SeqCst);
        self.total.store(0, Ordering::SeqCst);
        true
    }

    pub(crate) fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
    }

    pub(crate) fn advance(&self) {
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            processed: self.processed.load(Ordering::SeqCst),
            total: self.total.load(Ordering::SeqCst),
            is_running: self.running.load(Ordering::SeqCst),
        }
    }
}
