//! Per-pod single-flight guard.
//!
//! Nothing in the event stream serializes repeated failure events for one
//! pod, so two Modified events in quick succession could race through
//! patch/replace concurrently. The supervisor takes a guard keyed by pod
//! identity before dispatching; a second event for the same pod while a
//! remediation is in flight is skipped. The slot is released when the
//! guard drops, whether the task succeeded or failed.

use crate::pods::PodIdentity;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Set of pod identities with a remediation currently in flight.
#[derive(Debug, Clone, Default)]
pub struct InflightSet {
    inner: Arc<Mutex<HashSet<PodIdentity>>>,
}

impl InflightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `identity`; `None` when a remediation for the
    /// same pod is already running.
    pub fn try_begin(&self, identity: PodIdentity) -> Option<InflightGuard> {
        let mut set = self.inner.lock().expect("inflight set lock poisoned");
        if set.insert(identity.clone()) {
            Some(InflightGuard {
                set: Arc::clone(&self.inner),
                identity,
            })
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("inflight set lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// RAII guard releasing the pod's slot on drop.
#[derive(Debug)]
pub struct InflightGuard {
    set: Arc<Mutex<HashSet<PodIdentity>>>,
    identity: PodIdentity,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.identity);
        }
    }
}
