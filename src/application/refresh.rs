// Refresh registry - cancels superseded refresh cycles
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::AbortHandle;

#[derive(Default)]
struct Entry {
    generation: u64,
    handles: Vec<AbortHandle>,
}

/// In-flight fetches per viewer and panel.
///
/// Starting a cycle for a key aborts whatever the previous cycle for that key
/// still has running.
#[derive(Clone, Default)]
pub struct RefreshRegistry {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    next_generation: Arc<Mutex<u64>>,
}

/// Token for one refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshCycle {
    pub key: String,
    pub generation: u64,
}

impl RefreshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, key: &str) -> RefreshCycle {
        let generation = {
            let mut next = lock(&self.next_generation);
            *next += 1;
            *next
        };
        let previous = lock(&self.entries).insert(
            key.to_string(),
            Entry {
                generation,
                handles: Vec::new(),
            },
        );
        if let Some(previous) = previous {
            if !previous.handles.is_empty() {
                tracing::debug!(
                    "Cancelling {} in-flight fetches for {}",
                    previous.handles.len(),
                    key
                );
            }
            for handle in previous.handles {
                handle.abort();
            }
        }
        RefreshCycle {
            key: key.to_string(),
            generation,
        }
    }

    /// Registers a fetch of `cycle`. Aborts it at once if the cycle is already superseded.
    pub fn track(&self, cycle: &RefreshCycle, handle: AbortHandle) {
        let mut entries = lock(&self.entries);
        match entries.get_mut(&cycle.key) {
            Some(entry) if entry.generation == cycle.generation => entry.handles.push(handle),
            _ => handle.abort(),
        }
    }

    pub fn is_current(&self, cycle: &RefreshCycle) -> bool {
        lock(&self.entries)
            .get(&cycle.key)
            .is_some_and(|entry| entry.generation == cycle.generation)
    }

    /// Finishes `cycle` when the returned guard drops, including when the
    /// refreshing future is dropped before completing.
    pub fn finish_on_drop(&self, cycle: &RefreshCycle) -> FinishOnDrop {
        FinishOnDrop {
            registry: self.clone(),
            cycle: cycle.clone(),
        }
    }

    /// Drops the bookkeeping of a finished cycle unless a newer one took over.
    pub fn finish(&self, cycle: &RefreshCycle) {
        let mut entries = lock(&self.entries);
        if entries
            .get(&cycle.key)
            .is_some_and(|entry| entry.generation == cycle.generation)
        {
            entries.remove(&cycle.key);
        }
    }
}

pub struct FinishOnDrop {
    registry: RefreshRegistry,
    cycle: RefreshCycle,
}

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        self.registry.finish(&self.cycle);
    }
}

#[cfg(test)]
impl RefreshRegistry {
    pub(crate) fn tracked_keys(&self) -> usize {
        lock(&self.entries).len()
    }
}

/// Recovers the guard from a poisoned lock.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
