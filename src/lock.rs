//! Per-volume serialisation of mutating operations.
//!
//! Each volume name maps to its own async mutex, created on first use and
//! dropped from the registry once the last holder or waiter lets go. Work on
//! different volumes never contends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;
use tracing::trace;

type Registry = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// Registry of per-volume locks. Cloning shares the registry.
#[derive(Clone, Debug, Default)]
pub struct VolumeLocks {
    registry: Arc<Mutex<Registry>>,
}

impl VolumeLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key` and returns a guard releasing it
    /// on drop.
    ///
    /// Dropping the returned future before it completes gives up the wait
    /// and releases the registry entry.
    pub async fn lock(&self, key: &str) -> VolumeLockGuard {
        let mut waiter = Waiter {
            registry: &self.registry,
            key,
            acquired: false,
        };
        trace!(volume = key, "waiting for volume lock");
        let guard = self.entry(key).lock_owned().await;
        waiter.acquired = true;
        VolumeLockGuard {
            guard: Some(guard),
            key: key.to_owned(),
            registry: Arc::clone(&self.registry),
        }
    }

    /// Returns a guard for `key` if nobody currently holds it.
    #[must_use]
    pub fn try_lock(&self, key: &str) -> Option<VolumeLockGuard> {
        let entry = self.entry(key);
        let Ok(guard) = entry.try_lock_owned() else {
            release(&self.registry, key);
            return None;
        };
        Some(VolumeLockGuard {
            guard: Some(guard),
            key: key.to_owned(),
            registry: Arc::clone(&self.registry),
        })
    }

    /// Returns the number of volumes with a live lock entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` when no volume lock is held or awaited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(registry.entry(key.to_owned()).or_default())
    }
}

/// Removes `key` when the registry holds the only remaining reference.
fn release(registry: &Mutex<Registry>, key: &str) {
    let mut map = registry.lock().unwrap_or_else(PoisonError::into_inner);
    if map
        .get(key)
        .is_some_and(|entry| Arc::strong_count(entry) == 1)
    {
        map.remove(key);
    }
}

/// Registry claim held while a lock is awaited. Declared before the
/// acquiring future so a cancelled wait drops that future first.
struct Waiter<'a> {
    registry: &'a Mutex<Registry>,
    key: &'a str,
    acquired: bool,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if !self.acquired {
            release(self.registry, self.key);
            trace!(volume = self.key, "abandoned wait for volume lock");
        }
    }
}

/// Exclusive access to one volume; released on drop.
#[derive(Debug)]
pub struct VolumeLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    registry: Arc<Mutex<Registry>>,
}

impl VolumeLockGuard {
    /// Returns the volume key this guard protects.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for VolumeLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        release(&self.registry, &self.key);
        trace!(volume = %self.key, "released volume lock");
    }
}
