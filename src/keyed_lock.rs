use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::BotgateError;

/// On-demand exclusive locks keyed by an application-level string.
///
/// Storage backends take the lock for a conversation key (for example a
/// `chat:bot` tuple) around each read-modify-write of that conversation's
/// state, so at most one mutation runs per key at a time. Entries are created
/// on first [`acquire`](Self::acquire) and reclaimed automatically once the
/// lock is released and nobody is waiting, so the registry only holds
/// currently-contended keys.
///
/// Cloning is cheap; clones share the same registry.
///
/// # Examples
///
/// ```no_run
/// use botgate::KeyedLockRegistry;
///
/// # async fn run() {
/// let locks = KeyedLockRegistry::new();
///
/// {
///     let _guard = locks.acquire("42:my_bot").await;
///     // exclusive access to chat 42's state
/// } // released and reclaimed here
///
/// assert_eq!(locks.live_keys(), 0);
/// # }
/// ```
#[derive(Clone, Default)]
pub struct KeyedLockRegistry {
    entries: Arc<DashMap<String, LockEntry>>,
}

#[derive(Clone)]
struct LockEntry {
    mutex: Arc<Mutex<()>>,
    waiters: Arc<AtomicUsize>,
}

impl LockEntry {
    fn new() -> Self {
        Self {
            mutex: Arc::new(Mutex::new(())),
            waiters: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl KeyedLockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the exclusive lock for `key`, creating its entry if absent.
    ///
    /// All concurrent acquirers of the same key share one entry, so the
    /// returned guard is a true mutual-exclusion guarantee for that key. The
    /// lock is released on every exit path of the guard's scope, including
    /// panics; cancelling this future at its suspension point deregisters the
    /// waiter and reclaims the key if it became unused.
    pub async fn acquire(&self, key: &str) -> KeyedLockGuard {
        let entry = {
            let slot = self
                .entries
                .entry(key.to_owned())
                .or_insert_with(LockEntry::new);

            // Registering while the map entry is still held keeps a
            // concurrent reclaim from deleting the entry between lookup and
            // registration, which would hand two callers distinct locks for
            // one key.
            slot.waiters.fetch_add(1, Ordering::AcqRel);
            slot.clone()
        };

        let registration = WaiterRegistration {
            registry: self.clone(),
            key: key.to_owned(),
            waiters: Arc::clone(&entry.waiters),
        };

        let guard = Arc::clone(&entry.mutex).lock_owned().await;

        // Holder now, not a waiter.
        drop(registration);

        KeyedLockGuard {
            registry: self.clone(),
            key: key.to_owned(),
            guard: Some(guard),
        }
    } // end method acquire

    /// Force-remove the entry for `key`.
    ///
    /// Removing an absent key is a no-op.
    ///
    /// # Errors
    ///
    /// [`BotgateError::LockBusy`] when the lock is currently held or has
    /// waiters; the entry is left in place so those callers stay valid.
    pub fn remove(&self, key: &str) -> Result<(), BotgateError> {
        if self.try_reclaim(key) {
            return Ok(());
        }

        match self.entries.get(key) {
            Some(entry) => Err(BotgateError::LockBusy {
                key: key.to_owned(),
                waiters: entry.waiters.load(Ordering::Acquire),
            }),
            // Lost a race with the last holder's own reclaim; same outcome.
            None => Ok(()),
        }
    } // end method remove

    /// Number of keys currently tracked (held, waited on, or mid-handoff).
    pub fn live_keys(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn waiter_count(&self, key: &str) -> usize {
        self.entries
            .get(key)
            .map_or(0, |entry| entry.waiters.load(Ordering::Acquire))
    }

    /// Remove `key` if its lock is unheld and unwaited. Returns whether the
    /// key is now absent.
    fn try_reclaim(&self, key: &str) -> bool {
        let removed = self
            .entries
            .remove_if(key, |_, entry| {
                entry.waiters.load(Ordering::Acquire) == 0 && entry.mutex.try_lock().is_ok()
            })
            .is_some();

        removed || !self.entries.contains_key(key)
    }
} // end impl KeyedLockRegistry

/// Decrements the waiter count even when the acquiring future is dropped at
/// its suspension point, then reclaims the key if it became unused.
struct WaiterRegistration {
    registry: KeyedLockRegistry,
    key: String,
    waiters: Arc<AtomicUsize>,
}

impl Drop for WaiterRegistration {
    fn drop(&mut self) {
        self.waiters.fetch_sub(1, Ordering::AcqRel);
        self.registry.try_reclaim(&self.key);
    }
}

/// Scoped exclusive lock for one key.
///
/// Dropping the guard unlocks the key and removes its registry entry if no
/// other caller holds or waits on it.
pub struct KeyedLockGuard {
    registry: KeyedLockRegistry,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLockGuard {
    /// The key this guard locks.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyedLockGuard {
    fn drop(&mut self) {
        // Unlock before reclaiming; reclaim skips keys whose lock is held.
        drop(self.guard.take());
        self.registry.try_reclaim(&self.key);
    }
}
