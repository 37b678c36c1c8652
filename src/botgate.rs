//! Top-level entrypoint that wires the coordination components.
//!
//! A [`Botgate`] owns one [`Throttler`] and one [`KeyedLockRegistry`]; the
//! transport and the storage backends each take the accessor they need.

use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::task::JoinHandle;

use crate::{KeyedLockRegistry, Throttler, ThrottlerOptions};

/// Top-level configuration for [`Botgate`].
#[derive(Clone, Copy, Debug, Default)]
pub struct BotgateOptions {
    /// Ceilings for the admission controller.
    pub throttler: ThrottlerOptions,
}

/// Coordination entrypoint: admission control plus per-key locking behind one
/// handle.
pub struct Botgate {
    throttler: Throttler,
    locks: KeyedLockRegistry,
    cleanup: Mutex<Option<JoinHandle<()>>>,
}

impl Botgate {
    /// Create a new [`Botgate`].
    pub fn new(options: BotgateOptions) -> Self {
        Self {
            throttler: Throttler::new(options.throttler),
            locks: KeyedLockRegistry::new(),
            cleanup: Mutex::new(None),
        }
    }

    /// Access the admission controller.
    pub fn throttler(&self) -> &Throttler {
        &self.throttler
    }

    /// Access the keyed lock registry.
    pub fn locks(&self) -> &KeyedLockRegistry {
        &self.locks
    }

    /// Start the background cleanup loop with the default interval (60 s).
    ///
    /// See [`run_cleanup_loop_with_interval`](Self::run_cleanup_loop_with_interval).
    pub fn run_cleanup_loop(&self) {
        self.run_cleanup_loop_with_interval(Duration::from_secs(60));
    }

    /// Start a background task that periodically drops expired window
    /// histories.
    ///
    /// The worker already purges on every admission, but a bot that goes
    /// quiet would otherwise retain its last histories until the next
    /// request. Idempotent: calling while a loop is running does nothing.
    /// Must be called from within a tokio runtime.
    pub fn run_cleanup_loop_with_interval(&self, interval: Duration) {
        let mut slot = self.lock_cleanup();

        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let throttler = self.throttler.clone();

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            // discard the immediate first tick
            ticker.tick().await;

            loop {
                ticker.tick().await;
                throttler.purge_now();
            }
        }));
    } // end method run_cleanup_loop_with_interval

    /// Stop the background cleanup loop. Idempotent.
    pub fn stop_cleanup_loop(&self) {
        if let Some(handle) = self.lock_cleanup().take() {
            handle.abort();
        }
    }

    fn lock_cleanup(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.cleanup.lock().unwrap_or_else(PoisonError::into_inner)
    }
} // end impl Botgate

impl Drop for Botgate {
    fn drop(&mut self) {
        self.stop_cleanup_loop();
    }
}
