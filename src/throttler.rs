use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::{
    sync::{Notify, oneshot},
    task::JoinHandle,
    time::Instant,
};

use crate::{BotgateError, ChatScope, ThrottlerOptions, window_tracker::WindowTracker};

/// Admission controller for outbound API calls.
///
/// Requests queue into one of two FIFO tiers (interactive or broadcast), and
/// a single worker task, spawned lazily on the first queued request, drains
/// them against the sliding-window ceilings. The worker always empties the
/// interactive tier before touching the broadcast tier.
///
/// # Atomicity
///
/// The admission check and the recording of an admitted call happen under one
/// internal lock, inside the single worker. A resolved [`wait`](Self::wait)
/// therefore never over-commits a ceiling: there are no false positives.
///
/// # Starvation
///
/// Strict tier priority means a continuous interactive stream defers queued
/// broadcasts indefinitely. This is a deliberate trade-off: interactive
/// replies are latency-sensitive, mass notifications are not.
///
/// # Examples
///
/// ```no_run
/// use botgate::{ChatScope, Throttler, ThrottlerOptions};
///
/// # async fn run() -> Result<(), botgate::BotgateError> {
/// let throttler = Throttler::new(ThrottlerOptions::default());
///
/// // Resolves immediately: the chat has no history yet.
/// throttler.wait("42", ChatScope::Private, false).await?;
///
/// // Same chat again: resolves after the per-chat window frees a slot.
/// throttler.wait("42", ChatScope::Private, false).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Throttler {
    inner: Arc<ThrottlerInner>,
}

struct ThrottlerInner {
    tracker: Mutex<WindowTracker>,
    state: Mutex<DispatchState>,
    idle: Notify,
}

struct DispatchState {
    interactive: VecDeque<QueuedRequest>,
    broadcast: VecDeque<QueuedRequest>,
    worker: Option<JoinHandle<()>>,
    closed: bool,
}

struct QueuedRequest {
    chat_key: String,
    scope: ChatScope,
    broadcast: bool,
    done: oneshot::Sender<Result<(), BotgateError>>,
}

impl Throttler {
    /// Create a new [`Throttler`] with the given ceilings.
    pub fn new(options: ThrottlerOptions) -> Self {
        Self {
            inner: Arc::new(ThrottlerInner {
                tracker: Mutex::new(WindowTracker::new(options)),
                state: Mutex::new(DispatchState {
                    interactive: VecDeque::new(),
                    broadcast: VecDeque::new(),
                    worker: None,
                    closed: false,
                }),
                idle: Notify::new(),
            }),
        }
    }

    /// Block until the request may be issued without violating any ceiling.
    ///
    /// The request joins the interactive tier, or the broadcast tier when
    /// `broadcast` is set. Within a tier, requests resolve in enqueue order.
    ///
    /// # Errors
    ///
    /// [`BotgateError::Cancelled`] when the throttler is closed, either
    /// before this call or while the request is still queued. No other error
    /// is produced; over-limit requests are delayed, never rejected.
    pub async fn wait(
        &self,
        chat_key: &str,
        scope: ChatScope,
        broadcast: bool,
    ) -> Result<(), BotgateError> {
        let (done, resolved) = oneshot::channel();

        {
            let mut state = self.lock_state();

            if state.closed {
                return Err(BotgateError::Cancelled);
            }

            let request = QueuedRequest {
                chat_key: chat_key.to_owned(),
                scope,
                broadcast,
                done,
            };

            if broadcast {
                state.broadcast.push_back(request);
            } else {
                state.interactive.push_back(request);
            }

            // Spawn-or-skip happens under the same lock as the push, so a
            // worker observing both queues empty cannot race a new request
            // into an unattended queue.
            let needs_worker = state
                .worker
                .as_ref()
                .is_none_or(JoinHandle::is_finished);

            if needs_worker {
                let throttler = self.clone();
                state.worker = Some(tokio::spawn(async move { throttler.run_worker().await }));
                tracing::debug!("dispatch worker spawned");
            }
        }

        match resolved.await {
            Ok(outcome) => outcome,
            // Worker aborted mid-flight; its side of the channel was dropped.
            Err(_) => Err(BotgateError::Cancelled),
        }
    } // end method wait

    /// Non-blocking probe: would a request on these scopes be admitted right
    /// now?
    ///
    /// Neither enqueues nor records anything; calling it any number of times
    /// leaves admission outcomes unchanged. Note the answer can be stale by
    /// the time a real [`wait`](Self::wait) runs.
    pub fn can_execute_immediately(
        &self,
        chat_key: &str,
        scope: ChatScope,
        broadcast: bool,
    ) -> bool {
        let mut tracker = self.lock_tracker();
        let now = Instant::now();

        tracker.purge(now);
        tracker.check(now, chat_key, scope, broadcast).is_none()
    }

    /// Wait until both tiers are empty and no worker is running.
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();

            {
                let state = self.lock_state();

                if state.interactive.is_empty()
                    && state.broadcast.is_empty()
                    && state.worker.is_none()
                {
                    return;
                }
            }

            notified.await;
        }
    } // end method wait_until_idle

    /// Shut the throttler down.
    ///
    /// Every still-queued waiter resolves with [`BotgateError::Cancelled`],
    /// the worker is aborted, and later [`wait`](Self::wait) calls fail fast.
    /// The expected cancellation of the worker task is absorbed; any other
    /// termination is logged.
    pub async fn close(&self) {
        let (worker, drained) = {
            let mut state = self.lock_state();
            state.closed = true;

            let worker = state.worker.take();
            let mut drained: Vec<QueuedRequest> = state.interactive.drain(..).collect();
            drained.extend(state.broadcast.drain(..));

            (worker, drained)
        };

        for request in drained {
            let _ = request.done.send(Err(BotgateError::Cancelled));
        }

        if let Some(worker) = worker {
            worker.abort();

            if let Err(err) = worker.await
                && !err.is_cancelled()
            {
                tracing::error!(error = ?err, "dispatch worker terminated abnormally");
            }
        }

        self.inner.idle.notify_waiters();
    } // end method close

    /// Drop expired window entries now. Used by the background cleanup loop
    /// so an idle throttler does not retain its last histories forever.
    pub(crate) fn purge_now(&self) {
        self.lock_tracker().purge(Instant::now());
    }

    #[cfg(test)]
    pub(crate) fn tracked_scopes(&self) -> usize {
        self.lock_tracker().tracked_scopes()
    }

    async fn run_worker(self) {
        loop {
            let request = {
                let mut state = self.lock_state();

                if let Some(request) = state.interactive.pop_front() {
                    Some(request)
                } else if let Some(request) = state.broadcast.pop_front() {
                    Some(request)
                } else {
                    // Clearing the slot under the state lock closes the
                    // lost-wakeup window against a concurrent enqueue.
                    state.worker = None;
                    None
                }
            };

            let Some(request) = request else {
                tracing::debug!("dispatch worker drained both tiers, exiting");
                self.inner.idle.notify_waiters();
                return;
            };

            if self.admit(&request).await {
                let _ = request.done.send(Ok(()));
            }
        }
    } // end method run_worker

    /// Sleep-and-recheck until every applicable ceiling has room, then record
    /// the admission. Check and record share one tracker critical section.
    ///
    /// Returns `false` without recording when the waiter disappeared, so an
    /// abandoned request never charges a window slot or delays the live
    /// requests queued behind it. Re-checked on every pass, including the one
    /// that would record.
    async fn admit(&self, request: &QueuedRequest) -> bool {
        let chat_key = request.chat_key.as_str();

        loop {
            if request.done.is_closed() {
                tracing::debug!(chat_key, "waiter went away, discarding queued request");
                return false;
            }

            let delay = {
                let mut tracker = self.lock_tracker();
                let now = Instant::now();

                tracker.purge(now);

                match tracker.check(now, chat_key, request.scope, request.broadcast) {
                    None => {
                        tracker.record(now, chat_key, request.scope, request.broadcast);
                        None
                    }
                    Some(delay) => Some(delay),
                }
            };

            let Some(delay) = delay else {
                return true;
            };

            tracing::debug!(chat_key, ?delay, "over ceiling, sleeping before re-check");
            tokio::time::sleep(delay).await;
        }
    } // end method admit

    fn lock_state(&self) -> MutexGuard<'_, DispatchState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_tracker(&self) -> MutexGuard<'_, WindowTracker> {
        self.inner
            .tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
} // end impl Throttler
