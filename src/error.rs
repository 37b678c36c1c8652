/// Error type for this crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BotgateError {
    /// The throttler was closed while this request was still queued.
    ///
    /// Every waiter pending at [`Throttler::close`](crate::Throttler::close)
    /// time observes this error instead of hanging forever.
    #[error("throttler closed: pending request cancelled")]
    Cancelled,

    /// A keyed lock could not be force-removed because it is currently held
    /// or has waiters blocked on it.
    #[error("keyed lock {key:?} is busy ({waiters} waiter(s))")]
    LockBusy {
        /// The contended key.
        key: String,
        /// Number of callers blocked on the lock at the time of the attempt.
        waiters: usize,
    },
}
