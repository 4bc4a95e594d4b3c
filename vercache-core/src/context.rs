//! Per-call deadline and cancellation.
//!
//! An [`OpContext`] is created by the caller and handed, unchanged, to every
//! store call a strategy makes. Strategies check it between steps so that a
//! multi-step sequence stops once the caller has given up.

use crate::error::{ContextError, VercacheResult};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Deadline and cancellation signal for a single strategy call.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Sending half of a cancellable context.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel every context derived from this handle.
    pub fn cancel(&self) {
        // send_replace never fails, even with no receivers left.
        self.tx.send_replace(true);
    }
}

impl OpContext {
    /// A context that never expires and cannot be cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().deadline_in(timeout)
    }

    /// A cancellable context together with its handle.
    pub fn cancellable() -> (CancelHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (
            CancelHandle { tx },
            Self {
                deadline: None,
                cancel: Some(rx),
            },
        )
    }

    /// Set an absolute deadline.
    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now. A timeout too large to represent
    /// leaves the context without a deadline.
    pub fn deadline_in(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    /// Attach an existing cancellation signal (e.g. a shutdown channel).
    pub fn with_cancel_signal(mut self, signal: watch::Receiver<bool>) -> Self {
        self.cancel = Some(signal);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.deadline
            .map(|d| Instant::now() >= d)
            .unwrap_or(false)
    }

    /// Fail if the context has been cancelled or its deadline has passed.
    pub fn check(&self) -> VercacheResult<()> {
        if self.is_cancelled() {
            return Err(ContextError::Cancelled.into());
        }
        if self.is_expired() {
            return Err(ContextError::DeadlineExceeded.into());
        }
        Ok(())
    }
}
