//! Per-call cancellation and deadline.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::{DeviceError, DeviceResult};

/// Context passed to every device call.
///
/// Device calls are synchronous and may block on a round-trip to the
/// dataplane engine. The context lets the caller bound that wait: a handler
/// checks it before (and, for long operations, during) the call and returns
/// [`DeviceError::Cancelled`] or [`DeviceError::DeadlineExceeded`].
///
/// Cloning shares the cancellation token. [`OpContext::child`] derives a
/// context that is cancelled with its parent but can also be cancelled on
/// its own.
///
/// An operation spanning many device calls (a resync pass, a resolution
/// round) carries a per-call timeout rather than a deadline; the caller
/// derives a fresh deadline for each call with [`OpContext::for_call`].
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    call_timeout: Option<Duration>,
}

impl OpContext {
    /// A context with no deadline that is never cancelled unless asked to.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a deadline `timeout` from now, keeping an earlier one if present.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Sets the deadline, keeping an earlier one if present.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    /// Bounds each device call made under this context by `timeout`.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Context for a single device call: same token, deadline narrowed to
    /// the per-call timeout from now.
    pub fn for_call(&self) -> Self {
        match self.call_timeout {
            Some(timeout) => self.clone().with_timeout(timeout),
            None => self.clone(),
        }
    }

    /// A context cancelled together with `self`.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
            call_timeout: self.call_timeout,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails when the context is cancelled or its deadline has passed.
    pub fn check(&self) -> DeviceResult<()> {
        if self.cancel.is_cancelled() {
            return Err(DeviceError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(DeviceError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Token for callers that want to await cancellation.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}
