//! Per-call operation context.
//!
//! # Responsibility
//! - Carry caller cancellation, deadline and request id into store calls.
//! - Translate "context done" into a typed error.
//!
//! # Invariants
//! - A context is done once its token is cancelled or its deadline passed;
//!   it never becomes live again.
//! - The request id is passed through into log lines and not interpreted.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const NO_REQUEST_ID: &str = "-";

/// Reason an operation stopped before completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// Caller cancelled the token.
    Cancelled,
    /// Deadline elapsed.
    DeadlineExceeded,
}

impl Display for ContextError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::DeadlineExceeded => write!(f, "operation deadline exceeded"),
        }
    }
}

impl Error for ContextError {}

/// Cancellation scope for one `save`/`get` invocation.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    request_id: Option<String>,
}

impl OpContext {
    /// Context that is never done unless derived handles cancel it.
    pub fn background() -> Self {
        Self::default()
    }

    /// Context driven by an externally owned token.
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..Self::default()
        }
    }

    /// Sets a deadline `timeout` from now.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Sets an absolute deadline.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Attaches a request id used only for log correlation.
    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Request id for log lines (`-` when unset).
    pub fn log_id(&self) -> &str {
        self.request_id.as_deref().unwrap_or(NO_REQUEST_ID)
    }

    /// Token that cancels this context.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancels this context and every clone of it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Remaining time before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns `Err` once the context is done.
    pub fn check(&self) -> Result<(), ContextError> {
        if self.cancel.is_cancelled() {
            return Err(ContextError::Cancelled);
        }
        if is_past(self.deadline) {
            return Err(ContextError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Whether `check` would fail.
    pub fn is_done(&self) -> bool {
        self.check().is_err()
    }

    pub(crate) fn deadline_instant(&self) -> Option<Instant> {
        self.deadline
    }
}

pub(crate) fn is_past(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

#[cfg(test)]
mod tests {
    use super::{ContextError, OpContext};
    use std::time::{Duration, Instant};

    #[test]
    fn background_context_is_live() {
        let ctx = OpContext::background();
        assert!(ctx.check().is_ok());
        assert_eq!(ctx.log_id(), "-");
        assert!(ctx.remaining().is_none());
    }

    #[test]
    fn cancel_propagates_to_clones() {
        let ctx = OpContext::background().request_id("req-7");
        let clone = ctx.clone();
        ctx.cancel();
        assert_eq!(clone.check(), Err(ContextError::Cancelled));
        assert_eq!(clone.log_id(), "req-7");
    }

    #[test]
    fn elapsed_deadline_reports_deadline_exceeded() {
        let ctx = OpContext::background().deadline(Instant::now() - Duration::from_millis(1));
        assert_eq!(ctx.check(), Err(ContextError::DeadlineExceeded));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn cancellation_wins_over_deadline() {
        let ctx = OpContext::background().timeout(Duration::ZERO);
        ctx.token().cancel();
        assert_eq!(ctx.check(), Err(ContextError::Cancelled));
    }
}
