//! Cancellation and deadline for a registration in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{TriggerError, TriggerResult};

/// Cancellation handle passed to listener construction.
///
/// Clones share the cancellation flag, so one clone can cancel a registration
/// running on another thread.
#[derive(Debug, Clone, Default)]
pub struct RegistrationContext {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl RegistrationContext {
    /// A context that is never done unless cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Time left before the deadline, if any.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Returns true once cancelled or past the deadline.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.remaining().is_some_and(|r| r.is_zero())
    }

    /// Fails with [`TriggerError::Cancelled`] once the context is done.
    pub fn check(&self) -> TriggerResult<()> {
        if self.is_cancelled() {
            return Err(TriggerError::Cancelled {
                reason: "context cancelled".to_string(),
            });
        }
        if self.remaining().is_some_and(|r| r.is_zero()) {
            return Err(TriggerError::Cancelled {
                reason: "context deadline exceeded".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let ctx = RegistrationContext::new();
        let clone = ctx.clone();
        assert!(ctx.check().is_ok());
        clone.cancel();
        assert!(ctx.is_done());
        assert!(matches!(ctx.check(), Err(TriggerError::Cancelled { .. })));
    }

    #[test]
    fn test_deadline() {
        let ctx = RegistrationContext::with_timeout(Duration::ZERO);
        assert!(ctx.is_done());
        let err = ctx.check().unwrap_err();
        assert!(err.to_string().contains("deadline"));

        let ctx = RegistrationContext::with_timeout(Duration::from_secs(60));
        assert!(!ctx.is_done());
        assert!(ctx.remaining().unwrap() > Duration::from_secs(50));
    }
}
