//! One-shot deadline timer owned by the coordinator.
//!
//! A timer is just an optional deadline: arming replaces it, cancelling clears it, and an
//! unarmed timer never completes. The event loop awaits [`Timer::expired`] behind an
//! `is_armed()` guard, so a cancelled timer cannot fire even if its deadline had already
//! passed when it was cancelled.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Default, Clone)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule expiry `after` from now, replacing any pending deadline.
    pub fn arm(&mut self, after: Duration) {
        self.deadline = Some(Instant::now() + after);
    }

    /// Idempotent.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolve at the deadline. Pends forever while unarmed.
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }
}
