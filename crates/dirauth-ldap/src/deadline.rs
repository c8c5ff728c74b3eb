//! Operation deadlines
//!
//! A deadline is applied to each directory call on its own rather than to a
//! whole flow, so the step holding a connection still gets to close it.

use dirauth_core::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Point in time by which an operation must finish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    /// Deadline `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}

/// Run `fut`, giving up with [`Error::DeadlineExceeded`] once `deadline`
/// passes. Without a deadline `fut` runs to completion.
pub(crate) async fn within<F: Future>(deadline: Option<Deadline>, fut: F) -> Result<F::Output> {
    match deadline {
        None => Ok(fut.await),
        Some(deadline) => tokio::time::timeout_at(deadline.at, fut)
            .await
            .map_err(|_| Error::DeadlineExceeded(deadline.budget)),
    }
}
