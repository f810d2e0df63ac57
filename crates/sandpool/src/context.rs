//! Request-scoped context passed to the sandbox dial primitive.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// The execution context of one inbound request.
///
/// The sandbox only lets a socket be dialed (and later used) under a
/// context derived from the request currently being served. Pooled
/// transports outlive the request that dialed them, so every checkout
/// rebinds the transport to the caller's own context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    request_id: Arc<str>,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<Arc<str>>) -> Self {
        Self {
            request_id: request_id.into(),
            deadline: None,
        }
    }

    /// Builder method: attach an absolute deadline.
    pub fn with_deadline(self, deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..self
        }
    }

    /// Builder method: attach a deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. `None` when no deadline is set,
    /// `Some(Duration::ZERO)` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}
