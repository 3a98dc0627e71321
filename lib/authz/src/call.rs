//! Per-call controls: deadline, cancellation, and read consistency.

use crate::context::Consistency;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Controls for a single authorization call.
///
/// The default carries no deadline of its own (the client's configured
/// request timeout applies), no cancellation token, and no consistency
/// override.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancellation: Option<CancellationToken>,
    consistency: Option<Consistency>,
}

impl CallContext {
    /// Creates a context with no overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops the call at the given instant.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Stops the call after `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Stops the call when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Overrides the client's read consistency for this call.
    #[must_use]
    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = Some(consistency);
        self
    }

    /// Returns the explicit deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the cancellation token, if any.
    #[must_use]
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    /// Returns the consistency override, if any.
    #[must_use]
    pub fn consistency(&self) -> Option<Consistency> {
        self.consistency
    }
}

/// What an engine needs to know about the call it is serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestMeta {
    /// Effective deadline after applying the client default.
    pub deadline: Option<Instant>,
    /// Effective read consistency.
    pub consistency: Consistency,
}

impl RequestMeta {
    /// Time left before the deadline, if there is one.
    ///
    /// Saturates at zero once the deadline has passed.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}
