//! Per-request context.
//!
//! The pipeline creates one [`RequestContext`] for every inbound request and
//! stores it on the [`Request`](crate::Request) before the middleware chain
//! runs. Nothing is looked up globally: every layer reads the context off the
//! request it was handed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use http::StatusCode;
use uuid::Uuid;

use crate::auth::Claims;

/// State owned by a single request for its whole lifetime.
///
/// Cloning is cheap and shares the status slot, so an outer middleware that
/// keeps a clone sees the status recorded by inner layers once the call
/// returns. Claims are not shared: they flow inward only.
#[derive(Clone, Debug)]
pub struct RequestContext {
    trace_id: Uuid,
    now: Instant,
    status: Arc<AtomicU16>,
    claims: Option<Claims>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            now: Instant::now(),
            status: Arc::new(AtomicU16::new(0)),
            claims: None,
        }
    }

    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    /// When the pipeline started processing the request.
    pub fn started(&self) -> Instant {
        self.now
    }

    pub fn elapsed(&self) -> Duration {
        self.now.elapsed()
    }

    /// The response status recorded so far, if any layer has set one.
    pub fn status(&self) -> Option<StatusCode> {
        StatusCode::from_u16(self.status.load(Ordering::Acquire)).ok()
    }

    pub fn set_status(&self, status: StatusCode) {
        self.status.store(status.as_u16(), Ordering::Release);
    }

    /// Claims placed here by the authenticate middleware.
    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    pub(crate) fn set_claims(&mut self, claims: Claims) {
        self.claims = Some(claims);
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_unset_until_recorded() {
        let ctx = RequestContext::new();
        assert_eq!(ctx.status(), None);
        ctx.set_status(StatusCode::CREATED);
        assert_eq!(ctx.status(), Some(StatusCode::CREATED));
    }

    #[test]
    fn clones_share_status_slot() {
        let outer = RequestContext::new();
        let inner = outer.clone();
        inner.set_status(StatusCode::FORBIDDEN);
        assert_eq!(outer.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(outer.trace_id(), inner.trace_id());
    }

    #[test]
    fn every_request_gets_its_own_trace_id() {
        assert_ne!(RequestContext::new().trace_id(), RequestContext::new().trace_id());
    }
}
