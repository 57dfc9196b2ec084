//! Middleware layer.
//!
//! A [`Middleware`] takes a handler and returns a new handler that adds one
//! cross-cutting concern around it. Lists compose left to right:
//! `[m1, m2, m3]` around `h` is `m1(m2(m3(h)))`, so `m1` sees the request
//! first and the result last.
//!
//! Recommended application-wide order:
//!
//! ```text
//! logger → errors → metrics → panics → [route middleware] → handler
//! ```
//!
//! [`authenticate`] and [`authorize`] go on individual routes, inside the
//! application-wide set.

mod auth;
mod errors;
mod logger;
mod metrics;
mod panics;

use std::sync::Arc;

use crate::handler::BoxedHandler;

pub use auth::{authenticate, authorize};
pub use errors::errors;
pub use logger::logger;
pub use metrics::metrics;
pub use panics::panics;

/// A handler-to-handler transformation.
#[derive(Clone)]
pub struct Middleware(Arc<dyn Fn(BoxedHandler) -> BoxedHandler + Send + Sync>);

impl Middleware {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn wrap(&self, handler: BoxedHandler) -> BoxedHandler {
        (self.0)(handler)
    }
}

/// Wraps `handler` so the first middleware in `mw` ends up outermost.
pub(crate) fn wrap_middleware(mw: &[Middleware], handler: BoxedHandler) -> BoxedHandler {
    mw.iter().rev().fold(handler, |handler, m| m.wrap(handler))
}
