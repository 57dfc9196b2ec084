use std::sync::Arc;

use tracing::info;

use super::Middleware;
use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;

/// Logs every request on the way in and on the way out.
///
/// A request without a [`RequestContext`](crate::RequestContext) means the
/// pipeline itself is broken, so that is reported as a shutdown error rather
/// than a client error.
pub fn logger() -> Middleware {
    Middleware::new(|next: BoxedHandler| {
        (move |req: Request| {
            let next = Arc::clone(&next);
            async move {
                let Some(ctx) = req.context().cloned() else {
                    return Err(Error::shutdown("request context missing"));
                };

                let method = req.method().clone();
                let path = req.path().to_owned();
                let remote_addr = req.remote_addr();

                info!(
                    trace_id = %ctx.trace_id(),
                    %method,
                    %path,
                    remote_addr = ?remote_addr,
                    "request started"
                );

                let res = next.call(req).await;

                info!(
                    trace_id = %ctx.trace_id(),
                    %method,
                    %path,
                    remote_addr = ?remote_addr,
                    status_code = ctx.status().map_or(0, |s| s.as_u16()),
                    since = ?ctx.elapsed(),
                    "request completed"
                );

                res
            }
        })
        .into_boxed_handler()
    })
}
