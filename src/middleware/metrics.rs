use std::sync::Arc;

use super::Middleware;
use crate::handler::{BoxedHandler, Handler};
use crate::metrics::Metrics;
use crate::request::Request;

/// Counts requests, and errors flowing back out of the wrapped handler.
pub fn metrics(metrics: Arc<Metrics>) -> Middleware {
    Middleware::new(move |next: BoxedHandler| {
        let metrics = Arc::clone(&metrics);
        (move |req: Request| {
            let next = Arc::clone(&next);
            let metrics = Arc::clone(&metrics);
            async move {
                let res = next.call(req).await;

                metrics.add_requests();
                metrics.add_goroutines();
                if res.is_err() {
                    metrics.add_errors();
                }

                res
            }
        })
        .into_boxed_handler()
    })
}
