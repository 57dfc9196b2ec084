//! Debug endpoints: health probes and the metrics counters.
//!
//! | Path | Handler | Question |
//! |---|---|---|
//! | `/debug/liveness` | [`liveness`] | Is the process alive? Failure → restart. |
//! | `/debug/readiness` | [`readiness`] | Can it take traffic? Failure → pulled from the load balancer. |
//! | `/debug/vars` | [`vars`] | Current counter values. |
//!
//! Serve them from a separate [`App`](crate::App) on the debug host so they
//! never pass through the API middleware and never show up in its metrics:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rampart::{App, Metrics, debug, shutdown};
//!
//! let metrics = Arc::new(Metrics::new());
//! let (tx, _rx) = shutdown::channel();
//! let app = App::new(tx, vec![])
//!     .get("/debug/liveness", debug::liveness, vec![])
//!     .get("/debug/readiness", debug::readiness, vec![])
//!     .get("/debug/vars", debug::vars(metrics), vec![]);
//! ```

use std::sync::Arc;

use http::StatusCode;
use serde_json::json;

use crate::error::Error;
use crate::metrics::Metrics;
use crate::request::Request;
use crate::response::Response;

const BUILD: &str = env!("CARGO_PKG_VERSION");

/// Always `200 OK`. If the process can answer HTTP at all, it is alive.
pub async fn liveness(_req: Request) -> Result<Response, Error> {
    Response::to_json(StatusCode::OK, &json!({ "status": "up", "build": BUILD }))
}

/// `200 OK` once the process is serving. Replace with a handler that checks
/// dependencies if the service needs to warm up first.
pub async fn readiness(_req: Request) -> Result<Response, Error> {
    Response::to_json(StatusCode::OK, &json!({ "status": "ok", "build": BUILD }))
}

/// Handler returning a JSON snapshot of `metrics`.
pub fn vars(
    metrics: Arc<Metrics>,
) -> impl Fn(Request) -> std::future::Ready<Result<Response, Error>> + Send + Sync + 'static {
    move |_req| std::future::ready(Response::to_json(StatusCode::OK, &metrics.snapshot()))
}
