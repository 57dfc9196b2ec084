//! # rampart
//!
//! A small request pipeline for HTTP services: middleware composition,
//! per-request context, token authentication with role checks, and a way for
//! a handler deep in the chain to take the whole process down gracefully.
//!
//! ## The pieces
//!
//! - [`App`]: route table plus application-wide middleware. Installs a
//!   [`RequestContext`] on every request and turns shutdown-class errors into
//!   a signal on the [`shutdown`] channel.
//! - [`middleware`]: logger, error translation, metrics, panic recovery,
//!   authenticate, authorize. Each is a handler-to-handler wrapper.
//! - [`auth`]: Ed25519-signed JWTs with a key id in the header, validated
//!   against a rotating [`auth::KeyResolver`].
//! - [`Metrics`]: atomic process counters, injected where they are used.
//! - [`Server`]: hyper transport with graceful drain.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rampart::{App, Error, Metrics, Request, Response, Server, middleware, shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let metrics = Arc::new(Metrics::new());
//!     let (tx, rx) = shutdown::channel();
//!
//!     let app = App::new(tx, vec![
//!         middleware::logger(),
//!         middleware::errors(),
//!         middleware::metrics(metrics.clone()),
//!         middleware::panics(metrics.clone()),
//!     ])
//!     .get("/users/{id}", get_user, vec![]);
//!
//!     Server::bind("0.0.0.0:3000".parse().unwrap())
//!         .serve_with_shutdown(app, rx)
//!         .await
//! }
//!
//! async fn get_user(req: Request) -> Result<Response, Error> {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Ok(Response::json(format!(r#"{{"id":"{id}"}}"#)))
//! }
//! ```

mod app;
mod config;
mod context;
mod error;
mod handler;
mod metrics;
mod request;
mod response;
mod server;

pub mod auth;
pub mod debug;
pub mod middleware;
pub mod shutdown;

pub use app::App;
pub use config::{AuthConfig, Config, ConfigError};
pub use context::RequestContext;
pub use error::Error;
pub use handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, HandlerResult};
pub use metrics::{Metrics, MetricsSnapshot};
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use server::{DEFAULT_SHUTDOWN_TIMEOUT, Server};

pub use http::{Method, StatusCode};
