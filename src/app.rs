//! The request pipeline.
//!
//! [`App`] owns the route table and the application-wide middleware. Each
//! route's handler is wrapped once, at registration: route middleware
//! innermost, application middleware outermost. Per request the pipeline
//! installs a fresh [`RequestContext`], runs the composed handler, and turns a
//! shutdown-class error into a signal on the shutdown channel.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;
use tracing::error;

use crate::context::RequestContext;
use crate::handler::{BoxedHandler, Handler, HandlerResult};
use crate::middleware::{Middleware, wrap_middleware};
use crate::request::Request;
use crate::response::Response;
use crate::shutdown::{ShutdownSender, Signal};

/// The application: routes, middleware, and the way to ask for shutdown.
///
/// Build it once at startup and pass it to [`Server`](crate::Server). Routes
/// cannot be added once it is serving.
pub struct App {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    mw: Vec<Middleware>,
    shutdown: ShutdownSender,
}

impl App {
    /// Creates an app whose every route is wrapped in `mw`, first entry
    /// outermost.
    pub fn new(shutdown: ShutdownSender, mw: Vec<Middleware>) -> Self {
        Self { routes: HashMap::new(), mw, shutdown }
    }

    /// Registers `handler` for `method` on `/{group}{path}` (or just `path`
    /// when `group` is empty), wrapped in `mw` and then in the app's own
    /// middleware.
    ///
    /// Path parameters use `{name}` syntax.
    ///
    /// # Panics
    ///
    /// Panics if the path is invalid or the (method, path) pair is already
    /// registered. Both are startup mistakes.
    pub fn handle(
        mut self,
        method: Method,
        group: &str,
        path: &str,
        handler: impl Handler,
        mw: Vec<Middleware>,
    ) -> Self {
        let handler = record_status(handler.into_boxed_handler());
        let handler = wrap_middleware(&mw, handler);
        let handler = wrap_middleware(&self.mw, handler);

        let final_path = if group.is_empty() {
            path.to_owned()
        } else {
            format!("/{group}{path}")
        };

        self.routes
            .entry(method)
            .or_default()
            .insert(final_path.as_str(), handler)
            .unwrap_or_else(|e| panic!("invalid route `{final_path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler, mw: Vec<Middleware>) -> Self {
        self.handle(Method::GET, "", path, handler, mw)
    }

    pub fn post(self, path: &str, handler: impl Handler, mw: Vec<Middleware>) -> Self {
        self.handle(Method::POST, "", path, handler, mw)
    }

    pub fn put(self, path: &str, handler: impl Handler, mw: Vec<Middleware>) -> Self {
        self.handle(Method::PUT, "", path, handler, mw)
    }

    pub fn delete(self, path: &str, handler: impl Handler, mw: Vec<Middleware>) -> Self {
        self.handle(Method::DELETE, "", path, handler, mw)
    }

    /// Runs one request through its route.
    ///
    /// Unknown routes answer `404` without entering any middleware. A
    /// shutdown-class error from the chain signals shutdown and is returned
    /// so the transport writes nothing further. Any other error is returned
    /// as-is for the caller to translate.
    pub async fn dispatch(&self, mut req: Request) -> HandlerResult {
        let Some((handler, params)) = self.lookup(req.method(), req.path()) else {
            return Ok(Response::status(StatusCode::NOT_FOUND));
        };
        req.set_params(params);
        let req = req.with_context(RequestContext::new());

        match handler.call(req).await {
            Err(err) if err.is_shutdown() => {
                error!(error = %err, "integrity violation, signalling shutdown");
                self.signal_shutdown();
                Err(err)
            }
            res => res,
        }
    }

    /// Asks the process to shut down. Never blocks.
    pub fn signal_shutdown(&self) {
        self.shutdown.signal(Signal::Terminate);
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }
}

/// Innermost layer of every route: copies a successful response's status
/// onto the request context.
fn record_status(next: BoxedHandler) -> BoxedHandler {
    (move |req: Request| {
        let next = Arc::clone(&next);
        async move {
            let ctx = req.context().cloned();
            let res = next.call(req).await?;
            if let Some(ctx) = ctx {
                ctx.set_status(res.status_code());
            }
            Ok(res)
        }
    })
    .into_boxed_handler()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::Error;
    use crate::shutdown::{self, ShutdownReceiver};

    fn app(mw: Vec<Middleware>) -> (App, ShutdownReceiver) {
        let (tx, rx) = shutdown::channel();
        (App::new(tx, mw), rx)
    }

    async fn user(req: Request) -> Result<Response, Error> {
        Ok(Response::text(req.param("id").unwrap_or_default().to_owned()))
    }

    #[tokio::test]
    async fn group_prefixes_path_and_params_are_extracted() {
        let (app, _rx) = app(vec![]);
        let app = app.handle(Method::GET, "v1", "/users/{id}", user, vec![]);

        let res = app.dispatch(Request::new(Method::GET, "/v1/users/42")).await.unwrap();
        assert_eq!(res.body().as_ref(), b"42");

        let res = app.dispatch(Request::new(Method::GET, "/users/42")).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);

        let res = app.dispatch(Request::new(Method::POST, "/v1/users/42")).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dispatch_installs_context_and_records_status() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let probe = {
            let seen = Arc::clone(&seen);
            Middleware::new(move |next: BoxedHandler| {
                let seen = Arc::clone(&seen);
                (move |req: Request| {
                    let next = Arc::clone(&next);
                    let seen = Arc::clone(&seen);
                    async move {
                        let ctx = req.context().cloned().expect("pipeline installs context");
                        let res = next.call(req).await;
                        *seen.lock().unwrap() = ctx.status();
                        res
                    }
                })
                .into_boxed_handler()
            })
        };

        let (app, _rx) = app(vec![probe]);
        let app = app.post(
            "/users",
            |_req: Request| async { Ok::<_, Error>(StatusCode::CREATED) },
            vec![],
        );

        app.dispatch(Request::new(Method::POST, "/users")).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(StatusCode::CREATED));
    }

    #[tokio::test]
    async fn route_middleware_does_not_leak_to_other_routes() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = {
            let hits = Arc::clone(&hits);
            Middleware::new(move |next: BoxedHandler| {
                let hits = Arc::clone(&hits);
                (move |req: Request| {
                    let next = Arc::clone(&next);
                    hits.fetch_add(1, Ordering::SeqCst);
                    async move { next.call(req).await }
                })
                .into_boxed_handler()
            })
        };

        let (app, _rx) = app(vec![]);
        let app = app
            .get("/counted/{id}", user, vec![counter])
            .get("/plain/{id}", user, vec![]);

        app.dispatch(Request::new(Method::GET, "/plain/1")).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        app.dispatch(Request::new(Method::GET, "/counted/1")).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_error_sends_exactly_one_signal() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = {
            let calls = Arc::clone(&calls);
            move |_req: Request| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<Response, _>(Error::shutdown("database handle corrupted"))
                }
            }
        };

        let (app, mut rx) = app(vec![]);
        let app = app.get("/broken", handler, vec![]);

        let err = app.dispatch(Request::new(Method::GET, "/broken")).await.unwrap_err();
        assert!(err.is_shutdown());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(rx.try_recv(), Some(Signal::Terminate));
        assert_eq!(rx.try_recv(), None);
    }

    #[tokio::test]
    async fn ordinary_errors_do_not_signal_shutdown() {
        let (app, mut rx) = app(vec![]);
        let app = app.get(
            "/bad",
            |_req: Request| async { Err::<Response, _>(Error::request(StatusCode::BAD_REQUEST, "bad")) },
            vec![],
        );

        let err = app.dispatch(Request::new(Method::GET, "/bad")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(rx.try_recv(), None);
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn duplicate_route_panics() {
        let (app, _rx) = app(vec![]);
        let _ = app.get("/users/{id}", user, vec![]).get("/users/{id}", user, vec![]);
    }
}
