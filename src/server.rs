//! HTTP server and graceful shutdown.
//!
//! The server stops accepting on the first of:
//! 1. **SIGTERM** (Kubernetes, `kill`) or **SIGINT** (Ctrl-C),
//! 2. a [`Signal`](crate::shutdown::Signal) sent by the pipeline when a
//!    handler reports an integrity violation.
//!
//! It then asks every open connection to finish its current request and
//! close, and waits up to the shutdown timeout for them to do so. Whatever is
//! still running after that is aborted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::app::App;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::shutdown::ShutdownReceiver;

/// How long in-flight connections get to finish once shutdown starts.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(20);

enum Bind {
    Addr(SocketAddr),
    Listener(TcpListener),
}

/// The HTTP server.
pub struct Server {
    bind: Bind,
    shutdown_timeout: Duration,
}

impl Server {
    /// Configures the server to bind to `addr` when it starts serving.
    pub fn bind(addr: SocketAddr) -> Self {
        Self { bind: Bind::Addr(addr), shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT }
    }

    /// Serves on a listener that is already bound.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { bind: Bind::Listener(listener), shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT }
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Serves `app` until SIGTERM or Ctrl-C, then drains.
    pub async fn serve(self, app: App) -> Result<(), Error> {
        self.run(app, None).await
    }

    /// Like [`serve`](Server::serve), but also stops when the pipeline
    /// signals shutdown on `shutdown`.
    pub async fn serve_with_shutdown(self, app: App, shutdown: ShutdownReceiver) -> Result<(), Error> {
        self.run(app, Some(shutdown)).await
    }

    async fn run(self, app: App, mut shutdown_rx: Option<ShutdownReceiver>) -> Result<(), Error> {
        let listener = match self.bind {
            Bind::Addr(addr) => TcpListener::bind(addr).await?,
            Bind::Listener(listener) => listener,
        };
        let addr = listener.local_addr()?;

        let app = Arc::new(app);
        let (draining_tx, draining_rx) = watch::channel(false);
        let mut tasks = tokio::task::JoinSet::new();

        info!(%addr, "rampart listening");

        let shutdown = async {
            match shutdown_rx.as_mut() {
                Some(rx) => tokio::select! {
                    () = os_signal() => {}
                    Some(signal) = rx.recv() => info!(?signal, "shutdown requested by pipeline"),
                },
                None => os_signal().await,
            }
        };
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown started, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = Arc::clone(&app);
                    let mut draining = draining_rx.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let app = Arc::clone(&app);
                            async move { handle(&app, req, remote_addr).await }
                        });

                        let builder = ConnBuilder::new(TokioExecutor::new());
                        let conn = builder.serve_connection(io, svc);
                        tokio::pin!(conn);

                        let res = tokio::select! {
                            res = conn.as_mut() => res,
                            _ = draining.changed() => {
                                conn.as_mut().graceful_shutdown();
                                conn.await
                            }
                        };
                        if let Err(e) = res {
                            warn!(peer = %remote_addr, "connection closed: {e}");
                        }
                    });
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        let _ = draining_tx.send(true);

        let drained = tokio::time::timeout(self.shutdown_timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await
        .is_ok();

        if !drained {
            let in_flight = tasks.len();
            tasks.abort_all();
            error!(in_flight, timeout = ?self.shutdown_timeout, "could not stop server gracefully");
            return Err(Error::ShutdownTimeout { timeout: self.shutdown_timeout, in_flight });
        }

        info!("rampart stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Routes one request and produces one response.
///
/// Returning `Err` makes hyper drop the connection without a response; that
/// is reserved for shutdown-class errors.
async fn handle(
    app: &App,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Error> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(peer = %remote_addr, "reading request body: {e}");
            return Ok(Response::status(StatusCode::BAD_REQUEST).into_inner());
        }
    };

    match app.dispatch(Request::from_parts(parts, body, remote_addr)).await {
        Ok(res) => Ok(res.into_inner()),
        Err(err) if err.is_shutdown() => Err(err),
        Err(err) => {
            error!(peer = %remote_addr, error = %err, "unhandled error reached the server");
            Ok(Response::from_error(&err).into_inner())
        }
    }
}

// ── OS signals ────────────────────────────────────────────────────────────────

/// Resolves on SIGTERM or SIGINT. On Windows only Ctrl-C is available.
///
/// If a handler cannot be installed that arm never resolves; the other one
/// and the pipeline channel still work.
async fn os_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
