//! Sales API demo: the full middleware stack, a token-protected admin route
//! and a separate debug listener.
//!
//! Run with:
//!   RAMPART_AUTH_ACTIVE_KID=54bb2165-71e1-41a6-af3e-7da4a0e1e2c1 \
//!   RUST_LOG=info cargo run --example sales
//!
//! Set `LOG_FORMAT=json` for one JSON object per log line.
//!
//! Try:
//!   curl http://localhost:3000/v1/test          # 200 or 400 at random
//!   curl http://localhost:3000/v1/testauth      # 401
//!   curl -H "Authorization: Bearer $TOKEN" http://localhost:3000/v1/testauth
//!   curl http://localhost:4000/debug/vars

use std::sync::Arc;
use std::time::Duration;

use rampart::auth::{Authority, Claims, KeyStore, ROLE_ADMIN};
use rampart::{App, Config, Error, Method, Metrics, Request, Response, Server, StatusCode};
use rampart::{debug, middleware, shutdown};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    if let Err(e) = run().await {
        error!("startup: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Config::from_env()?;
    info!(api_host = %cfg.api_host, debug_host = %cfg.debug_host, "starting service");

    // Keys live only in memory, so every token dies with the process.
    let keys = Arc::new(KeyStore::new());
    keys.generate(cfg.auth.active_kid.as_str())?;
    let authority = Arc::new(Authority::new(cfg.auth.active_kid.as_str(), keys)?);

    let claims = Claims::new("12345", cfg.auth.issuer.as_str(), [ROLE_ADMIN], Duration::from_secs(3600));
    info!(kid = authority.active_kid(), "admin token: {}", authority.generate_token(&claims)?);

    let metrics = Arc::new(Metrics::new());

    // ── Debug service ────────────────────────────────────────────────────────
    let (debug_tx, debug_rx) = shutdown::channel();
    let debug_app = App::new(debug_tx, vec![])
        .get("/debug/liveness", debug::liveness, vec![])
        .get("/debug/readiness", debug::readiness, vec![])
        .get("/debug/vars", debug::vars(metrics.clone()), vec![]);
    let debug_host = cfg.debug_host;
    tokio::spawn(async move {
        if let Err(e) = Server::bind(debug_host).serve_with_shutdown(debug_app, debug_rx).await {
            error!(host = %debug_host, "debug listener closed: {e}");
        }
    });

    // ── API service ──────────────────────────────────────────────────────────
    let (tx, rx) = shutdown::channel();
    let app = App::new(tx, vec![
        middleware::logger(),
        middleware::errors(),
        middleware::metrics(metrics.clone()),
        middleware::panics(metrics.clone()),
    ])
    .handle(Method::GET, "v1", "/test", test, vec![])
    .handle(
        Method::GET,
        "v1",
        "/testauth",
        test_auth,
        vec![middleware::authenticate(authority), middleware::authorize(&[ROLE_ADMIN])],
    );

    Server::bind(cfg.api_host)
        .shutdown_timeout(cfg.shutdown_timeout)
        .serve_with_shutdown(app, rx)
        .await?;

    info!("shutdown complete");
    Ok(())
}

// GET /v1/test
//
// Fails half the time with a trusted 400 so the error path is easy to watch.
async fn test(_req: Request) -> Result<Response, Error> {
    if uuid::Uuid::new_v4().as_bytes()[0] % 2 == 0 {
        return Err(Error::request(StatusCode::BAD_REQUEST, "trusted error"));
    }
    Response::to_json(StatusCode::OK, &json!({ "status": "OK" }))
}

// GET /v1/testauth
async fn test_auth(req: Request) -> Result<Response, Error> {
    let subject = req.context().and_then(|ctx| ctx.claims()).map(|c| c.sub.clone());
    Response::to_json(StatusCode::OK, &json!({ "status": "OK", "subject": subject }))
}
