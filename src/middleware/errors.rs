use std::sync::Arc;

use tracing::{error, warn};

use super::Middleware;
use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

/// Turns classified errors into responses.
///
/// Shutdown errors are passed up untouched so the pipeline can act on them.
/// Everything else becomes a response with the error's status, and that
/// status is recorded on the request context for the logger.
pub fn errors() -> Middleware {
    Middleware::new(|next: BoxedHandler| {
        (move |req: Request| {
            let next = Arc::clone(&next);
            async move {
                let ctx = req.context().cloned();

                let err = match next.call(req).await {
                    Ok(res) => return Ok(res),
                    Err(err) if err.is_shutdown() => return Err(err),
                    Err(err) => err,
                };

                let trace_id = ctx.as_ref().map(|c| c.trace_id().to_string());
                let status = err.status();
                if status.is_server_error() {
                    error!(trace_id = ?trace_id, status = status.as_u16(), error = %err, "request failed");
                } else {
                    warn!(trace_id = ?trace_id, status = status.as_u16(), error = %err, "request rejected");
                }

                if let Some(ctx) = &ctx {
                    ctx.set_status(status);
                }
                Ok(Response::from_error(&err))
            }
        })
        .into_boxed_handler()
    })
}

#[cfg(test)]
mod tests {
    use http::{Method, StatusCode};

    use super::*;
    use crate::auth::AuthError;
    use crate::error::Error;
    use crate::RequestContext;

    async fn run(err: fn() -> Error) -> (Result<Response, Error>, RequestContext) {
        let handler = (move |_req: Request| async move { Err::<Response, _>(err()) }).into_boxed_handler();
        let ctx = RequestContext::new();
        let req = Request::new(Method::GET, "/").with_context(ctx.clone());
        (errors().wrap(handler).call(req).await, ctx)
    }

    #[tokio::test]
    async fn classified_errors_become_responses() {
        let (res, ctx) = run(|| Error::from(AuthError::Expired)).await;
        assert_eq!(res.unwrap().status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ctx.status(), Some(StatusCode::UNAUTHORIZED));

        let (res, _) = run(|| Error::Forbidden("role ADMIN required".into())).await;
        assert_eq!(res.unwrap().status_code(), StatusCode::FORBIDDEN);

        let (res, _) = run(|| Error::Panic { message: "boom".into(), trace: "frames".into() }).await;
        let res = res.unwrap();
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!String::from_utf8_lossy(res.body()).contains("frames"));
    }

    #[tokio::test]
    async fn shutdown_errors_pass_through() {
        let (res, ctx) = run(|| Error::shutdown("integrity")).await;
        assert!(res.unwrap_err().is_shutdown());
        assert_eq!(ctx.status(), None);
    }
}
