use std::sync::Arc;

use super::Middleware;
use crate::auth::Authority;
use crate::context::RequestContext;
use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;

/// Validates the bearer token and stores its claims on the request context.
///
/// Any token problem fails with [`Error::Unauthenticated`] and the wrapped
/// handler is not called.
pub fn authenticate(authority: Arc<Authority>) -> Middleware {
    Middleware::new(move |next: BoxedHandler| {
        let authority = Arc::clone(&authority);
        (move |mut req: Request| {
            let next = Arc::clone(&next);
            let authority = Arc::clone(&authority);
            async move {
                let claims = authority.validate_token(req.bearer_token()?)?;

                let Some(ctx) = req.context_mut() else {
                    return Err(Error::shutdown("request context missing"));
                };
                ctx.set_claims(claims);

                next.call(req).await
            }
        })
        .into_boxed_handler()
    })
}

/// Lets the request through only if the authenticated claims hold at least
/// one of `roles`.
///
/// Must sit inside [`authenticate`]; without claims on the context the
/// request is always refused.
pub fn authorize(roles: &[&str]) -> Middleware {
    let roles: Arc<[String]> = roles.iter().map(|r| (*r).to_owned()).collect();
    Middleware::new(move |next: BoxedHandler| {
        let roles = Arc::clone(&roles);
        (move |req: Request| {
            let next = Arc::clone(&next);
            let roles = Arc::clone(&roles);
            async move {
                let Some(claims) = req.context().and_then(RequestContext::claims) else {
                    return Err(Error::Forbidden("claims missing from request context".to_owned()));
                };
                if !claims.authorized::<String>(&roles) {
                    return Err(Error::Forbidden(format!("one of roles {roles:?} required")));
                }

                next.call(req).await
            }
        })
        .into_boxed_handler()
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use http::header::AUTHORIZATION;
    use http::{HeaderValue, Method, StatusCode};

    use super::*;
    use crate::auth::{AuthError, Claims, KeyStore, ROLE_ADMIN, ROLE_USER};
    use crate::middleware::wrap_middleware;
    use crate::response::Response;

    const KID: &str = "test-key";

    fn authority() -> Arc<Authority> {
        let store = Arc::new(KeyStore::new());
        store.generate(KID).unwrap();
        Arc::new(Authority::new(KID, store).unwrap())
    }

    fn counting_handler(calls: Arc<AtomicUsize>) -> BoxedHandler {
        (move |req: Request| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let sub = req
                    .context()
                    .and_then(RequestContext::claims)
                    .map(|c| c.sub.clone())
                    .unwrap_or_default();
                Ok::<_, Error>(Response::text(sub))
            }
        })
        .into_boxed_handler()
    }

    fn request(token: Option<&str>) -> Request {
        let req = Request::new(Method::GET, "/admin").with_context(RequestContext::new());
        match token {
            Some(token) => req.with_header(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
            ),
            None => req,
        }
    }

    fn token(auth: &Authority, roles: &[&str]) -> String {
        let claims = Claims::new("12345", "test", roles.iter().copied(), Duration::from_secs(3600));
        auth.generate_token(&claims).unwrap()
    }

    #[tokio::test]
    async fn valid_token_reaches_handler_with_claims() {
        let auth = authority();
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = wrap_middleware(
            &[authenticate(auth.clone()), authorize(&[ROLE_ADMIN])],
            counting_handler(calls.clone()),
        );

        let res = chain.call(request(Some(&token(&auth, &[ROLE_ADMIN])))).await.unwrap();

        assert_eq!(res.body().as_ref(), b"12345");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wrong_role_is_forbidden_and_handler_not_called() {
        let auth = authority();
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = wrap_middleware(
            &[authenticate(auth.clone()), authorize(&[ROLE_ADMIN])],
            counting_handler(calls.clone()),
        );

        let err = chain.call(request(Some(&token(&auth, &[ROLE_USER])))).await.unwrap_err();

        assert!(matches!(err, Error::Forbidden(_)));
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn any_listed_role_is_enough() {
        let auth = authority();
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = wrap_middleware(
            &[authenticate(auth.clone()), authorize(&[ROLE_ADMIN, ROLE_USER])],
            counting_handler(calls.clone()),
        );

        chain.call(request(Some(&token(&auth, &[ROLE_USER])))).await.unwrap();
        let err = chain.call(request(Some(&token(&auth, &["AUDITOR"])))).await.unwrap_err();

        assert!(matches!(err, Error::Forbidden(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_token_is_unauthenticated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = authenticate(authority()).wrap(counting_handler(calls.clone()));

        let err = chain.call(request(None)).await.unwrap_err();

        assert!(matches!(err, Error::Unauthenticated(AuthError::MissingToken)));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn forged_token_is_unauthenticated() {
        let chain = authenticate(authority()).wrap(counting_handler(Arc::new(AtomicUsize::new(0))));
        let err = chain.call(request(Some(&token(&authority(), &[ROLE_ADMIN])))).await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated(AuthError::InvalidSignature)));
    }

    #[tokio::test]
    async fn authorize_without_authenticate_always_fails() {
        let auth = authority();
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = authorize(&[ROLE_ADMIN]).wrap(counting_handler(calls.clone()));

        // A valid admin token is irrelevant: nothing has validated it.
        let err = chain.call(request(Some(&token(&auth, &[ROLE_ADMIN])))).await.unwrap_err();

        assert!(matches!(err, Error::Forbidden(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
