//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::header::{AUTHORIZATION, HeaderName};
use http::{HeaderMap, HeaderValue, Method};

use crate::auth::AuthError;
use crate::context::RequestContext;

/// An incoming HTTP request with its body fully read.
///
/// The request is the explicit carrier of per-request state: the pipeline
/// installs a [`RequestContext`] on it before the middleware chain runs.
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
    context: Option<RequestContext>,
}

impl Request {
    /// A request with no headers, no body and no context.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            remote_addr: None,
            context: None,
        }
    }

    pub(crate) fn from_parts(
        parts: http::request::Parts,
        body: Bytes,
        remote_addr: SocketAddr,
    ) -> Self {
        Self {
            method: parts.method,
            path: parts.uri.path().to_owned(),
            headers: parts.headers,
            body,
            params: HashMap::new(),
            remote_addr: Some(remote_addr),
            context: None,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Header lookup. Returns `None` for absent or non-visible-ASCII values.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    /// The per-request context, absent only if nothing installed one.
    pub fn context(&self) -> Option<&RequestContext> {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut RequestContext> {
        self.context.as_mut()
    }

    /// Extracts the token from an `Authorization: Bearer <token>` header.
    ///
    /// The scheme is matched case-insensitively.
    pub fn bearer_token(&self) -> Result<&str, AuthError> {
        let value = self
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::MalformedToken)?;

        let (scheme, token) = value.split_once(' ').ok_or(AuthError::MalformedToken)?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(AuthError::MalformedToken);
        }

        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MalformedToken);
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_auth(value: &'static str) -> Request {
        Request::new(Method::GET, "/")
            .with_header(AUTHORIZATION, HeaderValue::from_static(value))
    }

    #[test]
    fn bearer_token_is_extracted() {
        assert_eq!(with_auth("Bearer abc.def.ghi").bearer_token().unwrap(), "abc.def.ghi");
        assert_eq!(with_auth("bearer abc").bearer_token().unwrap(), "abc");
    }

    #[test]
    fn bearer_token_rejects_bad_headers() {
        let missing = Request::new(Method::GET, "/");
        assert!(matches!(missing.bearer_token(), Err(AuthError::MissingToken)));
        assert!(matches!(with_auth("Basic dXNlcjpwdw==").bearer_token(), Err(AuthError::MalformedToken)));
        assert!(matches!(with_auth("Bearer").bearer_token(), Err(AuthError::MalformedToken)));
        assert!(matches!(with_auth("Bearer   ").bearer_token(), Err(AuthError::MalformedToken)));
    }

    #[test]
    fn context_is_absent_until_installed() {
        let req = Request::new(Method::GET, "/");
        assert!(req.context().is_none());
        let req = req.with_context(RequestContext::new());
        assert!(req.context().is_some());
    }
}
