//! Unified error type.
//!
//! Every error that travels through the middleware chain carries its
//! classification with it. Middleware may react to an error (count it,
//! translate it) but never reclassify one it received from an inner layer,
//! so the outermost layer can always pick the right status code.

use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

use crate::auth::AuthError;

/// The error type returned by handlers, middleware, and the server.
#[derive(Debug, Error)]
pub enum Error {
    /// The process is in a state it cannot serve from. The pipeline answers
    /// this by signalling shutdown; it is never retried or translated.
    #[error("shutdown requested: {0}")]
    Shutdown(String),

    /// Expected client error (bad input, unknown resource). The message is
    /// safe to show to the caller.
    #[error("{message}")]
    Request { status: StatusCode, message: String },

    /// Missing, malformed, expired, or forged token.
    #[error("unauthenticated: {0}")]
    Unauthenticated(#[from] AuthError),

    /// Valid identity without the required role.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A panic recovered at the panic boundary.
    #[error("PANIC [{message}] TRACE [{trace}]")]
    Panic { message: String, trace: String },

    /// Any other failure inside a handler.
    #[error("{0}")]
    Internal(String),

    /// Binding or accepting on the listener failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Connections were still running when the drain deadline passed.
    #[error("{in_flight} connection(s) still running after {timeout:?}")]
    ShutdownTimeout { timeout: Duration, in_flight: usize },
}

impl Error {
    /// Builds a shutdown-class error.
    pub fn shutdown(message: impl Into<String>) -> Self {
        Self::Shutdown(message.into())
    }

    /// Builds a client error whose message is returned to the caller.
    pub fn request(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Request { status, message: message.into() }
    }

    /// Builds a handler failure that maps to `500`.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Reports whether this error asks the process to shut down.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown(_))
    }

    /// The HTTP status this error translates to.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Request { status, .. } => *status,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Shutdown(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Panic { .. }
            | Self::Internal(_)
            | Self::Io(_)
            | Self::ShutdownTimeout { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message that may be shown to a client. Internal details stay in
    /// the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Request { message, .. } => message.clone(),
            Self::Unauthenticated(_) => "unauthenticated".to_owned(),
            Self::Forbidden(_) => "you are not authorized for that action".to_owned(),
            _ => self
                .status()
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_owned(),
        }
    }
}
