//! Token issuance and validation.
//!
//! Tokens are JWTs signed with Ed25519 (`EdDSA`). The header names the key id
//! (`kid`) that signed the token; validation resolves exactly that key, so
//! several keys can be live while they rotate.
//!
//! # Security
//!
//! - Only `EdDSA` is accepted. The header algorithm is checked before any key
//!   is resolved, so a token claiming `HS256` never gets near a verifier.
//! - Tokens over [`MAX_TOKEN_BYTES`] are rejected before parsing.
//! - Expiry is checked with zero leeway against the wall clock at validation
//!   time.

mod claims;
mod keystore;

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation, decode, decode_header, encode};
use serde::Deserialize;
use thiserror::Error;

pub use claims::{Claims, ROLE_ADMIN, ROLE_USER};
pub use keystore::{KeyPair, KeyResolver, KeyStore};

/// The only signing algorithm issued or accepted.
pub const ALGORITHM: Algorithm = Algorithm::EdDSA;

/// [`ALGORITHM`] as it appears in a token header.
const ALGORITHM_NAME: &str = "EdDSA";

/// Upper bound on accepted token size.
pub const MAX_TOKEN_BYTES: usize = 8192;

/// Why a token could not be issued or accepted.
///
/// Callers usually collapse all of these into "unauthenticated"; the variants
/// exist so logs can tell them apart.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("expected authorization header format: Bearer <token>")]
    MissingToken,

    #[error("token is malformed")]
    MalformedToken,

    #[error("token header has no key id")]
    MissingKeyId,

    #[error("no key found for kid {0:?}")]
    KeyNotFound(String),

    #[error("signing algorithm {0} is not allowed")]
    UnsupportedAlgorithm(String),

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("signing token: {0}")]
    Signing(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

/// Issues and validates tokens.
pub struct Authority {
    active_kid: String,
    resolver: Arc<dyn KeyResolver>,
    validation: Validation,
}

impl Authority {
    /// Creates an authority that signs with `active_kid`.
    ///
    /// Fails if the resolver has no private key for `active_kid`.
    pub fn new(
        active_kid: impl Into<String>,
        resolver: Arc<dyn KeyResolver>,
    ) -> Result<Self, AuthError> {
        let active_kid = active_kid.into();
        resolver.private_key(&active_kid)?;

        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;

        Ok(Self { active_kid, resolver, validation })
    }

    pub fn active_kid(&self) -> &str {
        &self.active_kid
    }

    /// Signs `claims` with the active key and names that key in the header.
    pub fn generate_token(&self, claims: &Claims) -> Result<String, AuthError> {
        let key = self.resolver.private_key(&self.active_kid)?;

        let mut header = Header::new(ALGORITHM);
        header.typ = Some("JWT".to_owned());
        header.kid = Some(self.active_kid.clone());

        encode(&header, claims, &key).map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Verifies `token` and returns its claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        if token.len() > MAX_TOKEN_BYTES {
            return Err(AuthError::MalformedToken);
        }

        // `alg` is read from the raw header first: the typed decoder has no
        // variant for names such as `none` and would report them as malformed.
        let alg = raw_algorithm(token)?;
        if alg != ALGORITHM_NAME {
            return Err(AuthError::UnsupportedAlgorithm(alg));
        }

        let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;
        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or(AuthError::MissingKeyId)?;
        let key = self.resolver.public_key(&kid)?;

        let data = decode::<Claims>(token, &key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::InvalidAlgorithm => AuthError::UnsupportedAlgorithm(format!("{:?}", header.alg)),
            _ => AuthError::MalformedToken,
        })?;

        // The decoder lets `exp == now` through; a token is valid strictly
        // before its expiry.
        if data.claims.exp <= jsonwebtoken::get_current_timestamp() {
            return Err(AuthError::Expired);
        }

        Ok(data.claims)
    }
}

#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

fn raw_algorithm(token: &str) -> Result<String, AuthError> {
    let (segment, _) = token.split_once('.').ok_or(AuthError::MalformedToken)?;
    let json = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::MalformedToken)?;
    let header: RawHeader = serde_json::from_slice(&json).map_err(|_| AuthError::MalformedToken)?;
    Ok(header.alg)
}
