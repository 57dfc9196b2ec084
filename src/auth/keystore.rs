//! Key lookup by key id.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use jsonwebtoken::{DecodingKey, EncodingKey};
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair as _};

use super::AuthError;

/// Resolves the signing and verification keys for a key id.
///
/// Several ids may resolve at once while keys rotate. Callers always pass the
/// id they were given; nothing here picks a key on its own.
pub trait KeyResolver: Send + Sync {
    fn private_key(&self, kid: &str) -> Result<EncodingKey, AuthError>;
    fn public_key(&self, kid: &str) -> Result<DecodingKey, AuthError>;
}

/// An Ed25519 key pair.
#[derive(Clone)]
pub struct KeyPair {
    private_pkcs8: Vec<u8>,
    public: Vec<u8>,
}

impl KeyPair {
    /// Generates a fresh pair from the system CSPRNG.
    pub fn generate() -> Result<Self, AuthError> {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng)
            .map_err(|e| AuthError::InvalidKey(format!("key generation failed: {e}")))?;
        Self::from_pkcs8(pkcs8.as_ref())
    }

    /// Loads a pair from a PKCS#8 document.
    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self, AuthError> {
        let pair = Ed25519KeyPair::from_pkcs8(pkcs8)
            .map_err(|e| AuthError::InvalidKey(format!("parsing pkcs8: {e}")))?;
        Ok(Self {
            private_pkcs8: pkcs8.to_vec(),
            public: pair.public_key().as_ref().to_vec(),
        })
    }

    /// Raw public key bytes.
    pub fn public_key(&self) -> &[u8] {
        &self.public
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_pkcs8", &"[REDACTED]")
            .field("public", &self.public.len())
            .finish()
    }
}

/// In-memory [`KeyResolver`]. Keys can be added and retired at runtime.
#[derive(Debug, Default)]
pub struct KeyStore {
    keys: RwLock<HashMap<String, KeyPair>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the pair stored under `kid`.
    pub fn insert(&self, kid: impl Into<String>, pair: KeyPair) {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kid.into(), pair);
    }

    /// Generates a pair and stores it under `kid`.
    pub fn generate(&self, kid: impl Into<String>) -> Result<(), AuthError> {
        self.insert(kid, KeyPair::generate()?);
        Ok(())
    }

    /// Retires `kid`. Tokens signed with it stop validating.
    pub fn remove(&self, kid: &str) -> Option<KeyPair> {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(kid)
    }

    fn lookup<T>(&self, kid: &str, f: impl FnOnce(&KeyPair) -> T) -> Result<T, AuthError> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        keys.get(kid)
            .map(f)
            .ok_or_else(|| AuthError::KeyNotFound(kid.to_owned()))
    }
}

impl KeyResolver for KeyStore {
    fn private_key(&self, kid: &str) -> Result<EncodingKey, AuthError> {
        self.lookup(kid, |pair| EncodingKey::from_ed_der(&pair.private_pkcs8))
    }

    fn public_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        self.lookup(kid, |pair| DecodingKey::from_ed_der(&pair.public))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kid_is_not_found() {
        let store = KeyStore::new();
        assert!(matches!(store.public_key("nope"), Err(AuthError::KeyNotFound(kid)) if kid == "nope"));
        assert!(matches!(store.private_key("nope"), Err(AuthError::KeyNotFound(_))));
    }

    #[test]
    fn rotated_keys_resolve_side_by_side() {
        let store = KeyStore::new();
        store.generate("2026-09").unwrap();
        store.generate("2026-10").unwrap();
        assert!(store.public_key("2026-09").is_ok());
        assert!(store.public_key("2026-10").is_ok());

        store.remove("2026-09");
        assert!(store.public_key("2026-09").is_err());
        assert!(store.public_key("2026-10").is_ok());
    }

    #[test]
    fn pkcs8_round_trips_public_key() {
        let pair = KeyPair::generate().unwrap();
        let again = KeyPair::from_pkcs8(&pair.private_pkcs8).unwrap();
        assert_eq!(pair.public_key(), again.public_key());
        assert_eq!(pair.public_key().len(), 32);
    }

    #[test]
    fn garbage_pkcs8_is_rejected() {
        assert!(matches!(KeyPair::from_pkcs8(b"not a key"), Err(AuthError::InvalidKey(_))));
    }

    #[test]
    fn debug_redacts_private_key() {
        let out = format!("{:?}", KeyPair::generate().unwrap());
        assert!(out.contains("[REDACTED]"));
    }
}
