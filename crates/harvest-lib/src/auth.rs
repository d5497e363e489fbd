//! Bearer token verification
//!
//! The service only needs the subject of a verified token. Verification is
//! behind `TokenVerifier` so an identity provider can be plugged in; the
//! bundled `StaticTokenVerifier` checks tokens against configured SHA-256
//! digests so raw tokens never appear in configuration.

use crate::models::UserIdentity;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingCredentials,

    #[error("Invalid or expired token")]
    Unauthorized,
}

/// Turns a bearer credential into a user identity
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<UserIdentity, AuthError>;
}

/// Extract the token from an `Authorization` header value.
///
/// `"Bearer abc"` yields `"abc"`; a value without a space is taken as the
/// token itself.
pub fn extract_bearer(header: &str) -> &str {
    header.split(' ').nth(1).unwrap_or(header)
}

/// Lowercase hex SHA-256 of a token
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Verifies tokens against a fixed digest → uid table
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    digests: HashMap<String, String>,
}

impl StaticTokenVerifier {
    /// Build from a map of hex SHA-256 digest to uid
    pub fn new(digests: HashMap<String, String>) -> Self {
        Self {
            digests: digests
                .into_iter()
                .map(|(digest, uid)| (digest.to_ascii_lowercase(), uid))
                .collect(),
        }
    }

    /// Build from raw tokens, hashing each one
    pub fn from_tokens<'a>(tokens: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            digests: tokens
                .into_iter()
                .map(|(token, uid)| (token_digest(token), uid.to_string()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> Result<UserIdentity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Unauthorized);
        }
        self.digests
            .get(&token_digest(token))
            .map(|uid| UserIdentity::new(uid.clone()))
            .ok_or(AuthError::Unauthorized)
    }
}
