use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use thiserror::Error;

use parley_types::api::Claims;

/// Reasons a connection attempt is refused. All of them are fatal to that
/// attempt and never reach other connections.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("handshake did not carry an identify command")]
    MissingToken,

    #[error("handshake timed out")]
    Timeout,
}

/// Verifies bearer tokens minted by the auth service against the shared secret.
#[derive(Clone)]
pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Check signature and expiry, returning the identity claims.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)?;
        Ok(data.claims)
    }
}
