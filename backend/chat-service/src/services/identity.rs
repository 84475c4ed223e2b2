//! Identity resolution for HTTP requests and realtime sessions.
//!
//! Tokens are issued elsewhere; this service only validates them and reads the
//! subject. Production keys are RS256 public keys.

use crate::error::{AppError, AppResult};
use crate::models::UserId;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

pub trait IdentityResolver: Send + Sync {
    /// Resolve a bearer credential to the user it belongs to
    fn resolve(&self, token: &str) -> AppResult<UserId>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: i64,
    #[serde(default)]
    token_type: Option<String>,
}

pub struct JwtIdentityResolver {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityResolver {
    pub fn new(key: DecodingKey, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.leeway = 30;
        Self { key, validation }
    }

    pub fn from_rsa_pem(public_key_pem: &str) -> AppResult<Self> {
        let key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| AppError::Config(format!("failed to parse RSA public key: {e}")))?;
        Ok(Self::new(key, Algorithm::RS256))
    }
}

impl IdentityResolver for JwtIdentityResolver {
    fn resolve(&self, token: &str) -> AppResult<UserId> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "JWT validation failed");
            AppError::Unauthorized
        })?;

        // Refresh tokens only mint new access tokens
        if data.claims.token_type.as_deref() == Some("refresh") {
            return Err(AppError::Unauthorized);
        }
        if data.claims.sub.trim().is_empty() {
            return Err(AppError::Unauthorized);
        }
        Ok(UserId::new(data.claims.sub))
    }
}
