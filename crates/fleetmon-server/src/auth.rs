//! JWT claim handling for the operator surface.
//!
//! Access and refresh tokens are signed with separate secrets. Refresh
//! token rotation is deliberately not implemented; the refresh secret only
//! signs the long-lived token handed out next to the access token.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const ISSUER: &str = "fleetmon";
const ACCESS_TOKEN_LIFETIME_SECS: u64 = 7 * 24 * 3600;
const REFRESH_TOKEN_LIFETIME_SECS: u64 = 30 * 24 * 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    pub iss: String,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken,
    #[error("token has expired")]
    ExpiredToken,
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Signing and validation keys derived from the configured secrets.
#[derive(Clone)]
pub struct JwtKeys {
    secret: Arc<String>,
    refresh_secret: Arc<String>,
}

impl JwtKeys {
    pub fn new(secret: String, refresh_secret: String) -> Self {
        Self {
            secret: Arc::new(secret),
            refresh_secret: Arc::new(refresh_secret),
        }
    }

    pub fn generate(&self, username: &str) -> Result<TokenPair, AuthError> {
        let now = chrono::Utc::now().timestamp() as u64;
        let token = sign(username, now, ACCESS_TOKEN_LIFETIME_SECS, &self.secret)?;
        let refresh_token = sign(
            username,
            now,
            REFRESH_TOKEN_LIFETIME_SECS,
            &self.refresh_secret,
        )?;
        Ok(TokenPair {
            token,
            refresh_token,
        })
    }

    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[ISSUER]);
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
            _ => AuthError::InvalidToken,
        })
    }
}

fn sign(username: &str, now: u64, lifetime: u64, secret: &str) -> Result<String, AuthError> {
    let claims = Claims {
        username: username.to_string(),
        iss: ISSUER.to_string(),
        iat: now,
        exp: now + lifetime,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::Signing(e.to_string()))
}
