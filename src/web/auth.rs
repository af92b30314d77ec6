//! Authentication backend trait, in-memory user store, and token issuing.
//!
//! Passwords are compared as given; hashing belongs to whichever backend a
//! deployment plugs in.

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::web::api::{AppState, json_error};
use crate::web::token_id::bearer_token;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserAccount {
    pub id: u64,
    pub email: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    #[error("Email and password are required")]
    MissingFields,
    #[error("Email is already registered")]
    AlreadyExists,
}

#[async_trait]
pub trait AuthBackend: Send + Sync + 'static {
    async fn register(&self, email: &str, password: &str) -> Result<UserAccount, RegisterError>;
    /// Returns the account if the credentials match.
    async fn validate(&self, email: &str, password: &str) -> Option<UserAccount>;
}

struct StoredUser {
    id: u64,
    password: String,
}

/// In-memory user store for demo/testing
pub struct InMemoryAuthBackend {
    users: Mutex<HashMap<String, StoredUser>>,
}

impl InMemoryAuthBackend {
    pub fn new() -> Self {
        Self { users: Mutex::new(HashMap::new()) }
    }
}

impl Default for InMemoryAuthBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthBackend for InMemoryAuthBackend {
    async fn register(&self, email: &str, password: &str) -> Result<UserAccount, RegisterError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(RegisterError::MissingFields);
        }
        let mut users = self.users.lock().await;
        if users.contains_key(email) {
            return Err(RegisterError::AlreadyExists);
        }
        let id = users.len() as u64 + 1;
        users.insert(email.to_string(), StoredUser { id, password: password.to_string() });
        tracing::info!(user_id = id, "registered user");
        Ok(UserAccount { id, email: email.to_string() })
    }

    async fn validate(&self, email: &str, password: &str) -> Option<UserAccount> {
        let users = self.users.lock().await;
        users
            .get(email.trim())
            .filter(|user| user.password == password)
            .map(|user| UserAccount { id: user.id, email: email.trim().to_string() })
    }
}

/// Claims carried by issued tokens. `jti` is unique per login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub uid: u64,
    pub jti: String,
    pub exp: usize,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),
    #[error("invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
}

/// HS256 signing and verification keys plus token lifetime.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiration_secs: u64,
}

impl TokenKeys {
    pub fn new(secret: &[u8], expiration_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            expiration_secs,
        }
    }

    /// Signs a token for `user` with a fresh `jti`.
    pub fn issue(&self, user: &UserAccount) -> Result<String, TokenError> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let claims = Claims {
            sub: user.email.clone(),
            uid: user.id,
            jti: uuid::Uuid::new_v4().to_string(),
            exp: (now + self.expiration_secs) as usize,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(TokenError::Sign)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(TokenError::Invalid)
    }
}

/// Middleware that verifies the bearer token and stores its [`Claims`] in the
/// request extensions. Runs after the access gate.
pub async fn require_valid_token(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_owned);
    let Some(token) = token else {
        return json_error("Missing token", StatusCode::UNAUTHORIZED);
    };
    match state.tokens.verify(&token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!("rejected token: {}", e);
            json_error("Invalid token", StatusCode::UNAUTHORIZED)
        }
    }
}
