use axum::http::HeaderMap;
use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::config::SecurityConfig;

/// Roles carried in access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Convener,
    Facilitator,
    Learner,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Convener, Role::Facilitator, Role::Learner];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Convener => "convener",
            Role::Facilitator => "facilitator",
            Role::Learner => "learner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// Who the token speaks for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: u64,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Identity {
    pub fn new(user_id: u64, role: Role) -> Self {
        Self {
            user_id,
            role,
            email: None,
            status: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(flatten)]
    pub identity: Identity,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(identity: Identity, ttl: Duration) -> Self {
        let now = Utc::now().timestamp();
        Self {
            identity,
            iat: now,
            exp: now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)),
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Access token has expired")]
    Expired,

    #[error("Invalid access token: {0}")]
    Invalid(String),

    #[error("JWT generation error: {0}")]
    Encode(String),

    #[error("Access token secret not configured")]
    MissingSecret,
}

/// Options applied when verifying a token.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Clock skew tolerance for `exp`, in seconds.
    pub leeway_secs: u64,
}

/// Sign `identity` with `secret`, valid for `ttl` from now.
pub fn create_access_token(identity: Identity, ttl: Duration, secret: &str) -> Result<String, TokenError> {
    encode_claims(&Claims::new(identity, ttl), secret)
}

pub fn encode_claims(claims: &Claims, secret: &str) -> Result<String, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::MissingSecret);
    }
    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), claims, &encoding_key).map_err(|e| TokenError::Encode(e.to_string()))
}

/// Decode and check signature and expiry. Expiry is reported separately
/// from every other failure.
pub fn verify_access_token(token: &str, secret: &str, options: &VerifyOptions) -> Result<Claims, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::MissingSecret);
    }
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::default();
    validation.leeway = options.leeway_secs;

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid(e.to_string()),
        })
}

/// Bearer credential from `Authorization`, falling back to `x-access-token`.
pub fn get_token(headers: &HeaderMap) -> Option<String> {
    let from_authorization = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        });

    from_authorization
        .or_else(|| headers.get("x-access-token").and_then(|v| v.to_str().ok()).map(str::trim))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Issues and verifies access tokens with one server-side secret.
#[derive(Clone)]
pub struct TokenService {
    secret: String,
    default_ttl: Duration,
    options: VerifyOptions,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("default_ttl", &self.default_ttl)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: impl Into<String>, default_ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            default_ttl,
            options: VerifyOptions::default(),
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(config.access_token_secret.clone(), config.access_token_ttl()).with_options(VerifyOptions {
            leeway_secs: config.access_token_leeway_secs,
        })
    }

    pub fn with_options(mut self, options: VerifyOptions) -> Self {
        self.options = options;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn issue(&self, identity: Identity) -> Result<String, TokenError> {
        self.create(identity, self.default_ttl)
    }

    pub fn create(&self, identity: Identity, ttl: Duration) -> Result<String, TokenError> {
        create_access_token(identity, ttl, &self.secret)
    }

    pub fn encode(&self, claims: &Claims) -> Result<String, TokenError> {
        encode_claims(claims, &self.secret)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        verify_access_token(token, &self.secret, &self.options)
    }

    /// New token for the same identity with a fresh expiry.
    pub fn refresh(&self, claims: &Claims) -> Result<String, TokenError> {
        self.issue(claims.identity.clone())
    }
}
