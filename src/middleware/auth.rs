use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;

use crate::auth::{get_token, Claims, Identity, Role, TokenError, TokenService, UnknownRole};
use crate::error::ApiError;

/// Authenticated user context extracted from the access token
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AuthUser {
    pub user_id: u64,
    pub role: Role,
    pub email: Option<String>,
    pub status: Option<String>,
}

impl AuthUser {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.user_id,
            role: self.role,
            email: self.email.clone(),
            status: self.status.clone(),
        }
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.identity.user_id,
            role: claims.identity.role,
            email: claims.identity.email,
            status: claims.identity.status,
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// `AuthUser` when one was attached, `None` for anonymous requests.
#[derive(Clone, Debug)]
pub struct OptionalAuthUser(pub Option<AuthUser>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for OptionalAuthUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<AuthUser>().cloned()))
    }
}

/// Per-route access rule: which roles may pass, and whether a request with
/// no token at all may continue anonymously.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AuthPolicy {
    roles: Option<Vec<Role>>,
    allow_null: bool,
}

impl AuthPolicy {
    /// Any valid token, any role.
    pub fn authenticated() -> Self {
        Self::default()
    }

    pub fn roles(roles: &[Role]) -> Self {
        Self {
            roles: Some(roles.to_vec()),
            allow_null: false,
        }
    }

    /// Let requests without a token through with no identity attached.
    /// A token that is present but bad is still rejected.
    pub fn allow_null(mut self, allow: bool) -> Self {
        self.allow_null = allow;
        self
    }

    pub fn permits(&self, role: Role) -> bool {
        self.roles.as_ref().map_or(true, |roles| roles.contains(&role))
    }
}

/// Parses the `"admin|convener"` allow-list form.
impl FromStr for AuthPolicy {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let roles = s
            .split('|')
            .filter(|part| !part.trim().is_empty())
            .map(Role::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(if roles.is_empty() { Self::authenticated() } else { Self::roles(&roles) })
    }
}

/// Outcome of checking one request against a policy.
#[derive(Debug)]
pub enum AuthDecision {
    NoToken,
    TokenInvalid(TokenError),
    RoleMismatch(Role),
    Anonymous,
    Authorized(AuthUser),
}

pub fn authorize(headers: &HeaderMap, tokens: &TokenService, policy: &AuthPolicy) -> AuthDecision {
    let Some(token) = get_token(headers) else {
        return if policy.allow_null { AuthDecision::Anonymous } else { AuthDecision::NoToken };
    };

    let claims = match tokens.verify(&token) {
        Ok(claims) => claims,
        Err(e) => return AuthDecision::TokenInvalid(e),
    };

    if !policy.permits(claims.identity.role) {
        return AuthDecision::RoleMismatch(claims.identity.role);
    }
    AuthDecision::Authorized(AuthUser::from(claims))
}

/// State for [`authorize_middleware`]: the token service plus the route's policy.
#[derive(Clone)]
pub struct AuthGate {
    tokens: Arc<TokenService>,
    policy: AuthPolicy,
}

impl AuthGate {
    pub fn new(tokens: Arc<TokenService>, policy: AuthPolicy) -> Self {
        Self { tokens, policy }
    }
}

/// Gate a route: 401 `UNAUTHORIZED` with no token, 401 `TOKEN_EXPIRED` for
/// a bad or expired one, 403 `FORBIDDEN` for a role outside the policy.
/// Otherwise the `AuthUser` is attached and the request continues.
pub async fn authorize_middleware(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match authorize(request.headers(), &gate.tokens, &gate.policy) {
        AuthDecision::NoToken => Err(ApiError::unauthorized("Authorization token required")),
        AuthDecision::TokenInvalid(e) => {
            tracing::warn!("Rejected access token for {}: {}", request.uri().path(), e);
            Err(ApiError::from(e))
        }
        AuthDecision::RoleMismatch(role) => {
            tracing::warn!("Role '{}' not permitted on {}", role, request.uri().path());
            Err(ApiError::forbidden("You do not have permission to access this resource"))
        }
        AuthDecision::Anonymous => Ok(next.run(request).await),
        AuthDecision::Authorized(user) => {
            tracing::debug!("Authorized user {} as {}", user.user_id, user.role);
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
    }
}
