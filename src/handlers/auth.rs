use axum::extract::State;
use serde::Serialize;

use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;

/// GET /api/auth/whoami
pub async fn whoami(user: AuthUser) -> ApiResult<AuthUser> {
    Ok(ApiResponse::success(user))
}

#[derive(Debug, Serialize)]
pub struct RefreshedToken {
    pub token: String,
    pub expires_in: u64,
}

/// POST /api/auth/refresh - new token for the caller with a fresh expiry
pub async fn refresh(State(state): State<AppState>, user: AuthUser) -> ApiResult<RefreshedToken> {
    let token = state.tokens.issue(user.identity())?;
    Ok(ApiResponse::success(RefreshedToken {
        token,
        expires_in: state.tokens.default_ttl().as_secs(),
    }))
}
