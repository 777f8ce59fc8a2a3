use axum::extract::{Path, State};
use serde_json::{json, Value};

use super::activity::{self, Activity};
use super::communities::COMMUNITIES;
use crate::database::{Conditions, Payload, Row, SelectOptions, SortDirection};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser, RequestContext};
use crate::state::AppState;

pub const MEMBERS: &str = "community_members";

fn membership(community_id: u64, user_id: u64) -> Conditions {
    Conditions::new().and("community_id", community_id).and("user_id", user_id)
}

/// GET /api/communities/:id/members
pub async fn list(State(state): State<AppState>, Path(community_id): Path<u64>) -> ApiResult<Vec<Row>> {
    let rows = state
        .db
        .table(MEMBERS)?
        .get(
            &Conditions::new().and("community_id", community_id),
            &SelectOptions::default().order_by("created_at", SortDirection::Asc),
        )
        .await?;
    Ok(ApiResponse::success(rows))
}

/// POST /api/communities/:id/members - the caller joins
pub async fn join(
    State(state): State<AppState>,
    Path(community_id): Path<u64>,
    user: AuthUser,
    ctx: RequestContext,
) -> ApiResult<Value> {
    state
        .db
        .table(COMMUNITIES)?
        .get_404(&Conditions::new().and("id", community_id))
        .await?;

    let payload = Payload::new()
        .set("community_id", community_id)
        .set("user_id", user.user_id)
        .set("role", user.role.as_str());
    let id = state.db.table(MEMBERS)?.insert(&payload).await?;

    activity::record(&state.db, Activity::new("membership.join", "community", Some(community_id)), Some(&user), &ctx).await;

    Ok(ApiResponse::created(json!({
        "id": id,
        "community_id": community_id,
        "user_id": user.user_id,
        "role": user.role,
    })))
}

/// DELETE /api/communities/:id/members/:user_id
pub async fn remove(
    State(state): State<AppState>,
    Path((community_id, member_id)): Path<(u64, u64)>,
    user: AuthUser,
    ctx: RequestContext,
) -> ApiResult<Value> {
    let result = state
        .db
        .table(MEMBERS)?
        .delete_where(&membership(community_id, member_id))
        .await?;
    if result.rows_affected == 0 {
        return Err(ApiError::not_found(format!(
            "User {} is not a member of community {}",
            member_id, community_id
        )));
    }

    activity::record(&state.db, Activity::new("membership.remove", "community", Some(community_id)), Some(&user), &ctx).await;

    Ok(ApiResponse::success(json!({
        "community_id": community_id,
        "user_id": member_id,
        "removed": result.rows_affected,
    })))
}
