use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use super::activity::{self, Activity};
use crate::auth::Role;
use crate::database::{Conditions, Payload, Row, SelectOptions, SortDirection};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser, OptionalAuthUser, RequestContext};
use crate::state::AppState;

pub const COMMUNITIES: &str = "communities";

/// Columns a PATCH body may never touch.
const PROTECTED_COLUMNS: [&str; 3] = ["id", "created_at", "created_by"];

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub sort: Option<String>,
    pub direction: Option<String>,
}

impl ListParams {
    /// Anonymous callers only ever see active communities.
    fn conditions(&self, anonymous: bool) -> Conditions {
        let status = if anonymous { Some("active") } else { self.status.as_deref() };
        match status {
            Some(status) => Conditions::new().and("status", status),
            None => Conditions::new(),
        }
    }

    fn options(&self) -> Result<SelectOptions, ApiError> {
        let direction = match self.direction.as_deref() {
            Some(d) => d.parse::<SortDirection>().map_err(ApiError::bad_request)?,
            None => SortDirection::Desc,
        };
        Ok(SelectOptions::default().order_by(self.sort.as_deref().unwrap_or("id"), direction))
    }
}

/// GET /api/communities
pub async fn list(
    State(state): State<AppState>,
    OptionalAuthUser(user): OptionalAuthUser,
    Query(params): Query<ListParams>,
) -> ApiResult<Vec<Row>> {
    let access = state.db.table(COMMUNITIES)?;
    let rows = access
        .get(&params.conditions(user.is_none()), &params.options()?)
        .await?;
    Ok(ApiResponse::success(rows))
}

/// GET /api/communities/:id
pub async fn show(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Row> {
    let row = state
        .db
        .table(COMMUNITIES)?
        .get_404(&Conditions::new().and("id", id))
        .await?;
    Ok(ApiResponse::success(row))
}

#[derive(Debug, Deserialize)]
pub struct CreateCommunity {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
}

impl CreateCommunity {
    fn into_payload(self, creator: &AuthUser) -> Result<Payload, ApiError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            let mut field_errors = HashMap::new();
            field_errors.insert("name".to_string(), "Name is required".to_string());
            return Err(ApiError::validation_error("Invalid community", Some(field_errors)));
        }
        let slug = self.slug.unwrap_or_else(|| slugify(&name));
        if slug.is_empty() {
            let mut field_errors = HashMap::new();
            field_errors.insert("slug".to_string(), "Slug required for names without ASCII letters or digits".to_string());
            return Err(ApiError::validation_error("Invalid community", Some(field_errors)));
        }

        Ok(Payload::new()
            .set("name", name)
            .set("slug", slug)
            .set_opt("description", self.description)
            .set("status", self.status.unwrap_or_else(|| "active".to_string()))
            .set("created_by", creator.user_id))
    }
}

/// Lowercase ASCII words joined by single dashes.
pub fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// POST /api/communities
pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    ctx: RequestContext,
    axum::Json(body): axum::Json<CreateCommunity>,
) -> ApiResult<Row> {
    let access = state.db.table(COMMUNITIES)?;
    let id = access
        .insert(&body.into_payload(&user)?)
        .await?
        .ok_or_else(|| ApiError::internal_server_error("Community was not assigned an id"))?;

    activity::record(&state.db, Activity::new("community.create", "community", Some(id)), Some(&user), &ctx).await;

    let row = access.get_404(&Conditions::new().and("id", id)).await?;
    Ok(ApiResponse::created(row))
}

/// PATCH /api/communities/:id
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    user: AuthUser,
    ctx: RequestContext,
    axum::Json(mut body): axum::Json<Map<String, Value>>,
) -> ApiResult<Row> {
    for column in PROTECTED_COLUMNS {
        body.remove(column);
    }
    if body.is_empty() {
        return Err(ApiError::bad_request("No updatable fields supplied"));
    }

    let access = state.db.table(COMMUNITIES)?;
    let by_id = Conditions::new().and("id", id);
    access.get_404(&by_id).await?;
    access.update(&Payload::from(body), id).await?;

    activity::record(&state.db, Activity::new("community.update", "community", Some(id)), Some(&user), &ctx).await;

    Ok(ApiResponse::success(access.get_404(&by_id).await?))
}

/// DELETE /api/communities/:id
pub async fn destroy(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    user: AuthUser,
    ctx: RequestContext,
) -> ApiResult<Value> {
    let result = state.db.table(COMMUNITIES)?.delete(&Conditions::new(), id).await?;
    if result.rows_affected == 0 {
        return Err(ApiError::not_found(format!("Community {} not found", id)));
    }

    activity::record(&state.db, Activity::new("community.delete", "community", Some(id)), Some(&user), &ctx).await;

    Ok(ApiResponse::success(json!({ "id": id, "deleted": true })))
}

const STATS_QUERY: &str = "SELECT c.id, c.name, COUNT(m.id) AS member_count, \
     COALESCE(SUM(m.role = ?), 0) AS facilitator_count, MAX(m.created_at) AS last_joined_at \
     FROM communities c LEFT JOIN community_members m ON m.community_id = c.id \
     WHERE c.id = ? GROUP BY c.id, c.name";

/// GET /api/communities/:id/stats
pub async fn stats(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Row> {
    let rows = state
        .db
        .data_access()?
        .raw_query(STATS_QUERY, vec![json!(Role::Facilitator.as_str()), json!(id)])
        .await?;
    rows.into_iter()
        .next()
        .map(ApiResponse::success)
        .ok_or_else(|| ApiError::not_found(format!("Community {} not found", id)))
}
