use axum::{
    http::HeaderValue,
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::Role;
use crate::handlers::{auth, communities, memberships, system};
use crate::middleware::{authorize_middleware, request_context_middleware, AuthGate, AuthPolicy};
use crate::state::AppState;

/// Full application router.
pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        // Public
        .route("/", get(system::root))
        .route("/health", get(system::health))
        .merge(auth_routes(&state))
        .merge(community_routes(&state))
        .merge(membership_routes(&state))
        .layer(middleware::from_fn_with_state(state.proxy_trust(), request_context_middleware))
        .layer(cors_layer(&state.config.security.cors_origins));

    if state.config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }
    router.with_state(state)
}

fn gate(state: &AppState, policy: AuthPolicy) -> AuthGate {
    AuthGate::new(state.tokens.clone(), policy)
}

fn staff() -> AuthPolicy {
    AuthPolicy::roles(&[Role::Admin, Role::Convener])
}

fn auth_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/auth/whoami", get(auth::whoami))
        .route("/api/auth/refresh", post(auth::refresh))
        .route_layer(middleware::from_fn_with_state(
            gate(state, AuthPolicy::authenticated()),
            authorize_middleware,
        ))
}

fn community_routes(state: &AppState) -> Router<AppState> {
    let browse = Router::new()
        .route("/api/communities", get(communities::list))
        .route_layer(middleware::from_fn_with_state(
            gate(state, AuthPolicy::authenticated().allow_null(true)),
            authorize_middleware,
        ));

    let read = Router::new()
        .route("/api/communities/:id", get(communities::show))
        .route("/api/communities/:id/stats", get(communities::stats))
        .route_layer(middleware::from_fn_with_state(
            gate(state, AuthPolicy::authenticated()),
            authorize_middleware,
        ));

    let manage = Router::new()
        .route("/api/communities", post(communities::create))
        .route("/api/communities/:id", axum::routing::patch(communities::update))
        .route_layer(middleware::from_fn_with_state(gate(state, staff()), authorize_middleware));

    let admin = Router::new()
        .route("/api/communities/:id", delete(communities::destroy))
        .route_layer(middleware::from_fn_with_state(
            gate(state, AuthPolicy::roles(&[Role::Admin])),
            authorize_middleware,
        ));

    browse.merge(read).merge(manage).merge(admin)
}

fn membership_routes(state: &AppState) -> Router<AppState> {
    let members = Router::new()
        .route(
            "/api/communities/:id/members",
            get(memberships::list).post(memberships::join),
        )
        .route_layer(middleware::from_fn_with_state(
            gate(state, AuthPolicy::authenticated()),
            authorize_middleware,
        ));

    let manage = Router::new()
        .route("/api/communities/:id/members/:user_id", delete(memberships::remove))
        .route_layer(middleware::from_fn_with_state(gate(state, staff()), authorize_middleware));

    members.merge(manage)
}

/// Permissive when no origins are configured (development), otherwise an
/// explicit allow-list.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}
