use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use recent_actions_core::api::{ErrorResponse, HealthResponse, RecentActionsQuery, RecentActionsResponse};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::service::{FeedService, Unavailable};

#[derive(Clone)]
pub struct AppState {
    svc: Arc<FeedService>,
}

pub fn router(svc: Arc<FeedService>) -> Router {
    let state = AppState { svc };
    Router::new()
        .route("/", get(root))
        .route("/api/recent-actions", get(recent_actions))
        .route("/recent-actions", get(recent_actions))
        .route("/api/health", get(health))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> Redirect {
    Redirect::temporary("/api/health")
}

async fn recent_actions(
    State(st): State<AppState>,
    Query(q): Query<RecentActionsQuery>,
) -> Result<Json<RecentActionsResponse>, Unavailable> {
    let snapshot = st.svc.recent_actions(q.filtered)?;
    Ok(Json(RecentActionsResponse {
        items: snapshot.items.clone(),
    }))
}

async fn health(State(st): State<AppState>) -> Json<HealthResponse> {
    Json(st.svc.health())
}

impl IntoResponse for Unavailable {
    fn into_response(self) -> Response {
        tracing::debug!(reason = %self, "recent actions unavailable");
        let body = Json(ErrorResponse {
            detail: self.to_string(),
        });
        (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
    }
}
