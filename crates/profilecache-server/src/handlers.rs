use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use profilecache_core::{LeaderboardEntry, Profile, ScoreUpdate};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, SUBJECT_REQUIRED};
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    pub status: &'a str,
}

pub async fn root(State(state): State<AppState>) -> impl IntoResponse {
    format!(
        "Hello, the server is running on port {}",
        state.config.server.port
    )
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse { status: "ready" })),
        Err(e) => {
            tracing::warn!(backend = state.store.backend_name(), error = %e, "Store not ready");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                }),
            )
        }
    }
}

pub async fn metrics() -> impl IntoResponse {
    match crate::metrics::render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> Result<Json<Profile>, ApiError> {
    let profile = state
        .profiles
        .get_profile(&subject)
        .await
        .map_err(ApiError::from_profile_read)?;
    Ok(Json(profile))
}

/// `/user/` with nothing after the slash.
pub async fn missing_subject() -> ApiError {
    ApiError::bad_request(SUBJECT_REQUIRED)
}

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<Profile>>, ApiError> {
    Ok(Json(state.profiles.list_profiles().await?))
}

pub async fn top_scores(
    State(state): State<AppState>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    Ok(Json(state.leaderboard.top().await?))
}

#[derive(Debug, Deserialize)]
pub struct IncrementParams {
    pub sub: Option<String>,
}

pub async fn increment_score(
    State(state): State<AppState>,
    Query(params): Query<IncrementParams>,
) -> Result<Json<ScoreUpdate>, ApiError> {
    let subject = params
        .sub
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request(SUBJECT_REQUIRED))?;
    Ok(Json(state.profiles.increment_score(&subject).await?))
}
