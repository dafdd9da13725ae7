use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    middleware::request_id::RequestId,
    models::{RateLimitActor, SmartPicksOptions, SmartPicksResponse},
};

use super::{identity::CallerIdentity, AppState};

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Ranked, explained recommendations for the calling user
pub async fn smart_picks(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    CallerIdentity(caller): CallerIdentity,
    Json(options): Json<SmartPicksOptions>,
) -> AppResult<Json<SmartPicksResponse>> {
    tracing::info!(
        request_id = %request_id,
        limit = ?options.limit,
        exclude_count = options.exclude_tmdb_ids.len(),
        "Processing Smart Picks request"
    );

    let response = state.smart_picks.get_smart_picks(&caller, options).await?;

    Ok(Json(response))
}

/// Charges the caller against a metered bucket
///
/// Lets features outside this service (exports and the like) share the same
/// quota store. 204 means the caller may proceed.
pub async fn check_rate_limit(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(bucket): Path<String>,
    CallerIdentity(caller): CallerIdentity,
) -> AppResult<StatusCode> {
    let user_id = caller.user_id.ok_or(AppError::NotAuthenticated)?;
    let quota = state
        .metered_buckets
        .get(&bucket)
        .copied()
        .ok_or_else(|| AppError::InvalidInput(format!("Unknown bucket: {}", bucket)))?;

    tracing::debug!(request_id = %request_id, bucket = %bucket, "Checking metered bucket");

    let actors = vec![
        RateLimitActor::user(user_id, quota.per_user),
        RateLimitActor::ip(caller.ip, quota.per_ip),
    ];
    state.limiter().enforce(&bucket, &actors).await?;

    Ok(StatusCode::NO_CONTENT)
}
