use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::jwt::AuthUser,
    error::AppError,
    state::AppState,
    weights::{
        dto::{RecordWeightRequest, WeightResponse},
        services,
    },
};

pub fn weight_routes() -> Router<AppState> {
    Router::new()
        .route("/weights", get(list_weights).post(record_weight))
        .route("/weights/:id", delete(delete_weight))
}

#[instrument(skip(state, payload))]
pub async fn record_weight(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<RecordWeightRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<WeightResponse>), AppError> {
    let Json(body) = payload?;
    let entry = services::record_weight(state.weights.as_ref(), user_id, &body).await?;
    Ok((StatusCode::CREATED, Json(entry.into())))
}

#[instrument(skip(state))]
pub async fn list_weights(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<WeightResponse>>, AppError> {
    let rows = services::list_weights(state.weights.as_ref(), user_id).await?;
    Ok(Json(rows.into_iter().map(WeightResponse::from).collect()))
}

#[instrument(skip(state, path))]
pub async fn delete_weight(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let Path(id) = path?;
    services::delete_weight(state.weights.as_ref(), user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
