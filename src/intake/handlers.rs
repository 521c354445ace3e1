use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    routing::{delete, get, post, put},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::jwt::AuthUser,
    error::AppError,
    intake::{
        commands::{RecordIntake, ReplaceMeal},
        dto::{
            DayQuery, DayResponse, DeletedResponse, MealTypeResponse, RecordIntakeRequest,
            RecordIntakeResponse, ReplaceMealRequest, SuccessResponse,
        },
        services::{self, DayView},
    },
    state::AppState,
    validation::parse_date,
};

pub fn log_routes() -> Router<AppState> {
    Router::new()
        .route("/logs", post(record_intake).get(get_day))
        .route(
            "/logs/:daily_log_id/foods",
            put(replace_meal).delete(clear_day),
        )
        .route("/logs/:daily_log_id/meals/:meal_id", delete(delete_meal))
        .route(
            "/logs/:daily_log_id/meals/:meal_id/foods/:food_id",
            delete(delete_food_line),
        )
}

pub fn vocabulary_routes() -> Router<AppState> {
    Router::new().route("/meal-types", get(list_meal_types))
}

/// POST /logs
#[instrument(skip(state, payload))]
pub async fn record_intake(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<RecordIntakeRequest>, JsonRejection>,
) -> Result<Json<RecordIntakeResponse>, AppError> {
    let Json(body) = payload?;
    let cmd = RecordIntake::try_from(body)?;
    let recorded = services::record_intake(state.intake.as_ref(), user_id, &cmd).await?;
    Ok(Json(RecordIntakeResponse {
        daily_log_id: recorded.daily_log_id,
        meal_id: recorded.meal_id,
        meal_type: recorded.meal_type,
        meal_display_name: recorded.meal_display_name,
    }))
}

/// GET /logs?date=YYYY-MM-DD
#[instrument(skip(state, query))]
pub async fn get_day(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    query: Result<Query<DayQuery>, QueryRejection>,
) -> Result<Json<DayResponse>, AppError> {
    let Query(q) = query?;
    let log_date = parse_date("date", q.date.as_deref())?;
    let view = services::get_day(state.intake.as_ref(), user_id, log_date).await?;
    let response = match view {
        DayView::NoEntries => DayResponse {
            daily_log_id: None,
            date: log_date.to_string(),
            meal_groups: Vec::new(),
        },
        DayView::Logged {
            daily_log,
            meal_groups,
        } => DayResponse {
            daily_log_id: Some(daily_log.id),
            date: daily_log.log_date.to_string(),
            meal_groups,
        },
    };
    Ok(Json(response))
}

/// PUT /logs/:daily_log_id/foods
#[instrument(skip(state, path, payload))]
pub async fn replace_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ReplaceMealRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, AppError> {
    let Path(daily_log_id) = path?;
    let Json(body) = payload?;
    let cmd = ReplaceMeal::try_from(body)?;
    services::replace_meal(state.intake.as_ref(), user_id, daily_log_id, &cmd).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// DELETE /logs/:daily_log_id/foods
#[instrument(skip(state, path))]
pub async fn clear_day(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<DeletedResponse>, AppError> {
    let Path(daily_log_id) = path?;
    let deleted = services::clear_day(state.intake.as_ref(), user_id, daily_log_id).await?;
    Ok(Json(DeletedResponse { deleted }))
}

/// DELETE /logs/:daily_log_id/meals/:meal_id
#[instrument(skip(state, path))]
pub async fn delete_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<(i64, i64)>, PathRejection>,
) -> Result<Json<DeletedResponse>, AppError> {
    let Path((daily_log_id, meal_id)) = path?;
    let deleted =
        services::delete_meal_lines(state.intake.as_ref(), user_id, daily_log_id, meal_id).await?;
    Ok(Json(DeletedResponse { deleted }))
}

/// DELETE /logs/:daily_log_id/meals/:meal_id/foods/:food_id
#[instrument(skip(state, path))]
pub async fn delete_food_line(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<(i64, i64, i64)>, PathRejection>,
) -> Result<Json<DeletedResponse>, AppError> {
    let Path((daily_log_id, meal_id, food_id)) = path?;
    let deleted = services::delete_food_line(
        state.intake.as_ref(),
        user_id,
        daily_log_id,
        meal_id,
        food_id,
    )
    .await?;
    Ok(Json(DeletedResponse { deleted }))
}

/// GET /meal-types
#[instrument(skip(state, _auth))]
pub async fn list_meal_types(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<MealTypeResponse>>, AppError> {
    let meals = services::list_meal_types(state.intake.as_ref()).await?;
    let items = meals
        .into_iter()
        .map(|m| MealTypeResponse {
            id: m.id,
            meal_type: m.meal_type,
        })
        .collect();
    Ok(Json(items))
}
