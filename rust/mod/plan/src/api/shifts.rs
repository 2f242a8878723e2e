use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json,
};

use planwerk_core::ServiceError;

use crate::model::{CreateShiftRequest, Shift, ShiftListQuery};
use super::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/shifts", get(list_shifts).post(create_shift))
        .route("/shifts/{id}", get(get_shift))
        .route("/shifts/{id}/@confirm", post(confirm_shift))
        .route("/shifts/{id}/@release", post(release_shift))
        .route("/shifts/{id}/@cancel", post(cancel_shift))
}

/// Reserve a machine for an order on a date. The response is the RESERVED
/// shift; `@confirm` completes the assignment, and an unconfirmed
/// reservation lapses after its TTL.
async fn create_shift(
    State(engine): State<AppState>,
    Json(req): Json<CreateShiftRequest>,
) -> Result<(StatusCode, Json<Shift>), ServiceError> {
    let shift = engine.reserve(req)?;
    Ok((StatusCode::CREATED, Json(shift)))
}

/// The calendar read path: shifts in `[startDate, endDate]` inclusive,
/// ordered by date then machine code.
async fn list_shifts(
    State(engine): State<AppState>,
    Query(query): Query<ShiftListQuery>,
) -> Result<Json<Vec<Shift>>, ServiceError> {
    Ok(Json(engine.list_shifts(&query)?))
}

async fn get_shift(
    State(engine): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Shift>, ServiceError> {
    Ok(Json(engine.get_shift(&id)?))
}

async fn confirm_shift(
    State(engine): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Shift>, ServiceError> {
    Ok(Json(engine.confirm(&id)?))
}

async fn release_shift(
    State(engine): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Shift>, ServiceError> {
    Ok(Json(engine.release(&id)?))
}

async fn cancel_shift(
    State(engine): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Shift>, ServiceError> {
    Ok(Json(engine.cancel(&id)?))
}
