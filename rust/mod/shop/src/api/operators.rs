use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json,
};

use planwerk_core::ServiceError;

use crate::model::Operator;
use crate::service::CreateOperatorRequest;
use super::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/operators", get(list_operators).post(create_operator))
        .route("/operators/{id}", get(get_operator).patch(update_operator))
}

async fn list_operators(
    State(svc): State<AppState>,
) -> Result<Json<Vec<Operator>>, ServiceError> {
    Ok(Json(svc.list_operators()?))
}

async fn create_operator(
    State(svc): State<AppState>,
    Json(req): Json<CreateOperatorRequest>,
) -> Result<(StatusCode, Json<Operator>), ServiceError> {
    let operator = svc.create_operator(req)?;
    Ok((StatusCode::CREATED, Json(operator)))
}

async fn get_operator(
    State(svc): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Operator>, ServiceError> {
    Ok(Json(svc.get_operator(&id)?))
}

async fn update_operator(
    State(svc): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<serde_json::Value>,
) -> Result<Json<Operator>, ServiceError> {
    Ok(Json(svc.update_operator(&id, patch)?))
}
