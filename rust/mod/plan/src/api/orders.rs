use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json,
};
use serde::{Deserialize, Serialize};

use planwerk_core::{ListParams, ListResult, ServiceError};
use shop::model::Machine;

use crate::model::{CreateOrderRequest, Order};
use crate::store::OrderFilters;
use super::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/{id}", get(get_order).patch(update_order))
        .route("/orders/{id}/@archive", post(archive_order))
        .route("/orders/{id}/candidates", get(order_candidates))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderQuery {
    #[serde(flatten)]
    params: ListParams,
    status: Option<String>,
    process_type: Option<String>,
    drawing_number: Option<String>,
}

/// Response for `GET /orders/{id}/candidates`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CandidatesResponse {
    /// Effective axis requirement for the order.
    required_axes: u32,
    /// True when the requirement text had no axis count and the default
    /// of 3 was assumed.
    axis_default_applied: bool,
    /// Eligible machines, best fit first.
    machines: Vec<Machine>,
}

async fn create_order(
    State(engine): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ServiceError> {
    let order = engine.create_order(req)?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_orders(
    State(engine): State<AppState>,
    Query(q): Query<OrderQuery>,
) -> Result<Json<ListResult<Order>>, ServiceError> {
    let filters = OrderFilters {
        status: q.status,
        process_type: q.process_type,
        drawing_number: q.drawing_number,
    };
    Ok(Json(engine.list_orders(&q.params, &filters)?))
}

async fn get_order(
    State(engine): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.get_order(&id)?))
}

async fn update_order(
    State(engine): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<serde_json::Value>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.update_order(&id, patch)?))
}

async fn archive_order(
    State(engine): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.archive_order(&id)?))
}

async fn order_candidates(
    State(engine): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CandidatesResponse>, ServiceError> {
    let result = engine.candidates(&id)?;
    Ok(Json(CandidatesResponse {
        required_axes: result.requirement.axes(),
        axis_default_applied: result.requirement.is_default(),
        machines: result.machines,
    }))
}
