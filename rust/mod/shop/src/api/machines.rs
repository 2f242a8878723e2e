use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json,
};
use serde::Deserialize;

use planwerk_core::ServiceError;

use crate::model::{Machine, MachineType};
use crate::service::RegisterMachineRequest;
use crate::store::MachineFilters;
use super::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/machines", get(list_machines).post(register_machine))
        .route("/machines/{code}", get(get_machine).patch(update_machine))
        .route("/machines/{code}/@occupy", post(occupy_machine))
        .route("/machines/{code}/@vacate", post(vacate_machine))
        .route("/machines/{code}/@activate", post(activate_machine))
        .route("/machines/{code}/@deactivate", post(deactivate_machine))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MachineQuery {
    #[serde(rename = "type", default)]
    machine_type: Option<MachineType>,

    #[serde(default)]
    active: Option<bool>,

    /// Active and FREE.
    #[serde(default)]
    available: Option<bool>,

    /// Minimum axis count.
    #[serde(default)]
    axes: Option<u32>,
}

async fn list_machines(
    State(svc): State<AppState>,
    Query(q): Query<MachineQuery>,
) -> Result<Json<Vec<Machine>>, ServiceError> {
    let filters = MachineFilters {
        machine_type: q.machine_type,
        active: q.active,
        available: q.available,
        min_axes: q.axes,
    };
    Ok(Json(svc.list_machines(&filters)?))
}

async fn register_machine(
    State(svc): State<AppState>,
    Json(req): Json<RegisterMachineRequest>,
) -> Result<(StatusCode, Json<Machine>), ServiceError> {
    let machine = svc.register_machine(req)?;
    Ok((StatusCode::CREATED, Json(machine)))
}

async fn get_machine(
    State(svc): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Machine>, ServiceError> {
    Ok(Json(svc.get_machine(&code)?))
}

async fn update_machine(
    State(svc): State<AppState>,
    Path(code): Path<String>,
    Json(patch): Json<serde_json::Value>,
) -> Result<Json<Machine>, ServiceError> {
    Ok(Json(svc.update_machine(&code, patch)?))
}

async fn occupy_machine(
    State(svc): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Machine>, ServiceError> {
    Ok(Json(svc.set_occupied(&code, true)?))
}

async fn vacate_machine(
    State(svc): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Machine>, ServiceError> {
    Ok(Json(svc.set_occupied(&code, false)?))
}

async fn activate_machine(
    State(svc): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Machine>, ServiceError> {
    Ok(Json(svc.set_active(&code, true)?))
}

async fn deactivate_machine(
    State(svc): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Machine>, ServiceError> {
    Ok(Json(svc.set_active(&code, false)?))
}
