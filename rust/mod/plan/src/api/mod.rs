pub mod orders;
pub mod shifts;

use std::sync::Arc;

use axum::Router;

use crate::engine::PlanEngine;

/// Shared application state.
pub type AppState = Arc<PlanEngine>;

/// Build the plan API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/plan/v1", api_routes())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(orders::routes())
        .merge(shifts::routes())
}
