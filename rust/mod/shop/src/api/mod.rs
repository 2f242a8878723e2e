pub mod machines;
pub mod operators;

use std::sync::Arc;

use axum::Router;

use crate::service::ShopService;

/// Shared application state.
pub type AppState = Arc<ShopService>;

/// Build the shop API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/shop/v1", api_routes())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(machines::routes())
        .merge(operators::routes())
}
