//! Route registration — collects all module routes + system endpoints.

use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tracing::info;

/// Build the complete router with all routes.
///
/// Module routers already carry their own prefixes (`/shop/v1`,
/// `/plan/v1`); system endpoints sit at the root.
pub fn build_router(module_routes: Vec<(&str, Router)>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/version", get(version));

    for (name, router) in module_routes {
        info!("mounting {name} module routes");
        app = app.merge(router);
    }

    app
}

async fn health() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
    }))
}

async fn version() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": "planwerkd",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
