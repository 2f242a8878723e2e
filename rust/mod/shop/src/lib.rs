pub mod api;
pub mod model;
pub mod service;
pub mod store;

use std::sync::Arc;

use axum::Router;
use planwerk_core::Module;

use service::ShopService;

/// Shop module — machine registry and operator roster.
pub struct ShopModule {
    service: Arc<ShopService>,
}

impl ShopModule {
    pub fn new(service: ShopService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    /// Access the service (the scheduler shares its machine store).
    pub fn service(&self) -> &Arc<ShopService> {
        &self.service
    }
}

impl Module for ShopModule {
    fn name(&self) -> &str {
        "shop"
    }

    fn routes(&self) -> Router {
        api::router(self.service.clone())
    }
}
