use axum::Router;

/// A service module that contributes HTTP routes.
///
/// Each business module (shop, plan, ...) implements this trait to register
/// its API endpoints. The binary entry point collects all modules and merges
/// their routes into a single Router.
pub trait Module: Send + Sync {
    /// Module name, used for logging.
    fn name(&self) -> &str;

    /// Return the module's routes, already mounted under the module's own
    /// `/{name}/v1` prefix.
    fn routes(&self) -> Router;
}
