pub mod config;
pub mod error;
pub mod module;
pub mod retry;
pub mod types;

pub use config::ServiceConfig;
pub use error::ServiceError;
pub use module::Module;
pub use retry::retry_read;
pub use types::{apply_patch, ListParams, ListResult, new_id, now_rfc3339};
