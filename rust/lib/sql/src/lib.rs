//! Embedded SQL storage — a thin dynamically-typed store interface over
//! bundled SQLite.

pub mod error;
pub mod sqlite;
pub mod traits;

pub use error::SQLError;
pub use sqlite::SqliteStore;
pub use traits::{Row, SQLStore, Value};
