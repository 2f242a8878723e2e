use thiserror::Error;

/// Storage-layer error. Modules map this into their service error type at
/// the call site, so the variant split only distinguishes read, write, and
/// open failures.
#[derive(Error, Debug)]
pub enum SQLError {
    #[error("query error: {0}")]
    Query(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("connection error: {0}")]
    Connection(String),
}
