use std::time::Duration;

use tracing::warn;

use crate::error::ServiceError;

/// Backoff schedule between read attempts.
const BACKOFF: &[Duration] = &[Duration::from_millis(25), Duration::from_millis(100)];

/// Run an idempotent read operation, retrying on transient storage errors.
///
/// At most 3 attempts with bounded backoff. Only [`ServiceError::Storage`]
/// triggers a retry — domain errors (NotFound, Validation, Conflict) are
/// returned immediately. Write operations must NOT go through this helper:
/// retrying a reservation write risks double-booking.
pub fn retry_read<T>(
    what: &str,
    mut op: impl FnMut() -> Result<T, ServiceError>,
) -> Result<T, ServiceError> {
    for (attempt, pause) in BACKOFF.iter().enumerate() {
        match op() {
            Ok(v) => return Ok(v),
            Err(ServiceError::Storage(msg)) => {
                warn!("read {what} failed (attempt {}): {msg}", attempt + 1);
                std::thread::sleep(*pause);
            }
            Err(e) => return Err(e),
        }
    }
    op()
}
