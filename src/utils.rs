use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::sleep;

use crate::error::AppError;

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Decodes a JSON payload into its typed form, surfacing malformed or
/// incomplete bodies as a validation failure instead of a bare rejection.
pub fn parse_payload<T: DeserializeOwned>(value: Value) -> Result<T, AppError> {
    serde_json::from_value(value).map_err(|err| AppError::Validation(err.to_string()))
}

/// Retries an idempotent read a couple of times when the store reports a
/// transient failure. Writes never go through here: retrying a reservation
/// could apply it twice.
pub async fn with_read_retry<T>(mut op: impl FnMut() -> Result<T, AppError>) -> Result<T, AppError> {
    let mut delay = Duration::from_millis(50);
    for _ in 0..2 {
        match op() {
            Err(AppError::StorageUnavailable(_)) => {
                sleep(delay).await;
                delay *= 2;
            }
            other => return other,
        }
    }
    op()
}
