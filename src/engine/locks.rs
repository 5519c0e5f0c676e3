use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;
use tracing::warn;

use crate::error::AppError;

/// Waits at most `wait` for the per-key lock. Expiry surfaces as a retryable conflict.
pub async fn acquire<T>(
    slot: Arc<Mutex<T>>,
    wait: Duration,
    resource: &'static str,
    key: impl std::fmt::Display,
) -> Result<OwnedMutexGuard<T>, AppError> {
    match timeout(wait, slot.lock_owned()).await {
        Ok(guard) => Ok(guard),
        Err(_) => {
            warn!(resource, key = %key, wait_ms = wait.as_millis() as u64, "lock wait expired");
            Err(AppError::Contended(format!(
                "{resource} {key} is busy, retry the request"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Mutex;

    use super::acquire;
    use crate::error::AppError;

    #[tokio::test]
    async fn held_lock_times_out_with_retryable_error() {
        let slot = Arc::new(Mutex::new(0_u32));
        let _held = slot.clone().lock_owned().await;

        let err = acquire(slot, Duration::from_millis(20), "order", "abc")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Contended(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn free_lock_is_acquired() {
        let slot = Arc::new(Mutex::new(7_u32));
        let guard = acquire(slot, Duration::from_millis(20), "wallet", 1)
            .await
            .unwrap();
        assert_eq!(*guard, 7);
    }
}
