//! Bounded retries for store connectivity failures.
//!
//! `StoreError::Unavailable` is the one retryable store error; everything
//! else propagates immediately. Callers that exhaust their attempts get
//! the final `Unavailable` back.

use std::future::Future;
use std::time::Duration;

use formscout_types::error::StoreError;

/// Attempts made before giving up on an unavailable store.
pub const DEFAULT_RETRY_ATTEMPTS: usize = 3;

/// Pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Run `op`, retrying up to `attempts` times while it fails with
/// [`StoreError::Unavailable`].
pub async fn with_store_retries<T, F, Fut>(
    attempts: usize,
    delay: Duration,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let attempts = attempts.max(1);
    let mut last_message = String::new();

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(StoreError::Unavailable(message)) => {
                tracing::warn!(attempt, attempts, %message, "record store unavailable");
                last_message = message;
                if attempt < attempts && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(other) => return Err(other),
        }
    }

    Err(StoreError::Unavailable(last_message))
}
