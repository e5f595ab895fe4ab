/*
[INPUT]:  Fallible async operations and a retry budget
[OUTPUT]: Operation result after bounded retries with backoff
[POS]:    Custody layer - retry helper for address/session fetches
[UPDATE]: When changing retry counts or backoff curve
*/

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_millis(250);

/// Run an operation up to 3 times with doubling backoff (250ms, 500ms).
///
/// Only retryable errors (network, rate limit, 5xx) trigger another attempt;
/// everything else propagates immediately.
pub async fn retry_with_backoff<T, F, Fut>(mut operation: F, label: &str) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = BASE_DELAY;
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < MAX_ATTEMPTS && err.is_retryable() => {
                warn!(label, attempt, error = %err, "operation failed, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
