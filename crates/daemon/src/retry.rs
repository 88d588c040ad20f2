use std::fmt::Display;
use std::future::Future;

use recent_actions_core::RetryPolicy;
use tracing::debug;

/// Runs `op` until it succeeds or `policy` runs out of attempts, sleeping
/// between tries. Returns the last error on exhaustion.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => match policy.next_delay(attempt) {
                Some(delay) => {
                    debug!(attempt, error = %e, ?delay, "attempt failed; retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(e),
            },
        }
    }
}
