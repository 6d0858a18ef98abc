use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::metrics::KeeperMetrics;

/// Calls `f` until it succeeds, fails with an error `should_retry` rejects, or
/// `retries` retries were spent.
pub(crate) async fn call_with_retries<F, Fut, T, E, P>(
    f: F,
    retries: usize,
    delay: Duration,
    should_retry: P,
    action: &str,
    metrics: &KeeperMetrics,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(err) if attempt < retries && should_retry(&err) => {
                attempt += 1;
                warn!(?err, action, attempt, "Error making call. Retrying...");
                metrics.update_call_retries_metric("retryable", action);
                sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
