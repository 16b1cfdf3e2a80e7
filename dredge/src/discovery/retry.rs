//! Fixed-delay retry.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Error, Result};

/// Run `op` up to `attempts` times with `delay` between failures.
///
/// The first success short-circuits. When every attempt fails the last error
/// is returned; an error that is not [retryable](Error::is_retryable) is
/// returned at once. Cancellation during a delay yields [`Error::Cancelled`].
pub async fn retry_fixed<T, F, Fut>(
    op_name: &'static str,
    attempts: usize,
    delay: Duration,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1usize;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= attempts || !err.is_retryable() {
                    return Err(err);
                }

                debug!(
                    "{} failed: {}, retrying in {:?} (attempt {}/{})",
                    op_name, err, delay, attempt, attempts
                );

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}
