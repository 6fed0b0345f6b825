//! Exponential-backoff retry for context-cancellable operations.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Why a retried operation ultimately failed.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("operation cancelled while backing off")]
    Cancelled,

    #[error("max retries ({attempts}) exceeded: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },
}

/// Retry `op` with exponential backoff: 1 s, 2 s, 4 s, ... between
/// attempts, up to `max_attempts` total attempts.
///
/// The backoff sleep is interruptible: when `cancel` fires the helper
/// returns [`RetryError::Cancelled`] immediately instead of finishing the
/// wait. The final failure wraps the last underlying error.
pub async fn with_exponential_backoff<T, E, F, Fut>(
    cancel: CancellationToken,
    max_attempts: u32,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error,
{
    let mut attempt: u32 = 0;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(attempt = attempt + 1, "retry succeeded");
                }
                return Ok(value);
            }
            Err(err) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        source: err,
                    });
                }

                let backoff = Duration::from_secs(1u64 << (attempt - 1));
                warn!(
                    error = %err,
                    attempt,
                    max_attempts,
                    backoff_secs = backoff.as_secs(),
                    "operation failed, backing off before retry"
                );

                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn flaky(fail_times: u32) -> (Arc<AtomicU32>, impl FnMut() -> std::future::Ready<Result<u32, io::Error>>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let op = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < fail_times {
                std::future::ready(Err(io::Error::new(io::ErrorKind::Other, "boom")))
            } else {
                std::future::ready(Ok(n))
            }
        };
        (calls, op)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success_does_not_sleep() {
        let start = Instant::now();
        let (calls, op) = flaky(0);

        let result = with_exponential_backoff(CancellationToken::new(), 4, op).await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_ladder_is_one_two_four() {
        let start = Instant::now();
        let (calls, op) = flaky(3);

        let result = with_exponential_backoff(CancellationToken::new(), 4, op).await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(1 + 2 + 4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_preserves_cause() {
        let start = Instant::now();
        let (calls, op) = flaky(u32::MAX);

        let result = with_exponential_backoff(CancellationToken::new(), 4, op).await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(7));
        match result {
            Err(RetryError::Exhausted { attempts, source }) => {
                assert_eq!(attempts, 4);
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let (_, op) = flaky(u32::MAX);

        let handle = tokio::spawn(with_exponential_backoff(cancel.clone(), 4, op));

        // Land inside the first 1 s backoff window, then cancel.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let cancelled_at = Instant::now();
        cancel.cancel();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert!(cancelled_at.elapsed() < Duration::from_millis(50));
    }
}
