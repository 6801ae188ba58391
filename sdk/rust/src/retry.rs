//! Cancellable fixed-delay retry

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Why a retried operation gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the last error
    Exhausted { error: E, attempts: u32 },
    Cancelled { attempts: u32 },
}

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `false` when cancelled.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Retry an async operation with a fixed delay between attempts.
///
/// Attempts are strictly sequential: the next one starts only after the
/// previous one returned and the delay elapsed. The operation receives the
/// 1-based attempt number. Returns `Ok((value, attempts))` on success.
pub async fn retry_fixed<F, Fut, T, E>(
    max_attempts: u32,
    delay: Duration,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<(T, u32), RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled { attempts });
        }
        attempts += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts }),
            outcome = operation(attempts) => outcome,
        };

        match outcome {
            Ok(value) => return Ok((value, attempts)),
            Err(e) => {
                if attempts >= max_attempts {
                    return Err(RetryError::Exhausted { error: e, attempts });
                }
                tracing::debug!(
                    error = %e,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after delay"
                );
                if !sleep_or_cancel(delay, cancel).await {
                    return Err(RetryError::Cancelled { attempts });
                }
            }
        }
    }
}
