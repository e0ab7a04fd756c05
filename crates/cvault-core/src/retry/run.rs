//! Retry loops: run an operation until success or the policy says stop.

use std::future::Future;

use super::classify;
use super::error::TransferError;
use super::policy::{ErrorKind, RetryDecision, RetryPolicy};

/// Runs a blocking transfer until it succeeds or the retry policy says to stop.
/// On retryable failure, sleeps for the backoff duration then tries again.
/// Call from `spawn_blocking`.
pub fn run_with_retry<T, F>(policy: &RetryPolicy, mut f: F) -> Result<T, TransferError>
where
    F: FnMut(u32) -> Result<T, TransferError>,
{
    let mut attempt = 1u32;
    loop {
        match f(attempt) {
            Ok(v) => return Ok(v),
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => return Err(e),
                    RetryDecision::RetryAfter(d) => {
                        tracing::debug!(attempt, "transfer failed ({}), retrying in {:?}", e, d);
                        std::thread::sleep(d);
                        attempt += 1;
                    }
                }
            }
        }
    }
}

/// Async counterpart of [`run_with_retry`] for operations with their own error type.
/// `kind` maps an error to its retry class.
pub async fn run_with_retry_async<T, E, F, Fut, K>(
    policy: &RetryPolicy,
    kind: K,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    K: Fn(&E) -> ErrorKind,
    E: std::fmt::Display,
{
    let mut attempt = 1u32;
    loop {
        match f(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) => match policy.decide(attempt, kind(&e)) {
                RetryDecision::NoRetry => return Err(e),
                RetryDecision::RetryAfter(d) => {
                    tracing::debug!(attempt, "attempt failed ({}), retrying in {:?}", e, d);
                    tokio::time::sleep(d).await;
                    attempt += 1;
                }
            },
        }
    }
}
