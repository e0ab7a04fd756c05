//! Retry and backoff policy.
//!
//! Error classification (timeouts, throttling, connection failures) and
//! exponential backoff decisions shared by the renderer calls and the image
//! transfers, so every artifact follows the same bound.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::TransferError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::{run_with_retry, run_with_retry_async};
