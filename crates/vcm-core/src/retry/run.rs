//! Retry loop: run an async call until success or policy says stop.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use super::classify;
use super::error::CallError;
use super::policy::{RetryDecision, RetryPolicy};

/// Runs an async call until it succeeds or the retry policy says to stop.
/// On retryable failure, sleeps for the backoff duration then tries again.
/// The abort flag is checked before each retry sleep; once raised, the last
/// error is returned without further attempts.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    abort: &AtomicBool,
    mut f: F,
) -> Result<T, CallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    let mut attempt = 1u32;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => return Err(e),
                    RetryDecision::RetryAfter(d) => {
                        if abort.load(Ordering::Relaxed) {
                            return Err(e);
                        }
                        tokio::time::sleep(d).await;
                        attempt += 1;
                    }
                }
            }
        }
    }
}
