//! Stage Retry Policies
//!
//! LLM-bearing stages retry transient transport errors with exponential
//! back-off (2^n seconds); the directory simplifier uses a linear policy
//! (base x attempt). Non-retryable errors fail the stage immediately.
//! Streamed buffers are per-attempt by construction: each attempt calls
//! the closure fresh, so nothing carries over between attempts.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::constants::retry::{
    SIMPLIFIER_BACKOFF_STEP_SECS, STAGE_BACKOFF_BASE_SECS,
};
use crate::types::{Result, ScribeError};

/// Retry with exponential back-off: delay before attempt n is
/// `base^n` seconds.
pub async fn retry_exponential<T, F, Fut>(stage: &'static str, attempts: u32, f: F) -> Result<T>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry(stage, attempts, f, |attempt| {
        Duration::from_secs(STAGE_BACKOFF_BASE_SECS.pow(attempt))
    })
    .await
}

/// Retry with linear back-off: delay before attempt n is
/// `step * n` seconds (5s, 10s, ...).
pub async fn retry_linear<T, F, Fut>(stage: &'static str, attempts: u32, f: F) -> Result<T>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry(stage, attempts, f, |attempt| {
        Duration::from_secs(SIMPLIFIER_BACKOFF_STEP_SECS * attempt as u64)
    })
    .await
}

async fn retry<T, F, Fut, D>(stage: &'static str, attempts: u32, f: F, delay: D) -> Result<T>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    D: Fn(u32) -> Duration,
{
    let mut last_message = String::new();
    for attempt in 0..attempts {
        if attempt > 0 {
            tokio::time::sleep(delay(attempt)).await;
        }
        match f(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                warn!(stage, retry_count = attempt, error = %e, "stage attempt failed");
                last_message = e.to_string();
            }
            Err(e) => {
                return Err(ScribeError::Stage {
                    stage,
                    attempts: attempt + 1,
                    message: e.to_string(),
                });
            }
        }
    }
    Err(ScribeError::Stage {
        stage,
        attempts,
        message: last_message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_linear("catalogue", 5, |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ScribeError::llm("rate limited"))
                } else {
                    Ok("manifest")
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, "manifest");
        // two failures then one success: exactly three attempts
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_becomes_stage_error() {
        let result: Result<()> =
            retry_exponential("classify", 3, |_| async { Err(ScribeError::llm("boom")) }).await;
        match result.unwrap_err() {
            ScribeError::Stage { stage, attempts, .. } => {
                assert_eq!(stage, "classify");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_exponential("mindmap", 3, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ScribeError::Config("bad".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
