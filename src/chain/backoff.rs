//! Capped exponential backoff with jitter, shared by every call site that
//! retries a `TransientChainError`.
//!
//! Initial 500 ms, factor 2, max 5 attempts, full jitter — per SPEC_FULL §4.1.

use super::errors::ChainError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

const INITIAL_DELAY_MS: u64 = 500;
const BACKOFF_FACTOR: u64 = 2;
const MAX_ATTEMPTS: u32 = 5;

/// Retries `op` while it returns `ChainError::Transient`, up to
/// `MAX_ATTEMPTS` total attempts. A `Permanent` error is returned
/// immediately without retry.
pub async fn retry_transient<T, F, Fut>(mut op: F) -> Result<T, ChainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    let mut attempt = 0u32;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(ChainError::Permanent(e)) => return Err(ChainError::Permanent(e)),
            Err(ChainError::Transient(e)) => {
                if attempt >= MAX_ATTEMPTS {
                    return Err(ChainError::Transient(e));
                }
                let jitter_ms = rand::thread_rng().gen_range(0..=delay_ms / 2);
                tokio::time::sleep(Duration::from_millis(delay_ms + jitter_ms)).await;
                delay_ms *= BACKOFF_FACTOR;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::errors::TransientChainError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retries_transient_up_to_cap_then_surfaces() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<(), ChainError> = retry_transient(move || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ChainError::Transient(TransientChainError::Network(
                    "down".into(),
                )))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn succeeds_without_retry_when_first_call_ok() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<u32, ChainError> = retry_transient(move || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<(), ChainError> = retry_transient(move || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ChainError::Permanent(
                    super::super::errors::PermanentChainError::Revert("nope".into()),
                ))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
