//! Bounded retry with exponential backoff for transient storage failures.

use std::time::Duration;

use crate::error::HubError;

/// Backoff schedule between attempts: 3 retries at 100ms/400ms/1600ms,
/// then the last error surfaces as `StorageUnavailable`.
pub const BACKOFF_MS: [u64; 3] = [100, 400, 1600];

/// Runs `op`, retrying when it reports a retryable failure. `retryable`
/// decides which errors are worth another attempt (e.g. SQLITE_BUSY).
pub fn with_backoff<T, F, R>(mut op: F, retryable: R) -> Result<T, HubError>
where
    F: FnMut() -> Result<T, HubError>,
    R: Fn(&HubError) -> bool,
{
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if retryable(&err) => {
                if attempt == BACKOFF_MS.len() {
                    return Err(HubError::StorageUnavailable(err.to_string()));
                }
                log::warn!(
                    "storage_retry attempt={} delay_ms={} error={}",
                    attempt + 1,
                    BACKOFF_MS[attempt],
                    err
                );
                std::thread::sleep(Duration::from_millis(BACKOFF_MS[attempt]));
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn returns_first_success() {
        let calls = AtomicU32::new(0);
        let out = with_backoff(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, HubError>(7)
            },
            |_| true,
        )
        .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn non_retryable_error_passes_through() {
        let err = with_backoff(
            || Err::<(), _>(HubError::NotFound("n1".into())),
            |_| false,
        )
        .unwrap_err();
        assert!(matches!(err, HubError::NotFound(_)));
    }
}
