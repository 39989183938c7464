//! Bounded store calls
//!
//! Every credential and revocation store call goes through [`with_timeout`]
//! so a stalled backend fails the request instead of hanging it.

use crate::{Result, UniworkError};
use std::future::Future;
use std::time::Duration;

/// Await `fut`, failing with [`UniworkError::Timeout`] once `after` elapses.
///
/// There is no retry; the caller sees the timeout immediately.
pub async fn with_timeout<T, F>(operation: &'static str, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = after.as_millis() as u64, "Store call timed out");
            Err(UniworkError::Timeout { operation, after })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let value = with_timeout("fast", Duration::from_millis(200), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_times_out() {
        let result: Result<()> = with_timeout("slow", Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(
            result,
            Err(UniworkError::Timeout {
                operation: "slow",
                ..
            })
        ));
    }

    #[test]
    fn test_inner_error_passes_through() {
        let result: Result<()> = tokio_test::block_on(with_timeout(
            "failing",
            Duration::from_secs(1),
            async { Err(UniworkError::DatabaseError("boom".to_string())) },
        ));

        assert!(matches!(result, Err(UniworkError::DatabaseError(_))));
    }
}
