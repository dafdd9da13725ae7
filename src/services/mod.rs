use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, AppResult};

pub mod clock;
pub mod ranker;
pub mod rate_limiter;
pub mod rationale;
pub mod smart_picks;
pub mod stores;
pub mod taste_profile;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ranker::CandidateRanker;
pub use rate_limiter::{RateLimiter, EXPORT_BUCKET, RECOMMENDATIONS_BUCKET};
pub use rationale::RationaleGenerator;
pub use smart_picks::{ActorQuota, Caller, SmartPicksService};
pub use taste_profile::TasteProfileBuilder;

/// Bounds a collaborator call, turning an elapsed deadline into `UpstreamUnavailable`
pub(crate) async fn with_timeout<T, F>(timeout: Duration, what: &str, call: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::UpstreamUnavailable(format!(
            "{} timed out after {}ms",
            what,
            timeout.as_millis()
        ))),
    }
}

/// Failures of history or catalog backends that the core degrades around
pub(crate) fn is_upstream_failure(error: &AppError) -> bool {
    matches!(
        error,
        AppError::UpstreamUnavailable(_) | AppError::Database(_) | AppError::Cache(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let result = with_timeout(Duration::from_secs(1), "fast", async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_with_timeout_maps_elapsed_to_upstream_unavailable() {
        let result: AppResult<()> = with_timeout(Duration::from_millis(10), "slow", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(AppError::UpstreamUnavailable(msg)) if msg.contains("slow")));
    }

    #[test]
    fn test_internal_is_not_upstream_failure() {
        assert!(!is_upstream_failure(&AppError::Internal("x".to_string())));
        assert!(is_upstream_failure(&AppError::UpstreamUnavailable("x".to_string())));
    }
}
