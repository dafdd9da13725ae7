use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{RateLimitActor, RateLimitDecision, RateLimitWindow},
    services::{clock::Clock, stores::RateLimitStore},
};

pub const RECOMMENDATIONS_BUCKET: &str = "recommendations";
pub const EXPORT_BUCKET: &str = "export";

/// Fixed-window, multi-actor quota enforcement
///
/// Each bucket owns its window length. A check charges the supplied actors
/// one at a time, in order, with a single atomic increment each, and stops at
/// the first actor whose post-increment count exceeds its limit.
///
/// Charges are never undone. When a later actor rejects, the increments
/// already applied to earlier actors in the list stand, so a rejected request
/// still costs those actors one unit. Counts only reset when the window rolls
/// over.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    /// Bucket name → window length in seconds
    windows: HashMap<String, u64>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            windows: HashMap::new(),
        }
    }

    /// Registers a bucket with its window granularity
    pub fn with_bucket(mut self, bucket: &str, window_secs: u64) -> Self {
        self.windows.insert(bucket.to_string(), window_secs.max(1));
        self
    }

    pub fn window_secs(&self, bucket: &str) -> Option<u64> {
        self.windows.get(bucket).copied()
    }

    /// Charges every actor in order and reports the first rejection
    pub async fn check(
        &self,
        bucket: &str,
        actors: &[RateLimitActor],
    ) -> AppResult<RateLimitDecision> {
        let window_secs = self
            .window_secs(bucket)
            .ok_or_else(|| AppError::Internal(format!("Unknown rate limit bucket: {}", bucket)))?;

        let now = self.clock.now();
        let (window_start, window_end) = window_bounds(now, window_secs)?;

        for actor in actors {
            let count = self
                .store
                .increment_and_get(
                    bucket,
                    actor.actor_type,
                    &actor.actor_id,
                    window_start,
                    window_end,
                )
                .await?;

            let window = RateLimitWindow {
                bucket: bucket.to_string(),
                actor_type: actor.actor_type,
                actor_id: actor.actor_id.clone(),
                window_start,
                window_end,
                count,
                limit: actor.limit,
            };

            if window.is_exceeded() {
                let retry_after_seconds = retry_after(now, window_end, window_secs);

                tracing::info!(
                    bucket = %bucket,
                    actor_type = %actor.actor_type,
                    actor_id = %actor.actor_id,
                    count = count,
                    limit = actor.limit,
                    retry_after_seconds,
                    "Rate limit exceeded"
                );

                return Ok(RateLimitDecision::Reject {
                    retry_after_seconds,
                    window,
                });
            }

            tracing::debug!(
                bucket = %bucket,
                actor_type = %actor.actor_type,
                count = count,
                limit = actor.limit,
                "Rate limit charged"
            );
        }

        Ok(RateLimitDecision::Pass)
    }

    /// Like [`check`](Self::check) but turns a rejection into `AppError::RateLimited`
    pub async fn enforce(&self, bucket: &str, actors: &[RateLimitActor]) -> AppResult<()> {
        match self.check(bucket, actors).await? {
            RateLimitDecision::Pass => Ok(()),
            RateLimitDecision::Reject {
                retry_after_seconds,
                ..
            } => Err(AppError::RateLimited {
                retry_after_seconds,
            }),
        }
    }

    /// Removes windows that have already ended
    pub async fn purge_expired(&self) -> AppResult<u64> {
        self.store.purge_expired(self.clock.now()).await
    }
}

/// Truncates `now` to the start of its window
fn window_bounds(
    now: DateTime<Utc>,
    window_secs: u64,
) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
    let window_ms = (window_secs as i64).saturating_mul(1000);
    let start_ms = now.timestamp_millis().div_euclid(window_ms) * window_ms;

    let start = DateTime::from_timestamp_millis(start_ms)
        .ok_or_else(|| AppError::Internal("Rate limit window out of range".to_string()))?;
    let end = DateTime::from_timestamp_millis(start_ms + window_ms)
        .ok_or_else(|| AppError::Internal("Rate limit window out of range".to_string()))?;

    Ok((start, end))
}

/// Whole seconds until the window ends, always in `1..=window_secs`
fn retry_after(now: DateTime<Utc>, window_end: DateTime<Utc>, window_secs: u64) -> u64 {
    let remaining_ms = (window_end - now).num_milliseconds().max(0) as u64;
    remaining_ms.div_ceil(1000).clamp(1, window_secs)
}
